//! Symmetric peer-to-peer messaging core
//!
//! Provides reliable and unreliable one-shot messages, reliable and
//! unreliable messages multiplexed over application stream ids, and
//! whole-file transfer, all layered over a caller-supplied byte transport
//! that may drop, truncate, duplicate, or interleave garbage with its data.
//!
//! A [`Peer`] owns one [`Transport`] and delivers parsed messages to a
//! [`Handler`]. Construction spawns a background listener task; the
//! returned value is already live.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod codec;
pub mod config;
pub mod error;
mod file_transfer;
pub mod handler;
mod peer;
mod reliability;
mod stream_pool;
pub mod transport;

/// In-memory transport test doubles. Public so integration tests (and
/// downstream crates building on top of this one) can exercise a `Peer`
/// without a real socket.
pub mod testutil;

pub use crate::config::{PeerConfig, FILE_TRANSFER_STREAMS};
pub use crate::error::{Error, Result};
pub use crate::handler::Handler;
pub use crate::peer::Peer;
pub use crate::transport::Transport;
