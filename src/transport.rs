use async_trait::async_trait;

use crate::error::Result;

/// The byte-pipe capability a [`Peer`](crate::peer::Peer) is built on.
///
/// The core treats the channel as a half-reliable byte pipe: bytes that do
/// arrive are never reordered, but the transport may concatenate writes,
/// truncate at arbitrary boundaries, drop whole sends, or insert garbage.
/// No encryption, congestion control, or handshake is assumed or provided.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `bytes` as-is.
    async fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Reads up to `buf.len()` bytes into `buf`, returning the number read.
    /// A return of `0` is a spin hint, not end-of-stream: the listener
    /// loops back and reads again.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;
}
