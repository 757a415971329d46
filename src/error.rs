use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("packet is missing barker")]
    MissingBarker,
    #[error("packet header is truncated")]
    TruncatedHeader,
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("crc mismatch for packet")]
    ChecksumMismatch,
    #[error("invalid is_last flag byte {0:#x} in file chunk")]
    InvalidIsLastFlag(u8),
    #[error("no such file: {path}")]
    NoSuchFile { path: String },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}
