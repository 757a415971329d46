//! Wire framing: barker-delimited packets, byte-stuffing, and CRC-32
//! (zlib variant) integrity checking.
//!
//! Frame layout (all multi-byte integers little-endian):
//!
//! | type              | layout after barker                                           |
//! |--------------------|---------------------------------------------------------------|
//! | 0 reliable         | type(1) msg_id(4) size(4) stuffed_payload(size) crc(4)         |
//! | 1 unreliable       | type(1) size(4) stuffed_payload(size) crc(4)                   |
//! | 2 reliable-stream  | type(1) msg_id(4) stream_id(4) size(4) stuffed_payload(size) crc(4) |
//! | 3 unreliable-stream| type(1) stream_id(4) size(4) stuffed_payload(size) crc(4)      |
//! | 4 ack              | type(1) acked_msg_id(4)                                        |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{Error, Result};

/// Marks the start of every frame. Enables self-synchronising reception:
/// any corruption resynchronises at the next occurrence of this sequence.
pub const BARKER: &[u8; 8] = b"BADFDADF";
pub const BARKER_LEN: usize = BARKER.len();

/// The 7-byte prefix of [`BARKER`]; never appears unescaped in a stuffed
/// payload.
const BEFORE_STUFF: &[u8] = b"BADFDAD";
const AFTER_STUFF: &[u8] = b"BADFDADZ";

const TYPE_SIZE: usize = 1;
const ID_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// zlib/`binascii.crc32` variant, as spec'd — not the Castagnoli variant
/// SCTP itself uses.
const PAYLOAD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Reliable = 0,
    Unreliable = 1,
    ReliableStream = 2,
    UnreliableStream = 3,
    Ack = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(PacketType::Reliable),
            1 => Ok(PacketType::Unreliable),
            2 => Ok(PacketType::ReliableStream),
            3 => Ok(PacketType::UnreliableStream),
            4 => Ok(PacketType::Ack),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

/// The result of successfully parsing one packet out of a buffer.
#[derive(Debug, Clone)]
pub struct Unwrapped {
    pub payload: Bytes,
    pub msg_id: Option<u32>,
    pub stream_id: Option<u32>,
    pub acked_msg_id: Option<u32>,
    /// Bytes past the end of the parsed packet; may be the start of the
    /// next frame, or a further prefix to accumulate.
    pub redundant_tail: Bytes,
}

fn stuff(payload: &[u8]) -> Vec<u8> {
    replace_all(payload, BEFORE_STUFF, AFTER_STUFF)
}

fn unstuff(payload: &[u8]) -> Vec<u8> {
    replace_all(payload, AFTER_STUFF, BEFORE_STUFF)
}

fn replace_all(data: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

fn payload_checksum(stuffed: &[u8]) -> u32 {
    let mut digest = PAYLOAD_CRC.digest();
    digest.update(stuffed);
    digest.finalize()
}

fn write_frame_prefix(buf: &mut BytesMut, typ: PacketType) {
    buf.put_slice(BARKER);
    buf.put_u8(typ as u8);
}

fn write_sized_payload(buf: &mut BytesMut, payload: &[u8]) {
    let stuffed = stuff(payload);
    buf.put_u32_le(stuffed.len() as u32);
    buf.put_slice(&stuffed);
    buf.put_u32_le(payload_checksum(&stuffed));
}

pub fn wrap_reliable(payload: &[u8], msg_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(BARKER_LEN + TYPE_SIZE + ID_SIZE + ID_SIZE + payload.len() + CRC_SIZE);
    write_frame_prefix(&mut buf, PacketType::Reliable);
    buf.put_u32_le(msg_id);
    write_sized_payload(&mut buf, payload);
    buf.freeze()
}

pub fn wrap_unreliable(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(BARKER_LEN + TYPE_SIZE + ID_SIZE + payload.len() + CRC_SIZE);
    write_frame_prefix(&mut buf, PacketType::Unreliable);
    write_sized_payload(&mut buf, payload);
    buf.freeze()
}

pub fn wrap_reliable_stream(payload: &[u8], msg_id: u32, stream_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        BARKER_LEN + TYPE_SIZE + ID_SIZE + ID_SIZE + ID_SIZE + payload.len() + CRC_SIZE,
    );
    write_frame_prefix(&mut buf, PacketType::ReliableStream);
    buf.put_u32_le(msg_id);
    buf.put_u32_le(stream_id);
    write_sized_payload(&mut buf, payload);
    buf.freeze()
}

pub fn wrap_unreliable_stream(payload: &[u8], stream_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        BARKER_LEN + TYPE_SIZE + ID_SIZE + ID_SIZE + payload.len() + CRC_SIZE,
    );
    write_frame_prefix(&mut buf, PacketType::UnreliableStream);
    buf.put_u32_le(stream_id);
    write_sized_payload(&mut buf, payload);
    buf.freeze()
}

pub fn wrap_ack(acked_msg_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(BARKER_LEN + TYPE_SIZE + ID_SIZE);
    write_frame_prefix(&mut buf, PacketType::Ack);
    buf.put_u32_le(acked_msg_id);
    buf.freeze()
}

/// Parses exactly one packet starting at offset 0 of `buf`. `buf` must
/// begin with [`BARKER`].
pub fn unwrap(buf: &[u8]) -> Result<Unwrapped> {
    if buf.len() < BARKER_LEN + TYPE_SIZE {
        return Err(Error::TruncatedHeader);
    }
    if &buf[..BARKER_LEN] != BARKER {
        return Err(Error::MissingBarker);
    }
    let typ = PacketType::try_from(buf[BARKER_LEN])?;

    let mut reader = &buf[BARKER_LEN + TYPE_SIZE..];

    match typ {
        PacketType::Ack => {
            if reader.len() < ID_SIZE {
                return Err(Error::TruncatedHeader);
            }
            let acked_msg_id = reader.get_u32_le();
            Ok(Unwrapped {
                payload: Bytes::new(),
                msg_id: None,
                stream_id: None,
                acked_msg_id: Some(acked_msg_id),
                redundant_tail: Bytes::copy_from_slice(reader),
            })
        }
        PacketType::Reliable => {
            if reader.len() < ID_SIZE {
                return Err(Error::TruncatedHeader);
            }
            let msg_id = reader.get_u32_le();
            let (payload, redundant_tail) = extract_sized_payload(reader)?;
            Ok(Unwrapped {
                payload,
                msg_id: Some(msg_id),
                stream_id: None,
                acked_msg_id: None,
                redundant_tail,
            })
        }
        PacketType::Unreliable => {
            let (payload, redundant_tail) = extract_sized_payload(reader)?;
            Ok(Unwrapped {
                payload,
                msg_id: None,
                stream_id: None,
                acked_msg_id: None,
                redundant_tail,
            })
        }
        PacketType::ReliableStream => {
            if reader.len() < ID_SIZE + ID_SIZE {
                return Err(Error::TruncatedHeader);
            }
            let msg_id = reader.get_u32_le();
            let stream_id = reader.get_u32_le();
            let (payload, redundant_tail) = extract_sized_payload(reader)?;
            Ok(Unwrapped {
                payload,
                msg_id: Some(msg_id),
                stream_id: Some(stream_id),
                acked_msg_id: None,
                redundant_tail,
            })
        }
        PacketType::UnreliableStream => {
            if reader.len() < ID_SIZE {
                return Err(Error::TruncatedHeader);
            }
            let stream_id = reader.get_u32_le();
            let (payload, redundant_tail) = extract_sized_payload(reader)?;
            Ok(Unwrapped {
                payload,
                msg_id: None,
                stream_id: Some(stream_id),
                acked_msg_id: None,
                redundant_tail,
            })
        }
    }
}

/// Reads `size(4) stuffed_payload(size) crc(4)` from `reader`, verifies the
/// checksum, and returns the unstuffed payload plus whatever bytes follow.
fn extract_sized_payload(mut reader: &[u8]) -> Result<(Bytes, Bytes)> {
    if reader.len() < ID_SIZE {
        return Err(Error::TruncatedHeader);
    }
    let size = reader.get_u32_le() as usize;
    if reader.len() < size + CRC_SIZE {
        return Err(Error::TruncatedHeader);
    }
    let stuffed = &reader[..size];
    let their_crc = u32::from_le_bytes(reader[size..size + CRC_SIZE].try_into().unwrap());
    let our_crc = payload_checksum(stuffed);
    if their_crc != our_crc {
        return Err(Error::ChecksumMismatch);
    }

    let payload = Bytes::from(unstuff(stuffed));
    let redundant_tail = Bytes::copy_from_slice(&reader[size + CRC_SIZE..]);
    Ok((payload, redundant_tail))
}
