//! Whole-file transfer, layered on top of reliable stream messages.
//!
//! A file is split into fixed-size chunks and sent as reliable-stream
//! messages on one of the reserved file-transfer stream ids (see
//! [`crate::config::FILE_TRANSFER_STREAMS`]). Chunk 0 carries the filename;
//! the last chunk is an empty sentinel whose `is_last` flag ends the
//! transfer. Grounded on `abstract_p2p_client.py`'s `_handle_file_send` /
//! `_handle_file_chunks` pair.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut, Buf, BufMut};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::peer::Peer;
use crate::transport::Transport;

const CHUNK_INDEX_SIZE: usize = 4;
const IS_LAST_FLAG_SIZE: usize = 1;

/// Per-stream table of chunks received so far, keyed by chunk index.
#[derive(Default)]
pub(crate) struct ChunkTable {
    streams: Mutex<HashMap<u32, HashMap<u32, Bytes>>>,
}

impl ChunkTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, stream_id: u32, index: u32, data: Bytes) {
        let mut guard = self.streams.lock().await;
        guard.entry(stream_id).or_default().insert(index, data);
    }

    pub(crate) async fn len(&self, stream_id: u32) -> usize {
        self.streams
            .lock()
            .await
            .get(&stream_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub(crate) async fn take(&self, stream_id: u32) -> HashMap<u32, Bytes> {
        self.streams.lock().await.remove(&stream_id).unwrap_or_default()
    }
}

/// Encodes one file chunk frame: `chunk_index(4) is_last(1) data`.
pub(crate) fn encode_chunk_frame(chunk_index: u32, is_last: bool, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHUNK_INDEX_SIZE + IS_LAST_FLAG_SIZE + data.len());
    buf.put_u32_le(chunk_index);
    buf.put_u8(if is_last { b'1' } else { b'0' });
    buf.extend_from_slice(data);
    buf.freeze()
}

pub(crate) fn decode_chunk_frame(message: &[u8]) -> Result<(u32, bool, Bytes)> {
    if message.len() < CHUNK_INDEX_SIZE + IS_LAST_FLAG_SIZE {
        return Err(Error::TruncatedHeader);
    }
    let mut reader = message;
    let chunk_index = reader.get_u32_le();
    let flag = reader.get_u8();
    let is_last = match flag {
        b'0' => false,
        b'1' => true,
        other => return Err(Error::InvalidIsLastFlag(other)),
    };
    Ok((chunk_index, is_last, Bytes::copy_from_slice(reader)))
}

/// Splits `path` into chunks and drives them across `stream_id` as reliable
/// stream messages, then releases the stream back to the pool once
/// retransmission has had time to settle.
pub(crate) async fn drive_file_send<T, H>(peer: Arc<Peer<T, H>>, stream_id: u32, path: PathBuf)
where
    T: Transport + 'static,
    H: Handler + 'static,
{
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    peer.send_reliable_stream_frame(&encode_chunk_frame(0, false, filename.as_bytes()), stream_id)
        .await;

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(err) => {
            log::warn!("send_file: failed to open {}: {err}", path.display());
            peer.release_file_stream(stream_id).await;
            return;
        }
    };

    let chunk_size = peer.file_chunk_size();
    let mut buf = vec![0u8; chunk_size];
    let mut index = 0u32;
    loop {
        let n = match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                log::warn!("send_file: read error on {}: {err}", path.display());
                break;
            }
        };
        index += 1;
        peer.send_reliable_stream_frame(&encode_chunk_frame(index, false, &buf[..n]), stream_id)
            .await;
    }

    index += 1;
    peer.send_reliable_stream_frame(&encode_chunk_frame(index, true, &[]), stream_id)
        .await;

    peer.release_file_stream_after(stream_id).await;
}

/// Polls the chunk table for `stream_id` until every chunk `0..total_chunks`
/// has arrived, then reassembles and delivers the file.
pub(crate) async fn finalize_file<T, H>(peer: Arc<Peer<T, H>>, stream_id: u32, total_chunks: u32)
where
    T: Transport + 'static,
    H: Handler + 'static,
{
    while (peer.file_chunk_count(stream_id).await as u32) < total_chunks {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut chunks = peer.take_file_chunks(stream_id).await;

    let filename = match chunks.remove(&0) {
        Some(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(name) => name,
            Err(_) => {
                log::warn!("file on stream {stream_id}: filename chunk is not valid utf8");
                return;
            }
        },
        None => {
            log::warn!("file on stream {stream_id}: missing filename chunk");
            return;
        }
    };

    let mut data = BytesMut::new();
    for index in 1..total_chunks {
        match chunks.remove(&index) {
            Some(chunk) => data.extend_from_slice(&chunk),
            None => {
                log::warn!("file on stream {stream_id}: missing chunk {index}");
                return;
            }
        }
    }

    peer.deliver_file(filename, data.freeze()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_frame_round_trips() {
        let frame = encode_chunk_frame(3, false, b"payload");
        let (index, is_last, data) = decode_chunk_frame(&frame).unwrap();
        assert_eq!(index, 3);
        assert!(!is_last);
        assert_eq!(data, Bytes::from_static(b"payload"));
    }

    #[test]
    fn end_of_file_sentinel_has_no_data() {
        let frame = encode_chunk_frame(4, true, &[]);
        let (index, is_last, data) = decode_chunk_frame(&frame).unwrap();
        assert_eq!(index, 4);
        assert!(is_last);
        assert!(data.is_empty());
    }

    #[test]
    fn garbage_is_last_flag_is_rejected() {
        let mut frame = encode_chunk_frame(0, false, b"x").to_vec();
        frame[4] = b'x';
        assert!(matches!(
            decode_chunk_frame(&frame),
            Err(Error::InvalidIsLastFlag(b'x'))
        ));
    }

    #[tokio::test]
    async fn chunk_table_tracks_arrivals_per_stream() {
        let table = ChunkTable::new();
        table.insert(7771, 0, Bytes::from_static(b"name.txt")).await;
        table.insert(7771, 1, Bytes::from_static(b"data")).await;
        assert_eq!(table.len(7771).await, 2);
        assert_eq!(table.len(7772).await, 0);

        let taken = table.take(7771).await;
        assert_eq!(taken.len(), 2);
        assert_eq!(table.len(7771).await, 0);
    }
}
