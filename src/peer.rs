//! The public façade: [`Peer`] ties the codec, reliability engine, stream
//! pool, and file transfer driver to a concrete [`Transport`] and delivers
//! parsed messages to a [`Handler`].
//!
//! Grounded on `webrtc-sctp`'s `association::Association`, which plays the
//! same role of owning a single read loop over a transport and dispatching
//! to upcalls; the read loop's resynchronisation logic is instead grounded
//! on `abstract_peer.py`'s barker-scanning receive loop, since SCTP's framing
//! does not need to resynchronise.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::codec::{self, Unwrapped, BARKER, BARKER_LEN};
use crate::config::PeerConfig;
use crate::error::{Error, Result};
use crate::file_transfer::{self, ChunkTable};
use crate::handler::Handler;
use crate::reliability::{self, AckTable};
use crate::stream_pool::StreamPool;
use crate::transport::Transport;

pub struct Peer<T, H> {
    transport: Arc<T>,
    handler: Arc<H>,
    config: PeerConfig,
    next_msg_id: AtomicU32,
    ack_table: AckTable,
    chunk_table: ChunkTable,
    stream_pool: StreamPool,
}

impl<T, H> Peer<T, H>
where
    T: Transport + 'static,
    H: Handler + 'static,
{
    /// Builds a peer over `transport` with default tuning and immediately
    /// spawns its listener task.
    pub fn new(transport: T, handler: H) -> Arc<Self> {
        Self::with_config(transport, handler, PeerConfig::default())
    }

    pub fn with_config(transport: T, handler: H, config: PeerConfig) -> Arc<Self> {
        let stream_pool = StreamPool::new(&config.file_transfer_streams);
        let peer = Arc::new(Peer {
            transport: Arc::new(transport),
            handler: Arc::new(handler),
            config,
            next_msg_id: AtomicU32::new(1),
            ack_table: AckTable::new(),
            chunk_table: ChunkTable::new(),
            stream_pool,
        });

        let listener = Arc::clone(&peer);
        tokio::spawn(async move { listener.listen().await });

        peer
    }

    fn allocate_msg_id(&self) -> u32 {
        self.next_msg_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn spawn_reliable_send(&self, frame: Bytes, msg_id: u32) {
        let acked = self.ack_table.register(msg_id).await;
        reliability::spawn_retransmitter(
            Arc::clone(&self.transport),
            frame,
            acked,
            self.config.ack_arrival_time,
        );
    }

    /// Sends a one-shot message with retransmission until acked.
    pub async fn send_reliable(&self, payload: &[u8]) {
        let msg_id = self.allocate_msg_id();
        let frame = codec::wrap_reliable(payload, msg_id);
        self.spawn_reliable_send(frame, msg_id).await;
    }

    /// Sends a one-shot message with no delivery guarantee.
    pub async fn send_unreliable(&self, payload: &[u8]) -> Result<()> {
        self.transport.send(&codec::wrap_unreliable(payload)).await
    }

    /// Sends a reliable message tagged with an application stream id.
    /// `stream_id` must not be one of the reserved file-transfer ids.
    pub async fn send_reliable_stream(&self, payload: &[u8], stream_id: u32) {
        self.send_reliable_stream_frame(payload, stream_id).await;
    }

    /// Sends an unreliable message tagged with an application stream id.
    pub async fn send_unreliable_stream(&self, payload: &[u8], stream_id: u32) -> Result<()> {
        self.transport
            .send(&codec::wrap_unreliable_stream(payload, stream_id))
            .await
    }

    /// Queues `path` for whole-file transfer. Acquires a stream from the
    /// reserved pool (blocking the returned future until one frees up if all
    /// four are busy), then drives the transfer on a background task.
    pub async fn send_file(self: &Arc<Self>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::NoSuchFile {
                path: path.display().to_string(),
            });
        }

        let stream_id = self.stream_pool.acquire().await;
        let peer = Arc::clone(self);
        tokio::spawn(async move {
            file_transfer::drive_file_send(peer, stream_id, path).await;
        });
        Ok(())
    }

    pub(crate) async fn send_reliable_stream_frame(&self, payload: &[u8], stream_id: u32) {
        let msg_id = self.allocate_msg_id();
        let frame = codec::wrap_reliable_stream(payload, msg_id, stream_id);
        self.spawn_reliable_send(frame, msg_id).await;
    }

    pub(crate) fn file_chunk_size(&self) -> usize {
        self.config.file_chunk_size
    }

    pub(crate) async fn file_chunk_count(&self, stream_id: u32) -> usize {
        self.chunk_table.len(stream_id).await
    }

    pub(crate) async fn take_file_chunks(&self, stream_id: u32) -> std::collections::HashMap<u32, Bytes> {
        self.chunk_table.take(stream_id).await
    }

    pub(crate) async fn deliver_file(&self, filename: String, data: Bytes) {
        self.handler.on_file(filename, data).await;
    }

    pub(crate) async fn release_file_stream(&self, stream_id: u32) {
        self.stream_pool.release(stream_id).await;
    }

    /// Waits long enough for straggling retransmissions of the final chunk
    /// to be acked before handing the stream id back to the pool.
    pub(crate) async fn release_file_stream_after(&self, stream_id: u32) {
        tokio::time::sleep(self.config.wait_before_file_stream_release).await;
        self.stream_pool.release(stream_id).await;
    }

    async fn listen(self: Arc<Self>) {
        let mut data = BytesMut::new();
        let mut received_ids: HashSet<u32> = HashSet::new();
        let mut read_buf = vec![0u8; self.config.read_chunk_size];

        loop {
            let n = match self.transport.recv(&mut read_buf).await {
                Ok(n) => n,
                Err(err) => {
                    log::warn!("transport recv failed, stopping listener: {err}");
                    break;
                }
            };
            if n == 0 {
                continue;
            }
            data.extend_from_slice(&read_buf[..n]);

            let barker_pos = match find_subslice(&data, BARKER) {
                Some(pos) => pos,
                None => {
                    log::debug!("no barker in {} buffered bytes, discarding", data.len());
                    let keep_from = data.len().saturating_sub(BARKER_LEN.saturating_sub(1));
                    data = data.split_off(keep_from);
                    continue;
                }
            };
            if barker_pos > 0 {
                log::debug!("dropping {barker_pos} garbage bytes before next barker");
                let _ = data.split_to(barker_pos);
            }

            let candidates = split_into_candidates(&data);
            let (last, rest) = candidates.split_last().expect("at least one candidate");
            for candidate in rest {
                match codec::unwrap(candidate) {
                    Ok(unwrapped) => self.dispatch(unwrapped, &mut received_ids).await,
                    Err(err) => log::warn!("dropping unparseable packet: {err}"),
                }
            }

            match codec::unwrap(last) {
                Ok(unwrapped) => {
                    let tail = unwrapped.redundant_tail.clone();
                    self.dispatch(unwrapped, &mut received_ids).await;
                    data = BytesMut::from(&tail[..]);
                }
                Err(Error::TruncatedHeader) => {
                    // may simply be incomplete so far; keep it and wait for more bytes
                    data = BytesMut::from(&last[..]);
                }
                Err(err) => {
                    log::warn!("dropping unparseable packet: {err}");
                    data = BytesMut::new();
                }
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, unwrapped: Unwrapped, received_ids: &mut HashSet<u32>) {
        if let Some(acked_id) = unwrapped.acked_msg_id {
            if !self.ack_table.mark_acked(acked_id).await {
                log::warn!("ack for unknown message id {acked_id}");
            }
            return;
        }

        let Some(msg_id) = unwrapped.msg_id else {
            match unwrapped.stream_id {
                None => self.handler.on_unreliable_message(unwrapped.payload).await,
                Some(stream_id) => {
                    self.handler
                        .on_unreliable_stream_message(unwrapped.payload, stream_id)
                        .await
                }
            }
            return;
        };

        if let Err(err) = self.transport.send(&codec::wrap_ack(msg_id)).await {
            log::warn!("failed to ack message {msg_id}: {err}");
        }

        if !received_ids.insert(msg_id) {
            log::trace!("dropping duplicate delivery of message {msg_id}");
            return;
        }

        match unwrapped.stream_id {
            None => self.handler.on_reliable_message(unwrapped.payload).await,
            Some(stream_id) if self.config.is_file_stream(stream_id) => {
                self.handle_file_chunk(stream_id, unwrapped.payload).await;
            }
            Some(stream_id) => {
                self.handler
                    .on_reliable_stream_message(unwrapped.payload, stream_id)
                    .await
            }
        }
    }

    async fn handle_file_chunk(self: &Arc<Self>, stream_id: u32, payload: Bytes) {
        let (chunk_index, is_last, data) = match file_transfer::decode_chunk_frame(&payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("malformed file chunk on stream {stream_id}: {err}");
                return;
            }
        };

        if is_last {
            let peer = Arc::clone(self);
            tokio::spawn(async move {
                file_transfer::finalize_file(peer, stream_id, chunk_index).await;
            });
        } else {
            self.chunk_table.insert(stream_id, chunk_index, data).await;
        }
    }
}

/// Finds the first occurrence of `needle` in `haystack`, if any.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `data` (known to start with [`BARKER`]) into candidate frames at
/// every subsequent barker occurrence. The last candidate may be incomplete.
fn split_into_candidates(data: &[u8]) -> Vec<Bytes> {
    let mut starts = vec![0usize];
    let mut search_from = BARKER_LEN;
    while let Some(rel) = find_subslice(&data[search_from..], BARKER) {
        let pos = search_from + rel;
        starts.push(pos);
        search_from = pos + BARKER_LEN;
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(data.len());
            Bytes::copy_from_slice(&data[start..end])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_into_candidates_finds_each_frame_start() {
        let p1 = codec::wrap_unreliable(b"a");
        let p2 = codec::wrap_unreliable(b"b");
        let mut combined = p1.to_vec();
        combined.extend_from_slice(&p2);

        let candidates = split_into_candidates(&combined);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], p1);
        assert_eq!(candidates[1], p2);
    }

    #[test]
    fn split_into_candidates_handles_single_frame() {
        let p1 = codec::wrap_unreliable(b"solo");
        let candidates = split_into_candidates(&p1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], p1);
    }
}
