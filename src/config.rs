use std::time::Duration;

/// Reserved stream ids dedicated to file transfer. A fixed pool keeps the
/// number of concurrent transfers bounded.
pub const FILE_TRANSFER_STREAMS: [u32; 4] = [7771, 7772, 7773, 7774];

/// Tunable constants for a [`Peer`](crate::peer::Peer).
///
/// Defaults match the reference implementation.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Quantum read from the transport on every poll of the listener loop.
    pub read_chunk_size: usize,
    /// Chunk size used when splitting a file for `send_file`. Distinct from
    /// `read_chunk_size`: the reference reuses one constant for both, but
    /// they are unrelated concerns.
    pub file_chunk_size: usize,
    /// How long a reliable sender waits for an ACK before retransmitting.
    pub ack_arrival_time: Duration,
    /// How long a file sender waits after the end-of-file marker before
    /// releasing its stream id, to let trailing retransmissions drain.
    pub wait_before_file_stream_release: Duration,
    /// The fixed set of stream ids reserved for file transfer.
    pub file_transfer_streams: Vec<u32>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            read_chunk_size: 1024,
            file_chunk_size: 1024,
            ack_arrival_time: Duration::from_millis(500),
            wait_before_file_stream_release: Duration::from_secs(4),
            file_transfer_streams: FILE_TRANSFER_STREAMS.to_vec(),
        }
    }
}

impl PeerConfig {
    pub(crate) fn is_file_stream(&self, stream_id: u32) -> bool {
        self.file_transfer_streams.contains(&stream_id)
    }
}
