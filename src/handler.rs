use async_trait::async_trait;
use bytes::Bytes;

/// Upcalls raised by a [`Peer`](crate::peer::Peer) as it delivers parsed
/// messages. Implemented by the embedder.
#[async_trait]
pub trait Handler: Send + Sync {
    /// A reliable, non-streamed message. Delivered exactly once even under
    /// retransmission.
    async fn on_reliable_message(&self, message: Bytes);

    /// An unreliable, non-streamed message. Best effort; no dedup needed
    /// since it is never retransmitted.
    async fn on_unreliable_message(&self, message: Bytes);

    /// A reliable message tagged with an application stream id (i.e. not
    /// one of the reserved file-transfer stream ids).
    async fn on_reliable_stream_message(&self, message: Bytes, stream_id: u32);

    /// An unreliable message tagged with an application stream id.
    async fn on_unreliable_stream_message(&self, message: Bytes, stream_id: u32);

    /// A whole file, reassembled from its chunks.
    async fn on_file(&self, filename: String, file_data: Bytes);
}
