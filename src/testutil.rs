//! In-memory transport test doubles used by the integration suite.
//!
//! Grounded on `webrtc-sctp`'s `association_test.rs`, which wires
//! associations together over a channel-backed `Conn` rather than a real
//! socket so tests run deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::transport::Transport;

/// One end of an in-memory duplex pipe.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelTransport {
    /// A sender clone, for tests that need to inject raw bytes (garbage,
    /// truncated frames) without going through `send`.
    pub fn raw_sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.tx.clone()
    }
}

/// Builds a connected pair: writes to one side arrive as reads on the other.
pub fn duplex() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            tx: a_tx,
            rx: Mutex::new(a_rx),
        },
        ChannelTransport {
            tx: b_tx,
            rx: Mutex::new(b_rx),
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        // an unbounded channel never blocks; a closed peer just drops it,
        // which matches the "send may silently vanish" transport contract
        let _ = self.tx.send(bytes.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

/// Wraps a [`Transport`] and silently drops one specific `send` call,
/// counted from zero, to simulate a lost first transmission.
pub struct DropNthSend<T> {
    inner: T,
    counter: AtomicUsize,
    drop_index: usize,
}

impl<T> DropNthSend<T> {
    pub fn new(inner: T, drop_index: usize) -> Self {
        DropNthSend {
            inner,
            counter: AtomicUsize::new(0),
            drop_index,
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for DropNthSend<T> {
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let i = self.counter.fetch_add(1, Ordering::SeqCst);
        if i == self.drop_index {
            return Ok(());
        }
        self.inner.send(bytes).await
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.recv(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_delivers_in_order() {
        let (a, b) = duplex();
        a.send(b"one").await.unwrap();
        a.send(b"two").await.unwrap();

        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"one");
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[tokio::test]
    async fn drop_nth_send_eats_exactly_one_call() {
        let (a, b) = duplex();
        let a = DropNthSend::new(a, 0);
        a.send(b"dropped").await.unwrap();
        a.send(b"kept").await.unwrap();

        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"kept");
    }
}
