//! Sender-side reliability: the outstanding-ACK table and the per-message
//! retransmit task.
//!
//! Grounded on `webrtc-sctp`'s `timer::ack_timer::AckTimer` spawn shape,
//! simplified: there is no timer-cancel channel because the loop's own exit
//! condition (the ACK flag) is sufficient — spec.md explicitly has no
//! external cancel primitive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::transport::Transport;

/// Tracks which in-flight reliable message ids have been acknowledged.
///
/// Entries persist for the lifetime of the peer — this is deliberately
/// unbounded (spec.md §9: "a design choice to flag, not a bug to silently
/// fix").
#[derive(Default)]
pub(crate) struct AckTable {
    entries: Mutex<HashMap<u32, Arc<AtomicBool>>>,
}

impl AckTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new outstanding message id and returns the flag the
    /// retransmitter should poll.
    pub(crate) async fn register(&self, msg_id: u32) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.entries.lock().await.insert(msg_id, Arc::clone(&flag));
        flag
    }

    /// Marks `msg_id` acked. Returns `false` if `msg_id` was never
    /// registered (an unknown ACK, logged and ignored by the caller).
    pub(crate) async fn mark_acked(&self, msg_id: u32) -> bool {
        if let Some(flag) = self.entries.lock().await.get(&msg_id) {
            flag.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

/// Spawns the retransmit loop for one outstanding reliable message: send
/// once, wait `interval`, and keep resending the byte-identical frame until
/// `acked` is observed true. No backoff, no retry cap — matches spec.md
/// §4.4 exactly.
pub(crate) fn spawn_retransmitter<T>(
    transport: Arc<T>,
    frame: Bytes,
    acked: Arc<AtomicBool>,
    interval: Duration,
) where
    T: Transport + 'static,
{
    tokio::spawn(async move {
        loop {
            if let Err(err) = transport.send(&frame).await {
                log::warn!("failed to send reliable frame: {err}");
            }
            tokio::time::sleep(interval).await;
            if acked.load(Ordering::SeqCst) {
                break;
            }
        }
    });
}
