//! Mutual-exclusion pool over the fixed set of file-transfer stream ids.
//!
//! spec.md §4.5 describes the reference pool as a busy-wait spin; spec.md §9
//! explicitly flags that as something that "should become a condition
//! variable or a bounded channel of available stream ids" — this is that
//! redesign, using [`tokio::sync::Notify`] instead of spinning.

use std::collections::HashMap;

use tokio::sync::{Mutex, Notify};

pub(crate) struct StreamPool {
    available: Mutex<HashMap<u32, bool>>,
    notify: Notify,
}

impl StreamPool {
    pub(crate) fn new(ids: &[u32]) -> Self {
        let available = ids.iter().map(|&id| (id, true)).collect();
        StreamPool {
            available: Mutex::new(available),
            notify: Notify::new(),
        }
    }

    /// Blocks until a stream id is free, then marks it taken and returns it.
    pub(crate) async fn acquire(&self) -> u32 {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.available.lock().await;
                if let Some((&id, free)) = guard.iter_mut().find(|(_, free)| **free) {
                    *free = false;
                    return id;
                }
            }
            notified.await;
        }
    }

    /// Returns a previously acquired stream id to the pool.
    pub(crate) async fn release(&self, id: u32) {
        {
            let mut guard = self.available.lock().await;
            guard.insert(id, true);
        }
        self.notify.notify_one();
    }
}
