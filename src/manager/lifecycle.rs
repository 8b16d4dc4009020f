use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ConnectionManager, WorkerSlot, cancel_slot, release_logged};
use crate::error::AdapterError;
use crate::handle::HandleInfo;
use crate::traits::ConnectionLifecycle;

#[async_trait]
impl ConnectionLifecycle for ConnectionManager {
    async fn open(&self, worker: &str) -> Result<HandleInfo, AdapterError> {
        let (slot, mut handle) = self.checkout(worker).await;
        let outcome = self.dial(&mut handle).await;
        slot.sync_canceller(&handle);
        outcome?;
        Ok(handle.info())
    }

    async fn release(&self, worker: &str) {
        let Some(slot) = self.lookup(worker) else {
            return;
        };
        let mut handle = slot.handle.lock().await;
        debug!(connection = worker, state = %handle.state(), "Releasing connection");
        release_logged(&mut handle).await;
        slot.sync_canceller(&handle);
    }

    fn cancel(&self, worker: &str) -> bool {
        self.lookup(worker)
            .is_some_and(|slot| cancel_slot(worker, &slot))
    }

    async fn cleanup_all(&self) -> Vec<String> {
        let drained: Vec<(String, Arc<WorkerSlot>)> = {
            let mut slots = self.slots();
            slots.drain().collect()
        };

        let mut released = Vec::with_capacity(drained.len());
        for (name, slot) in drained {
            let mut handle = slot.handle.lock().await;
            if handle.transaction_open() {
                debug!(connection = %name, "Connection still has an open transaction; rolling back");
            }
            release_logged(&mut handle).await;
            slot.sync_canceller(&handle);
            slot.retire();
            released.push(name);
        }
        released.sort();
        released
    }
}
