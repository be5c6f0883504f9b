//! Save-queue consumer.
//!
//! Departing players are handed to a channel by the tick thread; this task
//! drains it off the tick path. There is no storage backend, so each save is
//! logged and counted.

use keystone_core::collab::SaveRequest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawn the consumer. The task ends when every sender is dropped and
/// returns the number of saves it processed.
pub fn spawn_save_consumer(mut receiver: mpsc::Receiver<SaveRequest>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut saved: u64 = 0;
        while let Some(request) = receiver.recv().await {
            info!(
                entity = %request.entity,
                username = %request.username,
                position = %request.position,
                requested_at = %request.requested_at,
                "Player saved"
            );
            saved = saved.saturating_add(1);
        }
        info!(saved, "Save queue closed");
        saved
    })
}
