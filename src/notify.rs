//! Broadcast-backed live updates.
//!
//! [`BroadcastNotifier`] fans capture events out to every subscriber over a
//! bounded `tokio::sync::broadcast` channel. Subscribers filter by owner.
//! A subscriber that falls behind skips the events it missed.

use anyhow::Result;
use tokio::sync::broadcast;

pub use synapse_core::notify::{ContentEvent, Notifier};

/// Events buffered per subscriber before older ones are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// An event tagged with the owner it belongs to.
#[derive(Debug, Clone)]
pub struct OwnedEvent {
    pub owner_id: String,
    pub event: ContentEvent,
}

pub struct BroadcastNotifier {
    sender: broadcast::Sender<OwnedEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OwnedEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, owner_id: &str, event: ContentEvent) -> Result<()> {
        let owned = OwnedEvent {
            owner_id: owner_id.to_string(),
            event,
        };
        match self.sender.send(owned) {
            Ok(receivers) => {
                tracing::debug!(owner_id, receivers, "content event delivered");
            }
            Err(_) => {
                tracing::debug!(owner_id, "content event dropped; no listeners");
            }
        }
        Ok(())
    }
}

/// Wait for the next event addressed to `owner_id`.
///
/// Returns `None` once the channel is closed.
pub async fn next_for_owner(
    receiver: &mut broadcast::Receiver<OwnedEvent>,
    owner_id: &str,
) -> Option<ContentEvent> {
    loop {
        match receiver.recv().await {
            Ok(owned) if owned.owner_id == owner_id => return Some(owned.event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(owner_id, skipped, "live update subscriber lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
