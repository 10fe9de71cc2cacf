//! Live-update notifications for connected clients.

use anyhow::Result;
use serde::Serialize;

use crate::models::ContentItem;

/// An event pushed to an owner's connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    /// A capture was saved. Carries the primary row.
    ContentUpdate { content: ContentItem },
}

impl ContentEvent {
    /// Event name used on the wire (`"content_update"`).
    pub fn name(&self) -> &'static str {
        match self {
            ContentEvent::ContentUpdate { .. } => "content_update",
        }
    }
}

/// Delivers events to an owner's live connections.
///
/// Delivery is best effort. Callers log a returned error and carry on;
/// it never undoes the write that triggered it.
pub trait Notifier: Send + Sync {
    fn notify(&self, owner_id: &str, event: ContentEvent) -> Result<()>;
}

/// Discards every event.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _owner_id: &str, _event: ContentEvent) -> Result<()> {
        Ok(())
    }
}
