//! Pending-message queue over the store's `sync_queue` collection.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::records::SyncQueueItem;
use crate::store::Store;

/// Tag identifying the queued-messages retry registration.
pub const SYNC_MESSAGES_TAG: &str = "sync-messages";

/// A request to retry delivery once connectivity returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTrigger {
  pub tag: &'static str,
}

/// Receipt for an enqueued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
  pub id: i64,
  /// False when no retry trigger is wired up; the caller should tell the
  /// user delivery waits for a manual attempt.
  pub sync_registered: bool,
}

/// Owns the sync-queue collection. Items are created here on enqueue and
/// destroyed on confirmed delivery; nothing else touches them.
#[derive(Clone)]
pub struct SyncQueueManager {
  store: Arc<Store>,
  trigger: Option<mpsc::UnboundedSender<SyncTrigger>>,
}

impl SyncQueueManager {
  pub fn new(store: Arc<Store>) -> Self {
    Self {
      store,
      trigger: None,
    }
  }

  /// Wire up the retry registration channel.
  pub fn with_trigger(mut self, trigger: mpsc::UnboundedSender<SyncTrigger>) -> Self {
    self.trigger = Some(trigger);
    self
  }

  /// Store a message for later delivery and register a retry trigger.
  /// The receipt says synchronously whether registration worked.
  pub async fn enqueue(&self, text: &str) -> Result<Enqueued> {
    let mut item = SyncQueueItem::new(text);
    let id = self.store.put(&mut item)?;
    debug!(id, "queued message for background sync");

    let sync_registered = match &self.trigger {
      Some(tx) => tx.send(SyncTrigger { tag: SYNC_MESSAGES_TAG }).is_ok(),
      None => false,
    };
    if !sync_registered {
      warn!(id, "background sync unavailable; message waits for a manual drain");
    }

    Ok(Enqueued { id, sync_registered })
  }

  /// Pending items in insertion order (id ascending).
  pub async fn list_pending(&self) -> Result<Vec<SyncQueueItem>> {
    self.store.get_all()
  }

  /// Delete a delivered item; a no-op when already absent.
  pub async fn remove(&self, id: i64) -> Result<()> {
    self.store.delete::<SyncQueueItem>(id)
  }

  /// Drop every pending item.
  pub async fn clear(&self) -> Result<()> {
    self.store.clear::<SyncQueueItem>()
  }
}
