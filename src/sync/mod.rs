//! Durable message queue and the retry loop that drains it.

mod drainer;
mod queue;

pub use drainer::{DrainOutcome, DrainState, RetryDrainer};
pub use queue::{Enqueued, SyncQueueManager, SyncTrigger, SYNC_MESSAGES_TAG};

/// Message fanned out to every observing context from the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMessage {
  /// A drain pass delivered every pending item.
  SyncComplete,
  /// A newly activated worker generation took control.
  ControllerChange,
}

/// User-visible notification emitted once per delivered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  /// Stable tag so a later notification replaces an earlier one.
  pub tag: String,
}

impl Notification {
  /// Delivery notice for one synced message, with how long it waited.
  pub fn delivery(text: &str, wait_secs: i64) -> Self {
    let plural = if wait_secs == 1 { "" } else { "s" };
    Self {
      title: "Background Sync Complete!".to_string(),
      body: format!("Message \"{text}\" synced after {wait_secs} second{plural}!"),
      tag: "sync-notification".to_string(),
    }
  }
}
