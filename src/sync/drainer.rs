//! Retry loop delivering queued messages once connectivity returns.
//!
//! One drain pass walks the queue in insertion order. Each item is
//! confirmed with a liveness probe before it is deleted; the first probe
//! failure stops the pass and leaves the current and all remaining items
//! queued, so the whole batch is retried from a fresh listing on the next
//! connectivity signal. Delivery is at-least-once and in order.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use url::Url;

use super::queue::SyncQueueManager;
use super::{BroadcastMessage, Notification};
use crate::config::BackoffConfig;
use crate::error::Result;
use crate::http::Request;
use crate::net::Fetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
  Idle,
  Draining,
  /// The last pass hit a probe failure; the batch waits for the next
  /// connectivity signal.
  Failed,
}

/// Result of one connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Every pending item was delivered this pass.
  Drained { delivered: usize },
  /// The probe failed partway through; the remainder stays queued.
  Deferred { delivered: usize, remaining: usize },
  /// A backoff window from an earlier failure is still open; nothing
  /// was attempted.
  BackedOff,
}

pub struct RetryDrainer<F: Fetch> {
  queue: SyncQueueManager,
  fetcher: Arc<F>,
  probe_url: Url,
  notifications: mpsc::UnboundedSender<Notification>,
  broadcast: broadcast::Sender<BroadcastMessage>,
  backoff: Option<BackoffConfig>,
  state: DrainState,
  consecutive_failures: u32,
  not_before: Option<DateTime<Utc>>,
}

impl<F: Fetch> RetryDrainer<F> {
  pub fn new(
    queue: SyncQueueManager,
    fetcher: Arc<F>,
    probe_url: Url,
    notifications: mpsc::UnboundedSender<Notification>,
    broadcast: broadcast::Sender<BroadcastMessage>,
  ) -> Self {
    Self {
      queue,
      fetcher,
      probe_url,
      notifications,
      broadcast,
      backoff: None,
      state: DrainState::Idle,
      consecutive_failures: 0,
      not_before: None,
    }
  }

  /// Enable a minimum delay between passes after a failure. Without it
  /// every connectivity signal retries immediately, indefinitely.
  pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
    self.backoff = Some(backoff);
    self
  }

  pub fn state(&self) -> DrainState {
    self.state
  }

  /// Entry point for the connectivity-regained signal. Signals arriving
  /// mid-pass coalesce; the engine runs one pass at a time.
  pub async fn on_connectivity(&mut self) -> Result<DrainOutcome> {
    if let Some(not_before) = self.not_before {
      if Utc::now() < not_before {
        debug!(%not_before, "drain deferred by backoff window");
        return Ok(DrainOutcome::BackedOff);
      }
    }
    self.drain().await
  }

  async fn drain(&mut self) -> Result<DrainOutcome> {
    self.state = DrainState::Draining;

    let pending = self.queue.list_pending().await?;
    if pending.is_empty() {
      debug!("nothing queued, drain pass is a no-op");
      self.settle_idle();
      return Ok(DrainOutcome::Drained { delivered: 0 });
    }

    info!(pending = pending.len(), "draining sync queue");
    let mut delivered = 0;

    for (index, item) in pending.iter().enumerate() {
      if !self.probe().await {
        let remaining = pending.len() - index;
        self.settle_failed();
        info!(delivered, remaining, "connectivity probe failed, deferring batch");
        return Ok(DrainOutcome::Deferred { delivered, remaining });
      }

      let Some(id) = item.id else {
        // Unreachable for store-read items; skip rather than guess.
        continue;
      };

      // Delete first, then notify: presence in the store means pending.
      self.queue.remove(id).await?;
      delivered += 1;

      let wait_secs = item
        .timestamp
        .map(|queued_at| (Utc::now() - queued_at).num_seconds().max(0))
        .unwrap_or(0);
      debug!(id, wait_secs, "message delivered");

      if self
        .notifications
        .send(Notification::delivery(&item.text, wait_secs))
        .is_err()
      {
        debug!(id, "no notification listener attached");
      }
    }

    self.settle_idle();
    if self.broadcast.send(BroadcastMessage::SyncComplete).is_err() {
      debug!("no contexts observing sync completion");
    }

    Ok(DrainOutcome::Drained { delivered })
  }

  /// Lightweight HEAD request proving outbound connectivity. A non-2xx
  /// answer counts as offline, same as a transport failure.
  async fn probe(&self) -> bool {
    let request = Request::head(self.probe_url.clone());
    match self.fetcher.fetch(&request).await {
      Ok(response) => response.is_success(),
      Err(err) => {
        debug!("liveness probe failed: {err}");
        false
      }
    }
  }

  fn settle_idle(&mut self) {
    self.state = DrainState::Idle;
    self.consecutive_failures = 0;
    self.not_before = None;
  }

  fn settle_failed(&mut self) {
    self.state = DrainState::Failed;
    self.consecutive_failures += 1;

    if let Some(backoff) = self.backoff {
      let exponent = self.consecutive_failures.saturating_sub(1).min(16);
      let delay = backoff
        .initial_secs
        .saturating_mul(1 << exponent)
        .min(backoff.max_secs);
      self.not_before = Some(Utc::now() + chrono::Duration::seconds(delay as i64));
    }
  }
}
