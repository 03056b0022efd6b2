//! Wires the store, router, queue, drainer and lifecycle into one
//! worker-context engine. The page context talks to it only through
//! messages, the queue and the broadcast channel.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::cache::CacheRouter;
use crate::config::Config;
use crate::error::Result;
use crate::http::{Request, Response};
use crate::lifecycle::{LifecycleManager, WorkerPhase};
use crate::net::Fetch;
use crate::store::Store;
use crate::sync::{
  BroadcastMessage, DrainOutcome, Notification, RetryDrainer, SyncQueueManager, SyncTrigger,
};

/// Message sent from a page context to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
  /// Force immediate activation of a newly installed generation.
  SkipWaiting,
}

pub struct Worker<F: Fetch> {
  router: CacheRouter<F>,
  queue: SyncQueueManager,
  drainer: RetryDrainer<F>,
  lifecycle: LifecycleManager<F>,
  broadcast: broadcast::Sender<BroadcastMessage>,
  sync_requests: mpsc::UnboundedReceiver<SyncTrigger>,
}

impl<F: Fetch> Worker<F> {
  /// Build a worker over a shared store and fetcher. The returned
  /// receiver carries per-item delivery notifications.
  pub fn new(
    config: Config,
    store: Arc<Store>,
    fetcher: Arc<F>,
  ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = broadcast::channel(16);
    let (trigger_tx, sync_requests) = mpsc::unbounded_channel();

    let queue = SyncQueueManager::new(Arc::clone(&store)).with_trigger(trigger_tx);
    let router = CacheRouter::new(Arc::clone(&fetcher), Arc::clone(&store), &config)?;

    let mut drainer = RetryDrainer::new(
      queue.clone(),
      Arc::clone(&fetcher),
      config.probe_url()?,
      notify_tx,
      broadcast_tx.clone(),
    );
    if let Some(backoff) = config.sync.backoff {
      drainer = drainer.with_backoff(backoff);
    }

    let lifecycle = LifecycleManager::new(store, fetcher, config, broadcast_tx.clone());

    Ok((
      Self {
        router,
        queue,
        drainer,
        lifecycle,
        broadcast: broadcast_tx,
        sync_requests,
      },
      notify_rx,
    ))
  }

  /// Install this generation and activate it immediately; the engine
  /// never holds a generation in the waiting phase on its own.
  pub async fn start(&mut self) -> Result<()> {
    self.lifecycle.install().await?;
    self.lifecycle.activate().await
  }

  /// Observe broadcasts (sync completion, controller changes).
  pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
    self.broadcast.subscribe()
  }

  pub fn phase(&self) -> WorkerPhase {
    self.lifecycle.phase()
  }

  pub fn queue(&self) -> &SyncQueueManager {
    &self.queue
  }

  /// Route one intercepted request.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
    self.router.route(request).await
  }

  pub async fn handle_message(&mut self, message: WorkerMessage) -> Result<()> {
    match message {
      WorkerMessage::SkipWaiting => {
        if self.lifecycle.phase() == WorkerPhase::Installed {
          self.lifecycle.activate().await?;
        }
        Ok(())
      }
    }
  }

  /// Connectivity-regained signal: run one drain pass.
  pub async fn on_connectivity(&mut self) -> Result<DrainOutcome> {
    self.drainer.on_connectivity().await
  }

  /// Pop the oldest pending retry registration, if any. The platform
  /// holding the worker uses this to know a drain is wanted.
  pub fn take_sync_request(&mut self) -> Option<SyncTrigger> {
    self.sync_requests.try_recv().ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::FakeFetcher;
  use url::Url;

  fn request(path: &str) -> Request {
    Request::get(Url::parse(&format!("http://localhost:8080{path}")).unwrap())
  }

  async fn started_worker() -> (Worker<FakeFetcher>, Arc<FakeFetcher>, mpsc::UnboundedReceiver<Notification>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let fetcher = Arc::new(FakeFetcher::new());
    for path in &Config::default().cache.precache {
      fetcher.respond(path, format!("asset {path}").as_bytes());
    }
    fetcher.respond("/manifest.json", b"{}");

    let (mut worker, notifications) =
      Worker::new(Config::default(), store, Arc::clone(&fetcher)).unwrap();
    worker.start().await.unwrap();
    (worker, fetcher, notifications)
  }

  #[tokio::test]
  async fn test_start_installs_and_activates() {
    let (worker, _fetcher, _notifications) = started_worker().await;
    assert_eq!(worker.phase(), WorkerPhase::Active);
  }

  #[tokio::test]
  async fn test_precached_fetch_serves_without_network() {
    let (worker, fetcher, _notifications) = started_worker().await;
    let calls_after_install = fetcher.call_count("/index.html");

    let resp = worker.handle_fetch(&request("/index.html")).await.unwrap();

    assert_eq!(resp.body, b"asset /index.html");
    assert_eq!(fetcher.call_count("/index.html"), calls_after_install);
  }

  #[tokio::test]
  async fn test_enqueue_then_connectivity_round_trip() {
    let (mut worker, _fetcher, mut notifications) = started_worker().await;
    let mut broadcasts = worker.subscribe();

    let receipt = worker.queue().enqueue("hello").await.unwrap();
    assert!(receipt.sync_registered);
    assert!(worker.take_sync_request().is_some());

    let outcome = worker.on_connectivity().await.unwrap();
    assert_eq!(outcome, DrainOutcome::Drained { delivered: 1 });

    assert!(worker.queue().list_pending().await.unwrap().is_empty());
    assert!(notifications.try_recv().unwrap().body.contains("hello"));
    assert_eq!(broadcasts.try_recv().unwrap(), BroadcastMessage::SyncComplete);
  }

  #[tokio::test]
  async fn test_skip_waiting_message_is_accepted_when_active() {
    let (mut worker, _fetcher, _notifications) = started_worker().await;
    worker.handle_message(WorkerMessage::SkipWaiting).await.unwrap();
    assert_eq!(worker.phase(), WorkerPhase::Active);
  }
}
