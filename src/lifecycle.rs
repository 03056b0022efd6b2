//! Install/activate lifecycle for a worker generation.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::{delete_partition, partition_names, CachePartition};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::net::Fetch;
use crate::store::Store;
use crate::sync::BroadcastMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
  Installing,
  Installed,
  Activating,
  Active,
}

/// Drives one worker generation from install through activation.
///
/// Install pre-populates the current static partition all-or-nothing;
/// activation sweeps every partition that is not current and then takes
/// control of open contexts.
pub struct LifecycleManager<F: Fetch> {
  store: Arc<Store>,
  fetcher: Arc<F>,
  config: Config,
  broadcast: broadcast::Sender<BroadcastMessage>,
  phase: WorkerPhase,
}

impl<F: Fetch> LifecycleManager<F> {
  pub fn new(
    store: Arc<Store>,
    fetcher: Arc<F>,
    config: Config,
    broadcast: broadcast::Sender<BroadcastMessage>,
  ) -> Self {
    Self {
      store,
      fetcher,
      config,
      broadcast,
      phase: WorkerPhase::Installing,
    }
  }

  pub fn phase(&self) -> WorkerPhase {
    self.phase
  }

  /// Fetch the precache manifest and populate the static partition.
  ///
  /// All-or-nothing: every asset is fetched before anything is written,
  /// and the batch write is transactional. Any failure aborts install
  /// and the worker never becomes ready.
  pub async fn install(&mut self) -> Result<()> {
    info!(version = %self.config.cache.version, "installing worker generation");

    let mut assets: Vec<(Request, Response)> = Vec::new();
    for path in &self.config.cache.precache {
      let url = self
        .config
        .origin
        .join(path)
        .map_err(|e| Error::Config(format!("invalid precache path {path}: {e}")))?;
      let request = Request::get(url);

      let response = self.fetcher.fetch(&request).await?;
      if !response.is_success() {
        return Err(Error::NetworkFailure(format!(
          "precache fetch for {path} returned {}",
          response.status
        )));
      }
      assets.push((request, response));
    }

    let partition = CachePartition::open(Arc::clone(&self.store), self.config.static_partition());
    partition.put_all(&assets)?;

    info!(
      partition = partition.name(),
      assets = assets.len(),
      "static partition populated"
    );
    self.phase = WorkerPhase::Installed;
    Ok(())
  }

  /// Sweep stale partitions and take control of open contexts. After
  /// this, the live partition set is exactly the current static and
  /// dynamic names.
  pub async fn activate(&mut self) -> Result<()> {
    self.phase = WorkerPhase::Activating;

    let keep_static = self.config.static_partition();
    let keep_dynamic = self.config.dynamic_partition();

    for name in partition_names(&self.store)? {
      if name != keep_static && name != keep_dynamic {
        info!(partition = %name, "deleting stale cache partition");
        delete_partition(&self.store, &name)?;
      }
    }

    self.phase = WorkerPhase::Active;
    if self.broadcast.send(BroadcastMessage::ControllerChange).is_err() {
      debug!("no open contexts to claim");
    }

    Ok(())
  }
}
