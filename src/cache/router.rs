//! Request classification and the four routing strategies.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::partition::CachePartition;
use crate::config::{CacheConfig, Config};
use crate::error::{Error, Result};
use crate::http::{Destination, Request, Response};
use crate::net::Fetch;
use crate::store::Store;

/// The caching strategy a request is routed through. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Precache-manifest paths: serve the static partition, never write.
  CacheFirst,
  /// API paths: the dynamic partition always reflects the last
  /// successful network response.
  NetworkFirst,
  /// Images: serve possibly stale bytes now, revalidate in background.
  StaleWhileRevalidate,
  /// Everything else: network, then any cached copy, then the offline
  /// document.
  NetworkWithFallback,
}

/// Pick exactly one strategy for a request.
pub fn classify(request: &Request, config: &CacheConfig) -> Strategy {
  if config.precache.iter().any(|p| p == request.path()) {
    Strategy::CacheFirst
  } else if request.path().contains(&config.api_marker) {
    Strategy::NetworkFirst
  } else if request.destination == Destination::Image {
    Strategy::StaleWhileRevalidate
  } else {
    Strategy::NetworkWithFallback
  }
}

/// Routes intercepted requests through cache partitions.
///
/// Writes are confined to the dynamic partition; cache-first never
/// stores. A network failure and a cache miss are distinct conditions
/// and each strategy resolves them separately.
pub struct CacheRouter<F: Fetch> {
  fetcher: Arc<F>,
  static_cache: CachePartition,
  dynamic_cache: CachePartition,
  cache_config: CacheConfig,
  offline_document: Url,
}

impl<F: Fetch> CacheRouter<F> {
  pub fn new(fetcher: Arc<F>, store: Arc<Store>, config: &Config) -> Result<Self> {
    let offline_document = config.origin.join(&config.cache.offline_fallback).map_err(|e| {
      Error::Config(format!(
        "invalid offline fallback {}: {e}",
        config.cache.offline_fallback
      ))
    })?;

    Ok(Self {
      fetcher,
      static_cache: CachePartition::open(Arc::clone(&store), config.static_partition()),
      dynamic_cache: CachePartition::open(store, config.dynamic_partition()),
      cache_config: config.cache.clone(),
      offline_document,
    })
  }

  /// Classify and apply; returns exactly one response per request.
  pub async fn route(&self, request: &Request) -> Result<Response> {
    let strategy = classify(request, &self.cache_config);
    debug!(path = request.path(), ?strategy, "routing request");

    match strategy {
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
      Strategy::NetworkWithFallback => self.network_with_fallback(request).await,
    }
  }

  /// Static partition hit wins; a miss goes to the network without
  /// caching the result, and a fetch failure propagates.
  async fn cache_first(&self, request: &Request) -> Result<Response> {
    if let Some(entry) = self.static_cache.lookup(request)? {
      return Ok(entry.into_response());
    }
    self.fetcher.fetch(request).await
  }

  /// Network wins; on failure fall back to the dynamic partition, then
  /// to a synthesized 503.
  async fn network_first(&self, request: &Request) -> Result<Response> {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.dynamic_cache.put(request, &response)?;
        Ok(response)
      }
      Err(err) => {
        debug!(path = request.path(), "network-first fetch failed: {err}");
        match self.dynamic_cache.lookup(request)? {
          Some(entry) => Ok(entry.into_response()),
          None => Ok(Response::offline()),
        }
      }
    }
  }

  /// Serve a cached copy immediately (possibly stale) and refresh it in
  /// a detached task; with nothing cached, wait on the network.
  async fn stale_while_revalidate(&self, request: &Request) -> Result<Response> {
    if let Some(entry) = self.dynamic_cache.lookup(request)? {
      self.spawn_revalidate(request.clone());
      return Ok(entry.into_response());
    }

    let response = self.fetcher.fetch(request).await?;
    self.dynamic_cache.put(request, &response)?;
    Ok(response)
  }

  /// Detached refresh; its only observable effect is the cache write.
  /// Failures here are logged and never reach the caller.
  fn spawn_revalidate(&self, request: Request) {
    let fetcher = Arc::clone(&self.fetcher);
    let cache = self.dynamic_cache.clone();

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) => {
          if let Err(err) = cache.put(&request, &response) {
            warn!(path = request.path(), "failed to store revalidated response: {err}");
          }
        }
        Err(err) => {
          debug!(path = request.path(), "background revalidation failed: {err}");
        }
      }
    });
  }

  /// Network wins; on failure fall back to any matching cached entry in
  /// either partition, then to the offline document. With neither, the
  /// original failure propagates.
  async fn network_with_fallback(&self, request: &Request) -> Result<Response> {
    let err = match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.dynamic_cache.put(request, &response)?;
        return Ok(response);
      }
      Err(err) => err,
    };
    debug!(path = request.path(), "fetch failed, trying cached fallbacks: {err}");

    if let Some(entry) = self.static_cache.lookup(request)? {
      return Ok(entry.into_response());
    }
    if let Some(entry) = self.dynamic_cache.lookup(request)? {
      return Ok(entry.into_response());
    }

    let fallback = Request::get(self.offline_document.clone());
    if let Some(entry) = self.static_cache.lookup(&fallback)? {
      return Ok(entry.into_response());
    }

    Err(err)
  }
}
