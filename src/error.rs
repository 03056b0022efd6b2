//! Typed failure taxonomy shared by the store, the cache and the sync engine.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  /// The SQLite database could not be opened. Fatal to every
  /// persistence-dependent feature; never retried internally.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A record lookup by id matched nothing.
  #[error("no record {id} in {collection}")]
  NotFound { collection: &'static str, id: i64 },

  /// A single store operation failed mid-transaction. Surfaced to the
  /// caller as the failure of that operation; no automatic retry here.
  #[error("transaction aborted: {0}")]
  TransactionAborted(String),

  /// A network fetch was rejected or timed out. Distinct from a cache
  /// miss; each routing strategy handles the two separately.
  #[error("network failure: {0}")]
  NetworkFailure(String),

  #[error("config error: {0}")]
  Config(String),
}

impl Error {
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound { .. })
  }
}
