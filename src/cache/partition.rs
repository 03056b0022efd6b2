//! Cache partition storage over the shared store.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::store::Store;

/// One cached request→response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}

/// A named, versioned bucket of cache entries. Opening is lazy; the
/// partition exists once the first entry is written.
#[derive(Clone)]
pub struct CachePartition {
  store: Arc<Store>,
  name: String,
}

fn aborted(e: rusqlite::Error) -> Error {
  Error::TransactionAborted(e.to_string())
}

impl CachePartition {
  pub fn open(store: Arc<Store>, name: impl Into<String>) -> Self {
    Self {
      store,
      name: name.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Look up the entry for a request's identity (method + URL).
  pub fn lookup(&self, request: &Request) -> Result<Option<CacheEntry>> {
    let conn = self.store.conn()?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, headers, body, cached_at FROM cache_entries
         WHERE partition = ? AND entry_key = ?",
        params![self.name, request.cache_key()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(aborted)?;

    let Some((url, status, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> =
      serde_json::from_str(&headers).map_err(|e| Error::TransactionAborted(e.to_string()))?;
    let cached_at = DateTime::parse_from_rfc3339(&cached_at)
      .map_err(|e| Error::TransactionAborted(format!("bad cached_at: {e}")))?
      .with_timezone(&Utc);

    Ok(Some(CacheEntry {
      url,
      status,
      headers,
      body,
      cached_at,
    }))
  }

  /// Store a response snapshot under the request's identity, replacing
  /// any previous entry for the same key.
  pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
    let headers =
      serde_json::to_string(&response.headers).map_err(|e| Error::TransactionAborted(e.to_string()))?;

    let conn = self.store.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (partition, entry_key, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          self.name,
          request.cache_key(),
          request.url.as_str(),
          response.status,
          headers,
          response.body,
          Utc::now().to_rfc3339(),
        ],
      )
      .map_err(aborted)?;

    Ok(())
  }

  /// Store a whole batch in one transaction; nothing lands if any write
  /// fails. Used by install's all-or-nothing precache population.
  pub fn put_all(&self, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.store.conn()?;
    let tx = conn.transaction().map_err(aborted)?;

    for (request, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| Error::TransactionAborted(e.to_string()))?;
      tx.execute(
        "INSERT OR REPLACE INTO cache_entries
           (partition, entry_key, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          self.name,
          request.cache_key(),
          request.url.as_str(),
          response.status,
          headers,
          response.body,
          Utc::now().to_rfc3339(),
        ],
      )
      .map_err(aborted)?;
    }

    tx.commit().map_err(aborted)
  }

  /// Number of entries currently in the partition.
  pub fn len(&self) -> Result<usize> {
    let conn = self.store.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT count(*) FROM cache_entries WHERE partition = ?",
        params![self.name],
        |row| row.get(0),
      )
      .map_err(aborted)?;
    Ok(count as usize)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

/// Names of every partition with at least one entry.
pub fn partition_names(store: &Store) -> Result<Vec<String>> {
  let conn = store.conn()?;

  let mut stmt = conn
    .prepare("SELECT DISTINCT partition FROM cache_entries ORDER BY partition")
    .map_err(aborted)?;

  let names = stmt
    .query_map([], |row| row.get(0))
    .map_err(aborted)?
    .collect::<std::result::Result<Vec<String>, _>>()
    .map_err(aborted)?;

  Ok(names)
}

/// Drop a partition and everything in it.
pub fn delete_partition(store: &Store, name: &str) -> Result<()> {
  let conn = store.conn()?;
  conn
    .execute("DELETE FROM cache_entries WHERE partition = ?", params![name])
    .map_err(aborted)?;
  Ok(())
}
