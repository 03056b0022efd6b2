//! Typed record collections over the store.
//!
//! Records are serialized as JSON blobs; the row id is authoritative for
//! identity and is written back into the record on every read.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Store;
use crate::error::{Error, Result};

/// A persistable record tied to one named collection.
pub trait Record: Clone + Send + Serialize + DeserializeOwned {
  /// Table holding this record type.
  const COLLECTION: &'static str;

  fn id(&self) -> Option<i64>;
  fn set_id(&mut self, id: i64);

  /// Creation instant; stamped by `put` when absent.
  fn timestamp(&self) -> Option<DateTime<Utc>>;
  fn stamp(&mut self, at: DateTime<Utc>);
}

/// A user message awaiting background delivery.
///
/// Presence in the store means pending: items are deleted on confirmed
/// delivery, never flagged, and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
  #[serde(default)]
  pub id: Option<i64>,
  pub text: String,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
  pub synced: bool,
}

impl SyncQueueItem {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      id: None,
      text: text.into(),
      timestamp: None,
      synced: false,
    }
  }
}

impl Record for SyncQueueItem {
  const COLLECTION: &'static str = "sync_queue";

  fn id(&self) -> Option<i64> {
    self.id
  }

  fn set_id(&mut self, id: i64) {
    self.id = Some(id);
  }

  fn timestamp(&self) -> Option<DateTime<Utc>> {
    self.timestamp
  }

  fn stamp(&mut self, at: DateTime<Utc>) {
    self.timestamp = Some(at);
  }
}

/// Generic persisted payload, independent of the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDataRecord {
  #[serde(default)]
  pub id: Option<i64>,
  pub content: serde_json::Value,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
}

impl AppDataRecord {
  pub fn new(content: serde_json::Value) -> Self {
    Self {
      id: None,
      content,
      timestamp: None,
    }
  }
}

impl Record for AppDataRecord {
  const COLLECTION: &'static str = "app_data";

  fn id(&self) -> Option<i64> {
    self.id
  }

  fn set_id(&mut self, id: i64) {
    self.id = Some(id);
  }

  fn timestamp(&self) -> Option<DateTime<Utc>> {
    self.timestamp
  }

  fn stamp(&mut self, at: DateTime<Utc>) {
    self.timestamp = Some(at);
  }
}

fn aborted(e: rusqlite::Error) -> Error {
  Error::TransactionAborted(e.to_string())
}

impl Store {
  /// Insert a record, stamping its creation timestamp if absent.
  /// Returns the store-assigned id, also written back into the record.
  pub fn put<R: Record>(&self, record: &mut R) -> Result<i64> {
    let created_at = match record.timestamp() {
      Some(at) => at,
      None => {
        let now = Utc::now();
        record.stamp(now);
        now
      }
    };

    let data = serde_json::to_vec(record).map_err(|e| Error::TransactionAborted(e.to_string()))?;

    let conn = self.conn()?;
    conn
      .execute(
        &format!("INSERT INTO {} (data, created_at) VALUES (?, ?)", R::COLLECTION),
        params![data, created_at.to_rfc3339()],
      )
      .map_err(aborted)?;

    let id = conn.last_insert_rowid();
    record.set_id(id);
    Ok(id)
  }

  /// All records in the collection, id ascending (insertion order).
  pub fn get_all<R: Record>(&self) -> Result<Vec<R>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare(&format!("SELECT id, data FROM {} ORDER BY id ASC", R::COLLECTION))
      .map_err(aborted)?;

    let rows: Vec<(i64, Vec<u8>)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(aborted)?
      .collect::<std::result::Result<_, _>>()
      .map_err(aborted)?;

    let records = rows
      .into_iter()
      .filter_map(|(id, data)| match serde_json::from_slice::<R>(&data) {
        Ok(mut record) => {
          record.set_id(id);
          Some(record)
        }
        Err(e) => {
          warn!(collection = R::COLLECTION, id, "skipping undecodable record: {e}");
          None
        }
      })
      .collect();

    Ok(records)
  }

  /// Fetch one record by id, or `NotFound`.
  pub fn get<R: Record>(&self, id: i64) -> Result<R> {
    let conn = self.conn()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        &format!("SELECT data FROM {} WHERE id = ?", R::COLLECTION),
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(aborted)?;

    let data = data.ok_or(Error::NotFound {
      collection: R::COLLECTION,
      id,
    })?;

    let mut record: R =
      serde_json::from_slice(&data).map_err(|e| Error::TransactionAborted(e.to_string()))?;
    record.set_id(id);
    Ok(record)
  }

  /// Overwrite an existing record in place. `NotFound` if the id is
  /// absent (or the record was never stored).
  pub fn update<R: Record>(&self, record: &R) -> Result<()> {
    let id = record.id().ok_or(Error::NotFound {
      collection: R::COLLECTION,
      id: 0,
    })?;

    let data = serde_json::to_vec(record).map_err(|e| Error::TransactionAborted(e.to_string()))?;

    let conn = self.conn()?;
    let changed = conn
      .execute(
        &format!("UPDATE {} SET data = ? WHERE id = ?", R::COLLECTION),
        params![data, id],
      )
      .map_err(aborted)?;

    if changed == 0 {
      return Err(Error::NotFound {
        collection: R::COLLECTION,
        id,
      });
    }
    Ok(())
  }

  /// Delete by id; a no-op when already absent.
  pub fn delete<R: Record>(&self, id: i64) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        &format!("DELETE FROM {} WHERE id = ?", R::COLLECTION),
        params![id],
      )
      .map_err(aborted)?;
    Ok(())
  }

  /// Remove every record in the collection.
  pub fn clear<R: Record>(&self) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(&format!("DELETE FROM {}", R::COLLECTION), [])
      .map_err(aborted)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_put_assigns_ids_and_stamps_timestamp() {
    let store = Store::open_in_memory().unwrap();

    let mut first = SyncQueueItem::new("one");
    let mut second = SyncQueueItem::new("two");
    assert!(first.timestamp.is_none());

    let a = store.put(&mut first).unwrap();
    let b = store.put(&mut second).unwrap();

    assert!(b > a);
    assert_eq!(first.id, Some(a));
    assert!(first.timestamp.is_some());
    assert!(!first.synced);
  }

  #[test]
  fn test_put_keeps_existing_timestamp() {
    let store = Store::open_in_memory().unwrap();
    let queued_at = Utc::now() - chrono::Duration::minutes(3);

    let mut item = SyncQueueItem::new("old");
    item.stamp(queued_at);
    store.put(&mut item).unwrap();

    let read: SyncQueueItem = store.get(item.id.unwrap()).unwrap();
    assert_eq!(read.timestamp, Some(queued_at));
  }

  #[test]
  fn test_get_all_is_insertion_ordered_and_idempotent() {
    let store = Store::open_in_memory().unwrap();

    for text in ["a", "b", "c"] {
      store.put(&mut SyncQueueItem::new(text)).unwrap();
    }

    let first: Vec<SyncQueueItem> = store.get_all().unwrap();
    let second: Vec<SyncQueueItem> = store.get_all().unwrap();

    let texts: Vec<&str> = first.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
    assert_eq!(first, second);
  }

  #[test]
  fn test_get_missing_is_not_found() {
    let store = Store::open_in_memory().unwrap();
    let err = store.get::<SyncQueueItem>(42).unwrap_err();
    assert!(err.is_not_found());
  }

  #[test]
  fn test_update_roundtrip_and_missing() {
    let store = Store::open_in_memory().unwrap();

    let mut record = AppDataRecord::new(serde_json::json!({"note": "draft"}));
    store.put(&mut record).unwrap();

    record.content = serde_json::json!({"note": "final"});
    store.update(&record).unwrap();

    let read: AppDataRecord = store.get(record.id.unwrap()).unwrap();
    assert_eq!(read.content, serde_json::json!({"note": "final"}));

    let mut ghost = AppDataRecord::new(serde_json::json!(1));
    ghost.set_id(999);
    assert!(store.update(&ghost).unwrap_err().is_not_found());
  }

  #[test]
  fn test_delete_is_idempotent() {
    let store = Store::open_in_memory().unwrap();

    let mut item = SyncQueueItem::new("gone");
    let id = store.put(&mut item).unwrap();

    store.delete::<SyncQueueItem>(id).unwrap();
    store.delete::<SyncQueueItem>(id).unwrap();

    assert!(store.get_all::<SyncQueueItem>().unwrap().is_empty());
  }

  #[test]
  fn test_collections_are_independent() {
    let store = Store::open_in_memory().unwrap();

    store.put(&mut SyncQueueItem::new("queued")).unwrap();
    store
      .put(&mut AppDataRecord::new(serde_json::json!("kept")))
      .unwrap();

    store.clear::<SyncQueueItem>().unwrap();

    assert!(store.get_all::<SyncQueueItem>().unwrap().is_empty());
    assert_eq!(store.get_all::<AppDataRecord>().unwrap().len(), 1);
  }
}
