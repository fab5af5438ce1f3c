//! [`SqliteKvStore`]: the SQLite implementation of [`KvStore`].

use std::path::Path;

use brokerdash_core::store::KvStore;
use chrono::Utc;
use rusqlite::OptionalExtension as _;

use crate::{Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A key/value store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteKvStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteKvStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("sqlite key/value schema ready");
    Ok(())
  }
}

// ─── KvStore impl ────────────────────────────────────────────────────────────

impl KvStore for SqliteKvStore {
  type Error = crate::Error;

  async fn put(&self, key: String, value: String) -> Result<()> {
    let at_str = Utc::now().to_rfc3339();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET
             value      = excluded.value,
             updated_at = excluded.updated_at",
          rusqlite::params![key, value, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get(&self, key: String) -> Result<Option<String>> {
    let value = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM records WHERE key = ?1",
              rusqlite::params![key],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(value)
  }

  async fn delete(&self, key: String) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        let n = conn
          .execute("DELETE FROM records WHERE key = ?1", rusqlite::params![key])?;
        Ok(n > 0)
      })
      .await?;
    Ok(removed)
  }

  async fn scan(&self) -> Result<Vec<(String, String)>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT key, value FROM records ORDER BY key")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}
