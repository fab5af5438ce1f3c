//! The `KvStore` trait, the durable collaborator behind the registry.
//!
//! The registry treats persistence as an opaque key/value store: one JSON
//! document per canonical listing ID. Backends (`MemoryStore`,
//! `brokerdash-store-sqlite`) implement this trait; nothing above the
//! registry knows which one is in use.

use std::future::Future;

/// Abstraction over a durable string key/value store.
///
/// A completed `put` or `delete` must be visible to every later `get` and
/// `scan` on the same store (read-after-write). Flush durability is the
/// backend's concern.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait KvStore: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or replace the value stored under `key`.
  fn put(
    &self,
    key: String,
    value: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Fetch the value stored under `key`. Returns `None` if absent.
  fn get(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Delete `key`. Returns `true` if a value was removed.
  fn delete(
    &self,
    key: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Every `(key, value)` pair, ordered by key.
  fn scan(
    &self,
  ) -> impl Future<Output = Result<Vec<(String, String)>, Self::Error>> + Send + '_;
}
