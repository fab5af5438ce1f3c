//! [`MemoryStore`]: an in-process [`KvStore`] for tests and ephemeral runs.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
  },
};

use thiserror::Error;

use crate::store::KvStore;

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("store unavailable: writes are failing")]
  Unavailable,

  #[error("store lock poisoned")]
  Poisoned,
}

/// A `BTreeMap` behind a lock.
///
/// Cloning is cheap; clones share the same map. Writes can be made to fail
/// with [`MemoryStore::fail_writes`] to exercise storage-error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
  map:         Arc<RwLock<BTreeMap<String, String>>>,
  fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// When `true`, every `put` and `delete` returns
  /// [`MemoryStoreError::Unavailable`] without touching the map.
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub fn len(&self) -> usize {
    self.map.read().map(|m| m.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn check_writable(&self) -> Result<(), MemoryStoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(MemoryStoreError::Unavailable);
    }
    Ok(())
  }
}

impl KvStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn put(&self, key: String, value: String) -> Result<(), Self::Error> {
    self.check_writable()?;
    let mut map = self.map.write().map_err(|_| MemoryStoreError::Poisoned)?;
    map.insert(key, value);
    Ok(())
  }

  async fn get(&self, key: String) -> Result<Option<String>, Self::Error> {
    let map = self.map.read().map_err(|_| MemoryStoreError::Poisoned)?;
    Ok(map.get(&key).cloned())
  }

  async fn delete(&self, key: String) -> Result<bool, Self::Error> {
    self.check_writable()?;
    let mut map = self.map.write().map_err(|_| MemoryStoreError::Poisoned)?;
    Ok(map.remove(&key).is_some())
  }

  async fn scan(&self) -> Result<Vec<(String, String)>, Self::Error> {
    let map = self.map.read().map_err(|_| MemoryStoreError::Poisoned)?;
    Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
  }
}
