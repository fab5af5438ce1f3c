//! [`Registry`], the single owner of listing records.
//!
//! Every operation accepts a raw listing reference and normalises it, so
//! `#045348` and `رقم الاعلان: ...045348` address the same record.
//!
//! Mutations follow one sequence: take the write gate, build the new record
//! off to the side, persist it, swap it into the in-memory table, then
//! publish on the bus. A failed write leaves the table untouched and
//! publishes nothing. Because publishing happens inside the write gate,
//! subscribers see mutations in the order they were issued.
//!
//! Each mutation runs on its own tokio task. A caller that stops polling
//! (an HTTP client hanging up, a `select!` losing a race) abandons only the
//! result; the store write, table swap and publish still happen together.

use std::{
  collections::BTreeMap,
  future::Future,
  panic,
  sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use brokerdash_core::{
  canonical_id,
  listing::{Listing, ListingFilter, ListingPatch, ListingStatus},
  normalize,
  store::KvStore,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  bus::{Bus, BusEvent, HandlerResult, MutationKind, SubscriptionToken, Topic},
};

type Table = Arc<RwLock<BTreeMap<String, Listing>>>;

// ─── Registry ────────────────────────────────────────────────────────────────

/// Canonical-ID-keyed listing records with a `Draft ⇄ Published` state
/// machine.
///
/// Cloning is cheap; clones share the table, store and bus.
pub struct Registry<S: KvStore> {
  inner: Arc<RegistryInner<S>>,
}

impl<S: KvStore> Clone for Registry<S> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

struct RegistryInner<S> {
  store:      S,
  bus:        Bus,
  table:      Table,
  /// Serialises mutations; FIFO so handlers observe issue order.
  write_gate: tokio::sync::Mutex<()>,
}

impl<S: KvStore> Registry<S> {
  /// Load every listing from `store` and attach to `bus`.
  ///
  /// Records that fail to parse are skipped with a warning rather than
  /// failing the whole load.
  pub async fn open(store: S, bus: Bus) -> Result<Self> {
    let records = store.scan().await.map_err(Error::storage)?;

    let mut table = BTreeMap::new();
    for (key, record) in records {
      match Listing::from_record(&record) {
        Ok(listing) if listing.canonical_id == key => {
          table.insert(key, listing);
        }
        Ok(listing) => {
          warn!(
            %key,
            canonical_id = %listing.canonical_id,
            "skipping listing stored under a foreign key"
          );
        }
        Err(e) => warn!(%key, error = %e, "skipping unreadable listing record"),
      }
    }
    debug!(count = table.len(), "registry loaded");

    Ok(Self {
      inner: Arc::new(RegistryInner {
        store,
        bus,
        table: Arc::new(RwLock::new(table)),
        write_gate: tokio::sync::Mutex::new(()),
      }),
    })
  }

  pub fn bus(&self) -> &Bus { &self.inner.bus }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The current record for `reference`, or `None`.
  pub fn get(&self, reference: &str) -> Option<Listing> {
    lookup(&self.inner.table, reference)
  }

  /// All listings matching `filter`, ordered by canonical ID.
  pub fn get_all(&self, filter: Option<&ListingFilter>) -> Vec<Listing> {
    read(&self.inner.table)
      .values()
      .filter(|l| filter.is_none_or(|f| f.matches(l)))
      .cloned()
      .collect()
  }

  /// Canonical IDs of every listing, in order.
  pub fn ids(&self) -> Vec<String> {
    read(&self.inner.table).keys().cloned().collect()
  }

  pub fn len(&self) -> usize { read(&self.inner.table).len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  // ── Mutations ─────────────────────────────────────────────────────────────

  /// Create the listing for `reference` if absent, otherwise merge `patch`
  /// into it. The raw reference is remembered as an alias.
  ///
  /// Publishes `listing-mutated`, and additionally `status-changed` when the
  /// status differs from before (or a listing is created already published).
  pub async fn upsert(
    &self,
    reference: &str,
    patch: ListingPatch,
  ) -> Result<Listing> {
    let reference = reference.to_owned();
    self
      .detached(move |r| async move { r.apply_upsert(&reference, patch).await })
      .await
  }

  async fn apply_upsert(
    &self,
    reference: &str,
    patch: ListingPatch,
  ) -> Result<Listing> {
    let id = canonical_id(reference)?;
    let _gate = self.inner.write_gate.lock().await;

    let now = Utc::now();
    let existing = read(&self.inner.table).get(&id).cloned();
    let previous_status = existing.as_ref().map(|l| l.status);
    let kind = match existing {
      Some(_) => MutationKind::Updated,
      None => MutationKind::Created,
    };

    let mut listing = existing.unwrap_or_else(|| Listing::new(&id, now));
    listing.aliases.insert(reference.to_owned());
    patch.apply_to(&mut listing);
    listing.updated_at = now;

    self.commit(&listing).await?;
    debug!(canonical_id = %id, %kind, "listing upserted");

    self.notify(Topic::ListingMutated, kind, &id);
    let status_changed = match previous_status {
      Some(before) => before != listing.status,
      None => listing.status.is_published(),
    };
    if status_changed {
      self.notify(Topic::StatusChanged, MutationKind::StatusChanged, &id);
    }
    Ok(listing)
  }

  /// Move the listing to `status`.
  ///
  /// Fails with [`Error::ListingNotFound`] if there is no such listing.
  /// Setting the status it already has is a successful no-op: nothing is
  /// written and nothing is published.
  pub async fn set_status(
    &self,
    reference: &str,
    status: ListingStatus,
  ) -> Result<Listing> {
    self
      .modify(reference, Topic::StatusChanged, MutationKind::StatusChanged, move |l| {
        if l.status == status {
          return false;
        }
        l.status = status;
        true
      })
      .await
  }

  /// Pin or unpin a listing within its group.
  pub async fn set_pinned(&self, reference: &str, pinned: bool) -> Result<Listing> {
    self
      .modify(reference, Topic::ListingMutated, MutationKind::Updated, move |l| {
        let changed = l.pinned != pinned;
        l.pinned = pinned;
        changed
      })
      .await
  }

  /// Add to the listing's view and request counters.
  pub async fn record_activity(
    &self,
    reference: &str,
    views: u64,
    requests: u64,
  ) -> Result<Listing> {
    self
      .modify(reference, Topic::ListingMutated, MutationKind::Updated, move |l| {
        l.stats.views = l.stats.views.saturating_add(views);
        l.stats.requests = l.stats.requests.saturating_add(requests);
        views > 0 || requests > 0
      })
      .await
  }

  /// Delete the listing. Returns `false` (and publishes nothing) if it did
  /// not exist.
  pub async fn remove(&self, reference: &str) -> Result<bool> {
    let reference = reference.to_owned();
    self
      .detached(move |r| async move { r.apply_remove(&reference).await })
      .await
  }

  async fn apply_remove(&self, reference: &str) -> Result<bool> {
    let id = normalize(reference);
    if id.is_empty() {
      return Ok(false);
    }
    let _gate = self.inner.write_gate.lock().await;

    if !read(&self.inner.table).contains_key(&id) {
      return Ok(false);
    }

    self
      .inner
      .store
      .delete(id.clone())
      .await
      .map_err(Error::storage)?;
    write(&self.inner.table).remove(&id);
    debug!(canonical_id = %id, "listing removed");

    self.notify(Topic::ListingRemoved, MutationKind::Removed, &id);
    Ok(true)
  }

  // ── Re-fetch on notify ────────────────────────────────────────────────────

  /// Subscribe to `topics`, handing `handler` the registry's *current*
  /// record for each event rather than anything carried by the event.
  ///
  /// `None` means the listing no longer exists at the time of delivery.
  pub fn watch<F>(&self, topics: &[Topic], handler: F) -> Watch
  where
    F: Fn(&BusEvent, Option<Listing>) -> HandlerResult + Send + Sync + 'static,
  {
    let table = Arc::clone(&self.inner.table);
    let handler = Arc::new(move |event: &BusEvent| {
      let current = lookup(&table, &event.canonical_id);
      handler(event, current)
    });

    let tokens = topics
      .iter()
      .map(|&topic| self.inner.bus.subscribe_shared(topic, handler.clone()))
      .collect();

    Watch { bus: self.inner.bus.clone(), tokens }
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  /// Run `op` against a clone of this registry on a task of its own and
  /// wait for it. Dropping the returned future does not stop `op`.
  async fn detached<T, F, Fut>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(Self) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    match tokio::spawn(op(self.clone())).await {
      Ok(result) => result,
      Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
      Err(e) => Err(Error::Interrupted(e)),
    }
  }

  /// Apply `change` to an existing listing and commit it. `change` returns
  /// whether it actually altered anything; if not, the current record is
  /// returned without a write or a notification.
  async fn modify<F>(
    &self,
    reference: &str,
    topic: Topic,
    kind: MutationKind,
    change: F,
  ) -> Result<Listing>
  where
    F: FnOnce(&mut Listing) -> bool + Send + 'static,
  {
    let reference = reference.to_owned();
    self
      .detached(move |r| async move {
        r.apply_modify(&reference, topic, kind, change).await
      })
      .await
  }

  async fn apply_modify<F>(
    &self,
    reference: &str,
    topic: Topic,
    kind: MutationKind,
    change: F,
  ) -> Result<Listing>
  where
    F: FnOnce(&mut Listing) -> bool,
  {
    let id = normalize(reference);
    let _gate = self.inner.write_gate.lock().await;

    let Some(mut listing) = read(&self.inner.table).get(&id).cloned() else {
      return Err(Error::ListingNotFound(id));
    };

    if !change(&mut listing) {
      return Ok(listing);
    }
    listing.updated_at = Utc::now();

    self.commit(&listing).await?;
    debug!(canonical_id = %id, %kind, "listing modified");

    self.notify(topic, kind, &id);
    Ok(listing)
  }

  /// Persist `listing`, then make it visible to readers.
  async fn commit(&self, listing: &Listing) -> Result<()> {
    let record = listing.to_record()?;
    self
      .inner
      .store
      .put(listing.canonical_id.clone(), record)
      .await
      .map_err(Error::storage)?;
    write(&self.inner.table).insert(listing.canonical_id.clone(), listing.clone());
    Ok(())
  }

  fn notify(&self, topic: Topic, kind: MutationKind, id: &str) {
    self.inner.bus.publish(topic, &BusEvent::new(kind, id));
  }
}

// ─── Watch handle ────────────────────────────────────────────────────────────

/// Subscriptions created by [`Registry::watch`].
///
/// Dropping a `Watch` leaves its subscriptions in place; call
/// [`Watch::cancel`] to remove them.
#[derive(Debug)]
pub struct Watch {
  bus:    Bus,
  tokens: Vec<SubscriptionToken>,
}

impl Watch {
  pub fn tokens(&self) -> &[SubscriptionToken] { &self.tokens }

  /// Remove every subscription this watch created.
  pub fn cancel(self) {
    for token in self.tokens {
      self.bus.unsubscribe(token);
    }
  }
}

// ─── Table helpers ───────────────────────────────────────────────────────────

// The table is only ever replaced entry-by-entry under the write lock with
// no user code running, so a poisoned lock still holds consistent data.
fn read(table: &Table) -> RwLockReadGuard<'_, BTreeMap<String, Listing>> {
  table.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(table: &Table) -> RwLockWriteGuard<'_, BTreeMap<String, Listing>> {
  table.write().unwrap_or_else(PoisonError::into_inner)
}

fn lookup(table: &Table, reference: &str) -> Option<Listing> {
  let id = normalize(reference);
  if id.is_empty() {
    return None;
  }
  read(table).get(&id).cloned()
}
