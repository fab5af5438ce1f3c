//! The engagement engine: snapshot cache, on-demand passes and the periodic
//! ticker.
//!
//! # Lifecycle
//!
//! The ticker task exists only while at least one [`AnalyticsSubscription`]
//! is alive. The first subscription spawns it, together with a registry
//! watch that wakes it early whenever a listing changes. Releasing the last
//! subscription aborts the task and removes the watch before `unsubscribe`
//! returns.
//!
//! The cache holds only snapshots some live subscription's [`Scope`] covers.
//! On-demand passes still return every snapshot they compute.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use brokerdash_core::{ident::normalize, sample::ListingActivity, store::KvStore};
use brokerdash_sync::{Registry, Topic, Watch};
use chrono::Utc;
use tokio::{
  runtime::Handle,
  sync::{Notify, watch},
  task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  config::AnalyticsConfig,
  snapshot::{EngagementSnapshot, aggregate_all},
  source::SampleSource,
  ticks::TickSource,
};

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Which listings a subscription wants snapshots for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  All,
  Listings(BTreeSet<String>),
}

impl Scope {
  /// A scope over the given references, normalized.
  pub fn listings<I>(references: I) -> Self
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
  {
    Self::Listings(
      references
        .into_iter()
        .map(|r| normalize(r.as_ref()))
        .filter(|id| !id.is_empty())
        .collect(),
    )
  }

  pub fn contains(&self, canonical_id: &str) -> bool {
    match self {
      Self::All => true,
      Self::Listings(ids) => ids.contains(canonical_id),
    }
  }
}

// ─── Shared state ────────────────────────────────────────────────────────────

#[derive(Default)]
struct EngineState {
  snapshots:     BTreeMap<String, EngagementSnapshot>,
  consumers:     HashMap<u64, Scope>,
  next_consumer: u64,
  ticker:        Option<JoinHandle<()>>,
  dirty_hook:    Option<Watch>,
}

impl EngineState {
  fn wanted(&self, canonical_id: &str) -> bool {
    self.consumers.values().any(|s| s.contains(canonical_id))
  }
}

type SharedState = Arc<Mutex<EngineState>>;

// No user code runs under this lock.
fn lock(state: &SharedState) -> MutexGuard<'_, EngineState> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct EngineInner<S: KvStore> {
  registry:   Registry<S>,
  source:     Box<dyn SampleSource>,
  ticks:      Box<dyn TickSource>,
  config:     AnalyticsConfig,
  state:      SharedState,
  dirty:      Arc<Notify>,
  generation: watch::Sender<u64>,
  /// Serialises passes so generations complete in order.
  pass_gate:  tokio::sync::Mutex<()>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Computes and caches [`EngagementSnapshot`]s for the listings in a
/// [`Registry`].
///
/// Cloning is cheap; clones share the cache, subscriptions and ticker.
pub struct EngagementEngine<S: KvStore> {
  inner: Arc<EngineInner<S>>,
}

impl<S: KvStore> Clone for EngagementEngine<S> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S: KvStore + 'static> EngagementEngine<S> {
  pub fn new<Src, T>(
    registry: Registry<S>,
    source: Src,
    ticks: T,
    config: AnalyticsConfig,
  ) -> Self
  where
    Src: SampleSource,
    T: TickSource,
  {
    let (generation, _) = watch::channel(0);
    Self {
      inner: Arc::new(EngineInner {
        registry,
        source: Box::new(source),
        ticks: Box::new(ticks),
        config,
        state: SharedState::default(),
        dirty: Arc::new(Notify::new()),
        generation,
        pass_gate: tokio::sync::Mutex::new(()),
      }),
    }
  }

  pub fn registry(&self) -> &Registry<S> { &self.inner.registry }

  pub fn config(&self) -> &AnalyticsConfig { &self.inner.config }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  /// Register interest in `scope`, starting the ticker if it isn't running.
  ///
  /// The ticker is spawned on the ambient tokio runtime; outside a runtime
  /// the subscription still scopes the cache but nothing ticks.
  pub fn subscribe(&self, scope: Scope) -> AnalyticsSubscription {
    let mut state = lock(&self.inner.state);
    let id = state.next_consumer;
    state.next_consumer += 1;
    state.consumers.insert(id, scope);

    if state.ticker.is_none() {
      match Handle::try_current() {
        Ok(handle) => {
          state.ticker = Some(handle.spawn(run_ticker(Arc::clone(&self.inner))));
          state.dirty_hook = Some(self.dirty_hook());
          debug!("analytics ticker started");
        }
        Err(_) => warn!("no tokio runtime; periodic recompute is disabled"),
      }
    }
    debug!(consumer = id, consumers = state.consumers.len(), "analytics subscription added");

    AnalyticsSubscription {
      state:    Arc::clone(&self.inner.state),
      id,
      released: false,
    }
  }

  pub fn consumer_count(&self) -> usize { lock(&self.inner.state).consumers.len() }

  /// Whether the periodic task is currently alive.
  pub fn is_ticking(&self) -> bool {
    lock(&self.inner.state)
      .ticker
      .as_ref()
      .is_some_and(|t| !t.is_finished())
  }

  // ── Passes ────────────────────────────────────────────────────────────────

  /// Recompute every listing now, pulling activity from the sample source.
  pub async fn recompute_now(&self) -> Result<Vec<EngagementSnapshot>> {
    self.inner.run_pass(None).await
  }

  /// Recompute every listing from explicitly supplied activity instead of
  /// the sample source.
  pub async fn recompute_with(
    &self,
    activity: Vec<ListingActivity>,
  ) -> Result<Vec<EngagementSnapshot>> {
    self.inner.run_pass(Some(activity)).await
  }

  // ── Cache ─────────────────────────────────────────────────────────────────

  /// Cached snapshots, ordered by listing ID.
  pub fn snapshots(&self) -> Vec<EngagementSnapshot> {
    lock(&self.inner.state).snapshots.values().cloned().collect()
  }

  pub fn snapshot(&self, reference: &str) -> Option<EngagementSnapshot> {
    lock(&self.inner.state).snapshots.get(&normalize(reference)).cloned()
  }

  /// A receiver that changes every time a pass completes.
  pub fn generations(&self) -> watch::Receiver<u64> { self.inner.generation.subscribe() }

  pub fn generation(&self) -> u64 { *self.inner.generation.borrow() }

  fn dirty_hook(&self) -> Watch {
    let dirty = Arc::clone(&self.inner.dirty);
    self.inner.registry.watch(
      &[Topic::ListingMutated, Topic::StatusChanged, Topic::ListingRemoved],
      move |_, _| {
        dirty.notify_one();
        Ok(())
      },
    )
  }
}

impl<S: KvStore + 'static> EngineInner<S> {
  async fn run_pass(
    &self,
    activity: Option<Vec<ListingActivity>>,
  ) -> Result<Vec<EngagementSnapshot>> {
    let _gate = self.pass_gate.lock().await;
    let listings = self.registry.get_all(None);
    let now = Utc::now();

    let fresh = match activity {
      Some(activity) => aggregate_all(&listings, activity, &self.config, now),
      None => {
        let mut fresh = Vec::with_capacity(listings.len());
        for (i, batch) in listings.chunks(self.config.batch_size()).enumerate() {
          if i > 0 {
            tokio::task::yield_now().await;
          }
          let ids: Vec<String> = batch.iter().map(|l| l.canonical_id.clone()).collect();
          let activity = self.source.collect(&ids).await.map_err(Error::Source)?;
          fresh.extend(aggregate_all(batch, activity, &self.config, now));
        }
        fresh
      }
    };

    self.install(&fresh);
    Ok(fresh)
  }

  /// Replace the cache wholesale with the in-scope part of `fresh`.
  fn install(&self, fresh: &[EngagementSnapshot]) {
    let retained = {
      let mut state = lock(&self.state);
      let kept: BTreeMap<String, EngagementSnapshot> = fresh
        .iter()
        .filter(|s| state.wanted(&s.listing_id))
        .map(|s| (s.listing_id.clone(), s.clone()))
        .collect();
      let n = kept.len();
      state.snapshots = kept;
      n
    };
    self.generation.send_modify(|g| *g += 1);
    debug!(
      computed = fresh.len(),
      retained,
      generation = *self.generation.borrow(),
      "engagement snapshots recomputed"
    );
  }
}

async fn run_ticker<S: KvStore + 'static>(inner: Arc<EngineInner<S>>) {
  let period = inner.config.tick_interval();
  loop {
    tokio::select! {
      () = inner.ticks.tick(period) => {}
      () = inner.dirty.notified() => {}
    }
    if let Err(e) = inner.run_pass(None).await {
      warn!(error = %e, "periodic recompute failed; keeping previous snapshots");
    }
  }
}

// ─── Subscription handle ─────────────────────────────────────────────────────

/// Keeps the engine ticking and its scope cached. Released by
/// [`unsubscribe`](Self::unsubscribe) or on drop.
pub struct AnalyticsSubscription {
  state:    SharedState,
  id:       u64,
  released: bool,
}

impl AnalyticsSubscription {
  pub fn scope(&self) -> Option<Scope> { lock(&self.state).consumers.get(&self.id).cloned() }

  /// Cached snapshots within this subscription's scope.
  pub fn snapshots(&self) -> Vec<EngagementSnapshot> {
    let state = lock(&self.state);
    let Some(scope) = state.consumers.get(&self.id) else {
      return Vec::new();
    };
    state
      .snapshots
      .values()
      .filter(|s| scope.contains(&s.listing_id))
      .cloned()
      .collect()
  }

  pub fn unsubscribe(mut self) { self.release(); }

  fn release(&mut self) {
    if std::mem::replace(&mut self.released, true) {
      return;
    }
    let (ticker, hook) = {
      let mut guard = lock(&self.state);
      let state = &mut *guard;
      state.consumers.remove(&self.id);
      let consumers = &state.consumers;
      state
        .snapshots
        .retain(|id, _| consumers.values().any(|s| s.contains(id)));

      debug!(consumer = self.id, consumers = consumers.len(), "analytics subscription released");
      if consumers.is_empty() {
        (state.ticker.take(), state.dirty_hook.take())
      } else {
        (None, None)
      }
    };

    if let Some(ticker) = ticker {
      ticker.abort();
      debug!("analytics ticker stopped");
    }
    if let Some(hook) = hook {
      hook.cancel();
    }
  }
}

impl Drop for AnalyticsSubscription {
  fn drop(&mut self) { self.release(); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn listing_scope_normalizes_references() {
    let scope = Scope::listings(["#AD-1-1", "رقم الاعلان: 77", ""]);
    assert!(scope.contains("AD-1-1"));
    assert!(scope.contains("77"));
    assert!(!scope.contains(""));
    assert!(Scope::All.contains("anything"));
  }
}
