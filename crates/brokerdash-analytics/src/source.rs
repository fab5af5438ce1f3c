//! Where listing activity comes from.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError, RwLock},
};

use async_trait::async_trait;

use brokerdash_core::{
  ident::normalize,
  sample::{
    DeviceType, Interaction, InteractionCounts, ListingActivity, TrafficSource,
    ViewerSample,
  },
  store::KvStore,
};
use brokerdash_sync::{Registry, Topic, Watch};
use chrono::{DateTime, TimeDelta, Utc};
use rand_core::RngCore;
use strum::IntoEnumIterator;
use tracing::debug;

/// Why a [`SampleSource`] could not produce activity.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Supplies the activity a recompute pass aggregates.
#[async_trait]
pub trait SampleSource: Send + Sync + 'static {
  /// Activity for each of `listing_ids`. IDs with nothing recorded may be
  /// omitted or returned empty.
  async fn collect(
    &self,
    listing_ids: &[String],
  ) -> Result<Vec<ListingActivity>, SourceError>;
}

// ─── Recorded ────────────────────────────────────────────────────────────────

/// Seconds a recorded sample is kept unless configured otherwise.
pub const DEFAULT_SAMPLE_RETENTION_SECS: i64 = 24 * 60 * 60;

/// Activity pushed in by external producers.
///
/// Listing references are normalized on the way in. Samples older than the
/// retention window are discarded, on arrival and again before every
/// `collect`; a listing left with no samples and no counts is dropped
/// entirely. Cloning is cheap and clones share state, so producers and the
/// engine can each hold one.
#[derive(Clone)]
pub struct RecordedSource {
  activity:  Arc<RwLock<HashMap<String, ListingActivity>>>,
  retention: TimeDelta,
}

impl Default for RecordedSource {
  fn default() -> Self {
    Self {
      activity:  Arc::default(),
      retention: TimeDelta::seconds(DEFAULT_SAMPLE_RETENTION_SECS),
    }
  }
}

impl RecordedSource {
  pub fn new() -> Self { Self::default() }

  pub fn with_retention(mut self, retention: TimeDelta) -> Self {
    self.retention = retention;
    self
  }

  pub fn retention(&self) -> TimeDelta { self.retention }

  /// Store a viewer sample. Samples with an empty listing ID, or already
  /// outside the retention window, are dropped.
  pub fn record_sample(&self, mut sample: ViewerSample) {
    let id = normalize(&sample.listing_id);
    if id.is_empty() || sample.timestamp < Utc::now() - self.retention {
      return;
    }
    sample.listing_id = id.clone();
    self.entry(id, |a| a.samples.push(sample));
  }

  /// Add `n` to the current-period counter for `interaction`.
  pub fn record_interaction(&self, reference: &str, interaction: Interaction, n: u64) {
    let id = normalize(reference);
    if id.is_empty() {
      return;
    }
    self.entry(id, |a| a.current.record(interaction, n));
  }

  /// Close the current period: current counts become the baseline for the
  /// next trend comparison and the current counters restart at zero.
  /// Samples are time-stamped and are left alone; see
  /// [`prune_samples`](Self::prune_samples).
  pub fn roll_period(&self) {
    let mut map = self.activity.write().unwrap_or_else(PoisonError::into_inner);
    for activity in map.values_mut() {
      activity.previous = std::mem::take(&mut activity.current);
    }
  }

  /// Drop samples taken before `cutoff`, and listings left with nothing
  /// recorded; returns how many samples went.
  pub fn prune_samples(&self, cutoff: DateTime<Utc>) -> usize {
    let mut map = self.activity.write().unwrap_or_else(PoisonError::into_inner);
    let mut removed = 0;
    map.retain(|_, activity| {
      let before = activity.samples.len();
      activity.samples.retain(|s| s.timestamp >= cutoff);
      removed += before - activity.samples.len();
      !is_idle(activity)
    });
    removed
  }

  /// Forget everything recorded for one listing.
  pub fn forget(&self, reference: &str) -> bool {
    self
      .activity
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&normalize(reference))
      .is_some()
  }

  /// Forget a listing's activity whenever the registry removes it.
  pub fn follow_removals<S: KvStore>(&self, registry: &Registry<S>) -> Watch {
    let source = self.clone();
    registry.watch(&[Topic::ListingRemoved], move |event, _| {
      source.forget(&event.canonical_id);
      Ok(())
    })
  }

  fn entry(&self, id: String, f: impl FnOnce(&mut ListingActivity)) {
    let mut map = self.activity.write().unwrap_or_else(PoisonError::into_inner);
    let activity = map
      .entry(id)
      .or_insert_with_key(|id| ListingActivity::empty(id.as_str()));
    f(activity);
  }
}

#[async_trait]
impl SampleSource for RecordedSource {
  async fn collect(
    &self,
    listing_ids: &[String],
  ) -> Result<Vec<ListingActivity>, SourceError> {
    let pruned = self.prune_samples(Utc::now() - self.retention);
    if pruned > 0 {
      debug!(pruned, "expired recorded samples");
    }
    let map = self.activity.read().unwrap_or_else(PoisonError::into_inner);
    Ok(
      listing_ids
        .iter()
        .filter_map(|id| map.get(id).cloned())
        .collect(),
    )
  }
}

fn is_idle(activity: &ListingActivity) -> bool {
  activity.samples.is_empty()
    && activity.current == InteractionCounts::default()
    && activity.previous == InteractionCounts::default()
}

// ─── Synthetic ───────────────────────────────────────────────────────────────

const SYNTHETIC_CITIES: &[Option<&str>] = &[
  Some("Riyadh"),
  Some("Jeddah"),
  Some("Dammam"),
  Some("Makkah"),
  Some("Madinah"),
  None,
];

/// Random activity for demos and load testing.
///
/// Each call to `collect` draws a fresh batch: up to `max_samples` samples
/// per listing spread over the last `span`, and counts proportional to the
/// sample volume. Deterministic for a deterministic `R`.
pub struct SyntheticSource<R> {
  rng:         Mutex<R>,
  max_samples: u32,
  span:        TimeDelta,
}

impl<R: RngCore + Send + 'static> SyntheticSource<R> {
  pub fn new(rng: R) -> Self {
    Self { rng: Mutex::new(rng), max_samples: 20, span: TimeDelta::hours(2) }
  }

  pub fn with_max_samples(mut self, max_samples: u32) -> Self {
    self.max_samples = max_samples;
    self
  }

  pub fn with_span(mut self, span: TimeDelta) -> Self {
    self.span = span;
    self
  }

  fn generate(&self, listing_id: &str, now: DateTime<Utc>) -> ListingActivity {
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    let rng = &mut *rng;
    let span_secs = self.span.num_seconds().max(1) as u64;
    let devices: Vec<DeviceType> = DeviceType::iter().collect();
    let sources: Vec<TrafficSource> = TrafficSource::iter().collect();

    let n = below(rng, u64::from(self.max_samples) + 1);
    let samples = (0..n)
      .map(|_| {
        let ago = TimeDelta::seconds(below(rng, span_secs) as i64);
        ViewerSample::new(
          listing_id,
          now - ago,
          pick(rng, &devices),
          pick(rng, &sources),
          pick(rng, SYNTHETIC_CITIES).map(str::to_owned),
        )
        .with_engagement(
          below(rng, 600) as u32,
          below(rng, 101) as u8,
          below(rng, 10) as u32,
        )
      })
      .collect();

    ListingActivity {
      listing_id: listing_id.to_owned(),
      current: counts(rng, n),
      previous: counts(rng, n),
      samples,
    }
  }
}

#[async_trait]
impl<R: RngCore + Send + 'static> SampleSource for SyntheticSource<R> {
  async fn collect(
    &self,
    listing_ids: &[String],
  ) -> Result<Vec<ListingActivity>, SourceError> {
    let now = Utc::now();
    Ok(listing_ids.iter().map(|id| self.generate(id, now)).collect())
  }
}

fn counts(rng: &mut impl RngCore, volume: u64) -> InteractionCounts {
  let base = volume.max(1) * 5;
  InteractionCounts {
    views:             below(rng, base * 4),
    clicks:            below(rng, base * 2),
    whatsapp_messages: below(rng, base),
    phone_calls:       below(rng, base / 2 + 1),
    bookings:          below(rng, base / 4 + 1),
    shares:            below(rng, base / 2 + 1),
    favorites:         below(rng, base),
  }
}

fn below(rng: &mut impl RngCore, bound: u64) -> u64 {
  if bound == 0 { 0 } else { rng.next_u64() % bound }
}

fn pick<T: Copy>(rng: &mut impl RngCore, items: &[T]) -> T {
  items[below(rng, items.len() as u64) as usize]
}
