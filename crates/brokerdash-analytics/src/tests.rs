//! Engine scenarios: subscriptions, manual ticks, dirty wake-ups, scoping.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;

use brokerdash_core::{
  listing::ListingPatch,
  memory::MemoryStore,
  sample::{DeviceType, Interaction, ListingActivity, TrafficSource, ViewerSample},
};
use brokerdash_sync::{Bus, Registry};
use chrono::Utc;
use tokio::sync::watch;

use crate::{
  AnalyticsConfig, EngagementEngine, Error, ManualTicks, RecordedSource, SampleSource,
  Scope, SourceError, Trend,
};

async fn registry_with(ids: &[&str]) -> Registry<MemoryStore> {
  let r = Registry::open(MemoryStore::new(), Bus::new()).await.unwrap();
  for id in ids {
    r.upsert(id, ListingPatch { title: Some(format!("Listing {id}")), ..Default::default() })
      .await
      .unwrap();
  }
  r
}

struct Harness {
  engine: EngagementEngine<MemoryStore>,
  source: RecordedSource,
  ticks:  ManualTicks,
}

async fn harness(ids: &[&str]) -> Harness {
  let source = RecordedSource::new();
  let ticks = ManualTicks::new();
  let engine = EngagementEngine::new(
    registry_with(ids).await,
    source.clone(),
    ticks.clone(),
    AnalyticsConfig::default(),
  );
  Harness { engine, source, ticks }
}

async fn next_generation(rx: &mut watch::Receiver<u64>) {
  tokio::time::timeout(Duration::from_secs(2), rx.changed())
    .await
    .expect("a pass completes")
    .expect("engine alive");
}

// ─── Subscription lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn no_ticker_without_subscriptions() {
  let h = harness(&["1"]).await;
  assert!(!h.engine.is_ticking());

  let sub = h.engine.subscribe(Scope::All);
  assert!(h.engine.is_ticking());
  assert_eq!(h.engine.consumer_count(), 1);

  sub.unsubscribe();
  assert!(!h.engine.is_ticking());
  assert_eq!(h.engine.consumer_count(), 0);
  // The dirty hook went with the ticker.
  assert_eq!(h.engine.registry().bus().subscriber_count(None), 0);
}

#[tokio::test]
async fn ticker_survives_until_the_last_subscription() {
  let h = harness(&["1"]).await;
  let a = h.engine.subscribe(Scope::All);
  let b = h.engine.subscribe(Scope::listings(["1"]));

  drop(a);
  assert!(h.engine.is_ticking());
  drop(b);
  assert!(!h.engine.is_ticking());
}

// ─── Periodic passes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_tick_triggers_a_recompute() {
  let h = harness(&["AD-1-1"]).await;
  h.source.record_interaction("#AD-1-1", Interaction::View, 10);
  h.source.record_interaction("AD-1-1", Interaction::Booking, 1);

  let _sub = h.engine.subscribe(Scope::All);
  let mut rx = h.engine.generations();
  h.ticks.fire();
  next_generation(&mut rx).await;

  let snap = h.engine.snapshot("AD-1-1").expect("cached");
  assert_eq!(snap.score, 15.0);
  assert_eq!(snap.conversion_rate, 10.0);
  assert_eq!(snap.title, "Listing AD-1-1");
}

#[tokio::test]
async fn registry_mutation_wakes_the_ticker() {
  let h = harness(&[]).await;
  let _sub = h.engine.subscribe(Scope::All);
  let mut rx = h.engine.generations();

  h.engine.registry().upsert("new", ListingPatch::default()).await.unwrap();
  next_generation(&mut rx).await;

  assert!(h.engine.snapshot("new").is_some());
}

#[tokio::test]
async fn each_pass_replaces_the_cache() {
  let h = harness(&["1", "2"]).await;
  let _sub = h.engine.subscribe(Scope::All);
  h.engine.recompute_now().await.unwrap();
  assert_eq!(h.engine.snapshots().len(), 2);

  h.engine.registry().remove("2").await.unwrap();
  h.engine.recompute_now().await.unwrap();
  let ids: Vec<String> = h.engine.snapshots().into_iter().map(|s| s.listing_id).collect();
  assert_eq!(ids, vec!["1"]);
}

// ─── Scoping ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_evicts_scope_only_snapshots() {
  let h = harness(&["1", "2", "3"]).await;
  let first = h.engine.subscribe(Scope::listings(["1"]));
  let second = h.engine.subscribe(Scope::listings(["#2"]));

  let all = h.engine.recompute_now().await.unwrap();
  assert_eq!(all.len(), 3);
  let cached: Vec<String> = h.engine.snapshots().into_iter().map(|s| s.listing_id).collect();
  assert_eq!(cached, vec!["1", "2"]);

  second.unsubscribe();
  let cached: Vec<String> = h.engine.snapshots().into_iter().map(|s| s.listing_id).collect();
  assert_eq!(cached, vec!["1"]);
  assert_eq!(first.snapshots().len(), 1);
}

#[tokio::test]
async fn on_demand_without_subscribers_caches_nothing() {
  let h = harness(&["1"]).await;
  let fresh = h.engine.recompute_now().await.unwrap();
  assert_eq!(fresh.len(), 1);
  assert!(h.engine.snapshots().is_empty());
  assert_eq!(h.engine.generation(), 1);
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_activity_bypasses_the_source() {
  let h = harness(&["1"]).await;
  h.source.record_interaction("1", Interaction::View, 999);

  let mut activity = ListingActivity::empty("1");
  activity.current.views = 110;
  activity.previous.views = 100;
  activity.samples.push(ViewerSample::new(
    "1",
    Utc::now(),
    DeviceType::Tablet,
    TrafficSource::QrCode,
    Some("Abha".into()),
  ));

  let snaps = h.engine.recompute_with(vec![activity]).await.unwrap();
  assert_eq!(snaps[0].counts.views, 110);
  assert_eq!(snaps[0].trend, Trend::Up);
  assert_eq!(snaps[0].current_viewer_count, 1);
  assert_eq!(snaps[0].top_source, Some(TrafficSource::QrCode));
}

/// Records the size of every batch it is asked for.
#[derive(Clone, Default)]
struct BatchRecorder {
  calls: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl SampleSource for BatchRecorder {
  async fn collect(
    &self,
    listing_ids: &[String],
  ) -> Result<Vec<ListingActivity>, SourceError> {
    self.calls.lock().unwrap().push(listing_ids.len());
    Ok(Vec::new())
  }
}

#[tokio::test]
async fn work_is_split_into_batches() {
  let recorder = BatchRecorder::default();
  let engine = EngagementEngine::new(
    registry_with(&["a", "b", "c", "d", "e"]).await,
    recorder.clone(),
    ManualTicks::new(),
    AnalyticsConfig { batch_size: 2, ..Default::default() },
  );

  let snaps = engine.recompute_now().await.unwrap();
  let ids: Vec<&str> = snaps.iter().map(|s| s.listing_id.as_str()).collect();
  assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
  assert_eq!(*recorder.calls.lock().unwrap(), vec![2, 2, 1]);
}

struct Offline;

#[async_trait]
impl SampleSource for Offline {
  async fn collect(
    &self,
    _listing_ids: &[String],
  ) -> Result<Vec<ListingActivity>, SourceError> {
    Err(std::io::Error::other("telemetry offline").into())
  }
}

#[tokio::test]
async fn source_failure_keeps_previous_snapshots() {
  let registry = registry_with(&["1"]).await;
  let working = EngagementEngine::new(
    registry.clone(),
    RecordedSource::new(),
    ManualTicks::new(),
    AnalyticsConfig::default(),
  );
  let broken =
    EngagementEngine::new(registry, Offline, ManualTicks::new(), AnalyticsConfig::default());

  let _sub = broken.subscribe(Scope::All);
  broken
    .recompute_with(vec![ListingActivity::empty("1")])
    .await
    .unwrap();
  assert_eq!(broken.snapshots().len(), 1);

  let err = broken.recompute_now().await.unwrap_err();
  assert!(matches!(err, Error::Source(_)));
  assert_eq!(broken.snapshots().len(), 1);
  assert_eq!(broken.generation(), 1);

  assert!(working.recompute_now().await.is_ok());
}

#[test]
fn trend_serializes_lowercase() {
  let json = serde_json::to_value(Trend::Up).unwrap();
  assert_eq!(json, "up");
}
