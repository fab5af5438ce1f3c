//! Per-listing engagement snapshots.

use std::collections::{BTreeMap, HashMap};

use brokerdash_core::{
  listing::{Listing, Location},
  sample::{DeviceType, InteractionCounts, ListingActivity, TrafficSource, ViewerSample},
};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
  config::AnalyticsConfig,
  metrics::{self, Distribution, Trend, round1},
};

/// Geography bucket for samples without a city.
pub const UNSPECIFIED_LOCATION: &str = "unspecified";

/// Derived engagement figures for one listing at one point in time.
///
/// Snapshots are rebuilt from scratch on every pass and never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
  pub listing_id:               String,
  pub title:                    String,
  pub location:                 Location,
  pub counts:                   InteractionCounts,
  pub score:                    f64,
  pub trend:                    Trend,
  pub percentage_change:        f64,
  pub conversion_rate:          f64,
  pub average_duration_seconds: f64,
  pub device_distribution:      Distribution<DeviceType>,
  pub source_distribution:      Distribution<TrafficSource>,
  pub geo_distribution:         Distribution<String>,
  pub top_device:               Option<DeviceType>,
  pub top_source:               Option<TrafficSource>,
  pub top_location:             Option<String>,
  pub current_viewer_count:     u64,
  pub peak_viewer_count:        u64,
  pub peak_time:                Option<DateTime<Utc>>,
  pub computed_at:              DateTime<Utc>,
}

/// Build the snapshot for `listing` from its `activity` as of `now`.
pub fn aggregate(
  listing: &Listing,
  activity: &ListingActivity,
  config: &AnalyticsConfig,
  now: DateTime<Utc>,
) -> EngagementSnapshot {
  let counts = activity.current;
  let trend = metrics::trend(
    counts.views as f64,
    activity.previous.views as f64,
    config.trend_threshold_pct,
  );

  let samples = &activity.samples;
  let device_distribution =
    Distribution::tally(DeviceType::iter(), samples.iter().map(|s| s.device.kind));
  let source_distribution =
    Distribution::tally(TrafficSource::iter(), samples.iter().map(|s| s.source));
  let geo_distribution = Distribution::tally(Vec::new(), samples.iter().map(city_of));

  let active: Vec<&ViewerSample> = samples
    .iter()
    .filter(|s| is_active(s.timestamp, now, config.active_window()))
    .collect();
  let (peak_viewer_count, peak_time) = peak(samples);

  EngagementSnapshot {
    listing_id: listing.canonical_id.clone(),
    title: listing.title.clone(),
    location: listing.location.clone(),
    counts,
    score: metrics::engagement_score(&counts),
    trend: trend.trend,
    percentage_change: trend.percentage_change,
    conversion_rate: metrics::conversion_rate(&counts),
    average_duration_seconds: average_duration(&active),
    top_device: device_distribution.top().copied(),
    top_source: source_distribution.top().copied(),
    top_location: geo_distribution.top().cloned(),
    device_distribution,
    source_distribution,
    geo_distribution,
    current_viewer_count: active.len() as u64,
    peak_viewer_count,
    peak_time,
    computed_at: now,
  }
}

/// Snapshot every listing in `listings`, in that order. Listings with no
/// matching activity get an all-zero snapshot; activity for listings not in
/// `listings` is ignored.
pub fn aggregate_all(
  listings: &[Listing],
  activity: Vec<ListingActivity>,
  config: &AnalyticsConfig,
  now: DateTime<Utc>,
) -> Vec<EngagementSnapshot> {
  let mut by_id: HashMap<String, ListingActivity> = activity
    .into_iter()
    .map(|a| (a.listing_id.clone(), a))
    .collect();

  listings
    .iter()
    .map(|listing| {
      let activity = by_id
        .remove(&listing.canonical_id)
        .unwrap_or_else(|| ListingActivity::empty(&listing.canonical_id));
      aggregate(listing, &activity, config, now)
    })
    .collect()
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn city_of(sample: &ViewerSample) -> String {
  sample
    .location
    .city
    .as_deref()
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .unwrap_or(UNSPECIFIED_LOCATION)
    .to_owned()
}

/// A sample is active when it was taken no more than `window` before `now`.
/// Samples stamped slightly in the future (clock skew) count as active.
fn is_active(ts: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> bool {
  now.signed_duration_since(ts) <= window
}

fn average_duration(active: &[&ViewerSample]) -> f64 {
  if active.is_empty() {
    return 0.0;
  }
  let total: u64 = active.iter().map(|s| u64::from(s.duration_seconds)).sum();
  round1(total as f64 / active.len() as f64)
}

/// Largest hourly bucket and the hour it starts at. The earliest hour wins
/// ties.
fn peak(samples: &[ViewerSample]) -> (u64, Option<DateTime<Utc>>) {
  let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
  for sample in samples {
    let hour = sample
      .timestamp
      .duration_trunc(TimeDelta::hours(1))
      .unwrap_or(sample.timestamp);
    *buckets.entry(hour).or_default() += 1;
  }

  let mut best: Option<(DateTime<Utc>, u64)> = None;
  for (hour, count) in buckets {
    if best.is_none_or(|(_, c)| count > c) {
      best = Some((hour, count));
    }
  }
  match best {
    Some((hour, count)) => (count, Some(hour)),
    None => (0, None),
  }
}

#[cfg(test)]
mod tests {
  use brokerdash_core::sample::Interaction;
  use chrono::TimeZone;

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap() }

  fn listing(id: &str) -> Listing {
    let mut l = Listing::new(id, now());
    l.title = "Villa".into();
    l.location.city = Some("Riyadh".into());
    l
  }

  fn sample(
    mins_ago: i64,
    device: DeviceType,
    source: TrafficSource,
    city: Option<&str>,
    duration: u32,
  ) -> ViewerSample {
    ViewerSample::new(
      "1",
      now() - TimeDelta::minutes(mins_ago),
      device,
      source,
      city.map(str::to_owned),
    )
    .with_engagement(duration, 50, 1)
  }

  #[test]
  fn no_activity_gives_a_zero_snapshot() {
    let snap = aggregate(
      &listing("1"),
      &ListingActivity::empty("1"),
      &AnalyticsConfig::default(),
      now(),
    );
    assert_eq!(snap.score, 0.0);
    assert_eq!(snap.trend, Trend::Stable);
    assert_eq!(snap.conversion_rate, 0.0);
    assert_eq!(snap.average_duration_seconds, 0.0);
    assert_eq!(snap.current_viewer_count, 0);
    assert_eq!(snap.peak_viewer_count, 0);
    assert_eq!(snap.peak_time, None);
    assert_eq!(snap.top_device, None);
    assert_eq!(snap.top_location, None);
    assert_eq!(snap.device_distribution.entries.len(), 3);
    assert_eq!(snap.source_distribution.entries.len(), 6);
    assert!(snap.geo_distribution.entries.is_empty());
  }

  #[test]
  fn counts_drive_score_trend_and_conversion() {
    let mut activity = ListingActivity::empty("1");
    activity.current.record(Interaction::View, 110);
    activity.current.record(Interaction::Booking, 11);
    activity.previous.record(Interaction::View, 100);

    let snap = aggregate(&listing("1"), &activity, &AnalyticsConfig::default(), now());
    assert_eq!(snap.score, 165.0);
    assert_eq!(snap.trend, Trend::Up);
    assert_eq!(snap.percentage_change, 10.0);
    assert_eq!(snap.conversion_rate, 10.0);
    assert_eq!(snap.title, "Villa");
    assert_eq!(snap.computed_at, now());
  }

  #[test]
  fn only_recent_samples_are_current_viewers() {
    use DeviceType::*;
    use TrafficSource::*;
    let mut activity = ListingActivity::empty("1");
    activity.samples = vec![
      sample(1, Mobile, Web, Some("Jeddah"), 30),
      sample(4, Mobile, Direct, Some("Riyadh"), 90),
      sample(20, Desktop, Web, None, 600),
    ];

    let snap = aggregate(&listing("1"), &activity, &AnalyticsConfig::default(), now());
    assert_eq!(snap.current_viewer_count, 2);
    assert_eq!(snap.average_duration_seconds, 60.0);
    assert_eq!(snap.top_device, Some(Mobile));
    assert_eq!(snap.top_source, Some(Web));
    // Three cities, one each: the first seen wins.
    assert_eq!(snap.top_location.as_deref(), Some("Jeddah"));
    assert_eq!(snap.geo_distribution.count_of(&UNSPECIFIED_LOCATION.to_owned()), 1);
  }

  #[test]
  fn peak_is_the_busiest_hour() {
    use DeviceType::*;
    use TrafficSource::*;
    let mut activity = ListingActivity::empty("1");
    // 12:29, 12:25 → 12:00 bucket; 11:50, 11:40, 11:35 → 11:00 bucket.
    activity.samples = vec![
      sample(1, Mobile, Web, None, 0),
      sample(5, Mobile, Web, None, 0),
      sample(40, Mobile, Web, None, 0),
      sample(50, Mobile, Web, None, 0),
      sample(55, Mobile, Web, None, 0),
    ];

    let snap = aggregate(&listing("1"), &activity, &AnalyticsConfig::default(), now());
    assert_eq!(snap.peak_viewer_count, 3);
    assert_eq!(
      snap.peak_time,
      Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
    );
  }

  #[test]
  fn peak_ties_go_to_the_earliest_hour() {
    use DeviceType::*;
    use TrafficSource::*;
    let mut activity = ListingActivity::empty("1");
    activity.samples = vec![
      sample(1, Tablet, QrCode, None, 0),
      sample(45, Tablet, QrCode, None, 0),
    ];

    let snap = aggregate(&listing("1"), &activity, &AnalyticsConfig::default(), now());
    assert_eq!(snap.peak_viewer_count, 1);
    assert_eq!(
      snap.peak_time,
      Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
    );
  }

  #[test]
  fn aggregate_all_follows_listing_order() {
    let mut b = ListingActivity::empty("b");
    b.current.record(Interaction::Click, 3);
    let stray = ListingActivity::empty("unknown");

    let snaps = aggregate_all(
      &[listing("a"), listing("b")],
      vec![stray, b],
      &AnalyticsConfig::default(),
      now(),
    );
    let ids: Vec<&str> = snaps.iter().map(|s| s.listing_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(snaps[0].score, 0.0);
    assert_eq!(snaps[1].score, 6.0);
  }
}
