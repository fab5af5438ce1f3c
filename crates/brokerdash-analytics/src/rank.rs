//! Ordering snapshots for "top listings" views.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{metrics::Trend, snapshot::EngagementSnapshot};

pub const DEFAULT_TOP_N: usize = 5;

/// What to rank by.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RankMetric {
  #[default]
  Score,
  Views,
  ConversionRate,
  CurrentViewers,
}

impl RankMetric {
  fn compare(self, a: &EngagementSnapshot, b: &EngagementSnapshot) -> Ordering {
    match self {
      Self::Score => a.score.total_cmp(&b.score),
      Self::Views => a.counts.views.cmp(&b.counts.views),
      Self::ConversionRate => a.conversion_rate.total_cmp(&b.conversion_rate),
      Self::CurrentViewers => a.current_viewer_count.cmp(&b.current_viewer_count),
    }
  }
}

/// The `top_n` highest-scoring snapshots. Equal scores keep their input
/// order.
pub fn rank(snapshots: Vec<EngagementSnapshot>, top_n: usize) -> Vec<EngagementSnapshot> {
  rank_by(snapshots, RankMetric::Score, top_n)
}

/// Like [`rank`], by any [`RankMetric`].
pub fn rank_by(
  mut snapshots: Vec<EngagementSnapshot>,
  metric: RankMetric,
  top_n: usize,
) -> Vec<EngagementSnapshot> {
  snapshots.sort_by(|a, b| metric.compare(b, a));
  snapshots.truncate(top_n);
  snapshots
}

pub fn filter_trend(
  snapshots: impl IntoIterator<Item = EngagementSnapshot>,
  trend: Trend,
) -> Vec<EngagementSnapshot> {
  snapshots.into_iter().filter(|s| s.trend == trend).collect()
}

#[cfg(test)]
mod tests {
  use brokerdash_core::{listing::Listing, sample::ListingActivity};
  use chrono::Utc;

  use super::*;
  use crate::{config::AnalyticsConfig, snapshot::aggregate};

  fn snap(id: &str, views: u64, bookings: u64) -> EngagementSnapshot {
    let mut activity = ListingActivity::empty(id);
    activity.current.views = views;
    activity.current.bookings = bookings;
    aggregate(
      &Listing::new(id, Utc::now()),
      &activity,
      &AnalyticsConfig::default(),
      Utc::now(),
    )
  }

  fn ids(snaps: &[EngagementSnapshot]) -> Vec<&str> {
    snaps.iter().map(|s| s.listing_id.as_str()).collect()
  }

  #[test]
  fn top_five_by_score_in_order() {
    let input: Vec<EngagementSnapshot> = [3, 9, 1, 7, 5, 8, 2]
      .into_iter()
      .enumerate()
      .map(|(i, v)| snap(&i.to_string(), v, 0))
      .collect();

    let ranked = rank(input, DEFAULT_TOP_N);
    assert_eq!(ranked.len(), 5);
    let scores: Vec<f64> = ranked.iter().map(|s| s.score).collect();
    assert_eq!(scores, vec![9.0, 8.0, 7.0, 5.0, 3.0]);
  }

  #[test]
  fn equal_scores_keep_input_order() {
    let ranked = rank(vec![snap("a", 4, 0), snap("b", 9, 0), snap("c", 4, 0)], 5);
    assert_eq!(ids(&ranked), vec!["b", "a", "c"]);
  }

  #[test]
  fn fewer_than_top_n_returns_all() {
    assert_eq!(rank(vec![snap("a", 1, 0)], 5).len(), 1);
    assert!(rank(Vec::new(), 5).is_empty());
    assert!(rank(vec![snap("a", 1, 0)], 0).is_empty());
  }

  #[test]
  fn rank_by_conversion_rate() {
    // Views dominate score but "b" converts better.
    let ranked = rank_by(
      vec![snap("a", 100, 1), snap("b", 10, 2)],
      RankMetric::ConversionRate,
      5,
    );
    assert_eq!(ids(&ranked), vec!["b", "a"]);
  }

  #[test]
  fn metric_wire_names() {
    assert_eq!("conversion_rate".parse::<RankMetric>().unwrap(), RankMetric::ConversionRate);
    assert_eq!(RankMetric::CurrentViewers.to_string(), "current_viewers");
  }

  #[test]
  fn filter_by_trend() {
    let mut up = snap("up", 1, 0);
    up.trend = Trend::Up;
    let kept = filter_trend(vec![up, snap("flat", 1, 0)], Trend::Up);
    assert_eq!(ids(&kept), vec!["up"]);
  }
}
