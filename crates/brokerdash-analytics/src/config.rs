//! Engine tuning, deserialised as the `[analytics]` section of the server
//! config.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::source::DEFAULT_SAMPLE_RETENTION_SECS;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
  /// Seconds between periodic recomputes.
  pub tick_interval_secs:    u64,
  /// Minimum absolute percentage change before a trend is Up or Down.
  pub trend_threshold_pct:   f64,
  /// How far back a sample still counts as a current viewer.
  pub active_window_secs:    u64,
  /// Listings aggregated between cooperative yields.
  pub batch_size:            usize,
  pub default_top_n:         usize,
  /// Feed the engine random samples instead of recorded ones.
  pub synthetic_samples:     bool,
  /// How long recorded samples are kept for distributions and the peak hour.
  pub sample_retention_secs: u64,
}

impl Default for AnalyticsConfig {
  fn default() -> Self {
    Self {
      tick_interval_secs:    5,
      trend_threshold_pct:   5.0,
      active_window_secs:    300,
      batch_size:            100,
      default_top_n:         5,
      synthetic_samples:     false,
      sample_retention_secs: DEFAULT_SAMPLE_RETENTION_SECS as u64,
    }
  }
}

impl AnalyticsConfig {
  pub fn tick_interval(&self) -> Duration {
    Duration::from_secs(self.tick_interval_secs.max(1))
  }

  pub fn active_window(&self) -> TimeDelta {
    let secs = self.active_window_secs.min(i64::MAX as u64 / 1000);
    TimeDelta::seconds(secs as i64)
  }

  pub fn batch_size(&self) -> usize { self.batch_size.max(1) }

  /// Never shorter than the active window, so current viewers survive
  /// pruning.
  pub fn sample_retention(&self) -> TimeDelta {
    let secs = self.sample_retention_secs.min(i64::MAX as u64 / 1000);
    TimeDelta::seconds(secs as i64).max(self.active_window())
  }
}
