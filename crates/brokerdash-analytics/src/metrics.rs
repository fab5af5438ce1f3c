//! Pure engagement math: score, trend, rates and distributions.
//!
//! Every division has an explicit zero-denominator branch; nothing here
//! returns NaN or infinity.

use brokerdash_core::sample::InteractionCounts;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Score ───────────────────────────────────────────────────────────────────

/// Weighted engagement score. Weights are fixed:
/// views 1, clicks 2, WhatsApp messages 3, phone calls 4, bookings 5,
/// shares 2, favorites 1.
pub fn engagement_score(c: &InteractionCounts) -> f64 {
  c.views as f64
    + c.clicks as f64 * 2.0
    + c.whatsapp_messages as f64 * 3.0
    + c.phone_calls as f64 * 4.0
    + c.bookings as f64 * 5.0
    + c.shares as f64 * 2.0
    + c.favorites as f64
}

/// Bookings per hundred views, one decimal place.
pub fn conversion_rate(c: &InteractionCounts) -> f64 {
  if c.views == 0 {
    return 0.0;
  }
  round1(c.bookings as f64 * 100.0 / c.views as f64)
}

pub(crate) fn round1(x: f64) -> f64 { (x * 10.0).round() / 10.0 }

// ─── Trend ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trend {
  Up,
  Down,
  #[default]
  Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
  pub trend:             Trend,
  /// Absolute change in percent, one decimal place.
  pub percentage_change: f64,
}

/// Compare `current` against `previous`.
///
/// A zero `previous` has no meaningful baseline and is always Stable with a
/// zero change. Otherwise a change smaller than `threshold` percent (in
/// either direction) is Stable.
pub fn trend(current: f64, previous: f64, threshold: f64) -> TrendResult {
  if previous == 0.0 {
    return TrendResult { trend: Trend::Stable, percentage_change: 0.0 };
  }
  let change = (current - previous) * 100.0 / previous;
  let trend = if change.abs() < threshold {
    Trend::Stable
  } else if change > 0.0 {
    Trend::Up
  } else {
    Trend::Down
  };
  TrendResult { trend, percentage_change: round1(change.abs()) }
}

// ─── Distributions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionEntry<K> {
  pub key:        K,
  pub count:      u64,
  /// `round(count / total * 100)`, nudged by one point where needed so that
  /// a non-empty distribution sums to exactly 100.
  pub percentage: u32,
  /// Position of this key's first occurrence in the tallied input.
  #[serde(skip)]
  first_seen:     Option<usize>,
}

/// Counts per category over one sample set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution<K> {
  pub total:   u64,
  pub entries: Vec<DistributionEntry<K>>,
}

impl<K: PartialEq + Clone> Distribution<K> {
  /// Tally `keys`. Entries start with `fixed`, in that order, followed by any
  /// other key in the order it first appears.
  pub fn tally(
    fixed: impl IntoIterator<Item = K>,
    keys: impl IntoIterator<Item = K>,
  ) -> Self {
    let mut entries: Vec<DistributionEntry<K>> = fixed
      .into_iter()
      .map(|key| DistributionEntry { key, count: 0, percentage: 0, first_seen: None })
      .collect();

    let mut total = 0u64;
    for (i, key) in keys.into_iter().enumerate() {
      total += 1;
      match entries.iter_mut().find(|e| e.key == key) {
        Some(entry) => {
          entry.count += 1;
          entry.first_seen.get_or_insert(i);
        }
        None => entries.push(DistributionEntry {
          key,
          count: 1,
          percentage: 0,
          first_seen: Some(i),
        }),
      }
    }

    if total > 0 {
      for entry in &mut entries {
        entry.percentage = share(entry.count, total).round() as u32;
      }
      settle_rounding(&mut entries, total);
    }
    Self { total, entries }
  }

  /// The most frequent key. Ties go to the key seen first in the input; an
  /// empty distribution has no top.
  pub fn top(&self) -> Option<&K> {
    self
      .entries
      .iter()
      .filter(|e| e.count > 0)
      .min_by_key(|e| (std::cmp::Reverse(e.count), e.first_seen))
      .map(|e| &e.key)
  }

  pub fn count_of(&self, key: &K) -> u64 {
    self.entries.iter().find(|e| &e.key == key).map_or(0, |e| e.count)
  }
}

fn share(count: u64, total: u64) -> f64 { count as f64 * 100.0 / total as f64 }

/// Move the rounded percentages onto a total of 100, one point at a time.
///
/// Each step adjusts the entry whose rounding error points furthest in the
/// needed direction; ties go to the key seen first.
fn settle_rounding<K>(entries: &mut [DistributionEntry<K>], total: u64) {
  let mut sum: i64 = entries.iter().map(|e| i64::from(e.percentage)).sum();
  while sum != 100 {
    let raise = sum < 100;
    let error = |e: &DistributionEntry<K>| {
      let exact = share(e.count, total);
      if raise { exact - f64::from(e.percentage) } else { f64::from(e.percentage) - exact }
    };
    let Some(entry) = entries
      .iter_mut()
      .filter(|e| e.count > 0 && (raise || e.percentage > 0))
      .max_by(|a, b| {
        error(&**a)
          .total_cmp(&error(&**b))
          .then_with(|| b.first_seen.cmp(&a.first_seen))
      })
    else {
      break;
    };
    if raise {
      entry.percentage += 1;
      sum += 1;
    } else {
      entry.percentage -= 1;
      sum -= 1;
    }
  }
}
