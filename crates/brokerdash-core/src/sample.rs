//! Viewer samples and interaction counts: the raw input to analytics.
//!
//! Samples are produced outside the dashboard (telemetry or a synthetic
//! generator) and keyed by canonical listing ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ─── Categories ──────────────────────────────────────────────────────────────

/// Kind of device a viewer used.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
  Desktop,
  Mobile,
  Tablet,
}

/// Device details attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  #[serde(rename = "type")]
  pub kind: DeviceType,
}

/// Where the viewer came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrafficSource {
  Web,
  MobileApp,
  WhatsappLink,
  SocialMedia,
  Direct,
  QrCode,
}

/// Coarse viewer location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLocation {
  pub city: Option<String>,
}

// ─── ViewerSample ────────────────────────────────────────────────────────────

/// One observation of a viewer looking at a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSample {
  pub listing_id:       String,
  pub timestamp:        DateTime<Utc>,
  pub device:           Device,
  pub source:           TrafficSource,
  #[serde(default)]
  pub location:         SampleLocation,
  pub duration_seconds: u32,
  /// Percentage of the page scrolled, always within `0..=100`.
  #[serde(deserialize_with = "clamped_pct")]
  pub scroll_depth_pct: u8,
  pub interactions:     u32,
}

impl ViewerSample {
  /// Convenience constructor; `scroll_depth_pct` is clamped to 100.
  pub fn new(
    listing_id: impl Into<String>,
    timestamp: DateTime<Utc>,
    device: DeviceType,
    source: TrafficSource,
    city: Option<String>,
  ) -> Self {
    Self {
      listing_id: listing_id.into(),
      timestamp,
      device: Device { kind: device },
      source,
      location: SampleLocation { city },
      duration_seconds: 0,
      scroll_depth_pct: 0,
      interactions: 0,
    }
  }

  pub fn with_engagement(
    mut self,
    duration_seconds: u32,
    scroll_depth_pct: u8,
    interactions: u32,
  ) -> Self {
    self.duration_seconds = duration_seconds;
    self.scroll_depth_pct = scroll_depth_pct.min(100);
    self.interactions = interactions;
    self
  }
}

fn clamped_pct<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
  let raw = u32::deserialize(d)?;
  Ok(raw.min(100) as u8)
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// Interaction totals for one listing over one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionCounts {
  pub views:             u64,
  pub clicks:            u64,
  pub whatsapp_messages: u64,
  pub phone_calls:       u64,
  pub bookings:          u64,
  pub shares:            u64,
  pub favorites:         u64,
}

impl InteractionCounts {
  /// Field-wise saturating sum.
  pub fn merged(self, other: Self) -> Self {
    Self {
      views:             self.views.saturating_add(other.views),
      clicks:            self.clicks.saturating_add(other.clicks),
      whatsapp_messages: self
        .whatsapp_messages
        .saturating_add(other.whatsapp_messages),
      phone_calls:       self.phone_calls.saturating_add(other.phone_calls),
      bookings:          self.bookings.saturating_add(other.bookings),
      shares:            self.shares.saturating_add(other.shares),
      favorites:         self.favorites.saturating_add(other.favorites),
    }
  }
}

/// A single interaction an external producer can report.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Interaction {
  View,
  Click,
  WhatsappMessage,
  PhoneCall,
  Booking,
  Share,
  Favorite,
}

impl InteractionCounts {
  pub fn record(&mut self, interaction: Interaction, n: u64) {
    let slot = match interaction {
      Interaction::View => &mut self.views,
      Interaction::Click => &mut self.clicks,
      Interaction::WhatsappMessage => &mut self.whatsapp_messages,
      Interaction::PhoneCall => &mut self.phone_calls,
      Interaction::Booking => &mut self.bookings,
      Interaction::Share => &mut self.shares,
      Interaction::Favorite => &mut self.favorites,
    };
    *slot = slot.saturating_add(n);
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

/// Everything the aggregator needs for one listing in one recompute pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingActivity {
  pub listing_id: String,
  /// Counts for the current period.
  pub current:    InteractionCounts,
  /// Counts for the prior period; the trend is measured against these.
  pub previous:   InteractionCounts,
  pub samples:    Vec<ViewerSample>,
}

impl ListingActivity {
  pub fn empty(listing_id: impl Into<String>) -> Self {
    Self { listing_id: listing_id.into(), ..Default::default() }
  }
}
