//! A listing is a property advertisement tracked by the registry.
//!
//! A listing is keyed by its canonical ID (see [`crate::ident::normalize`]).
//! Its publication state is a closed two-state machine; there is no other
//! way to represent a status.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::Result;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Publication state of a listing. Transitions only between the two variants.
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
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ListingStatus {
  #[default]
  Draft,
  Published,
}

impl ListingStatus {
  pub fn is_published(self) -> bool { matches!(self, Self::Published) }
}

// ─── Sub-records ─────────────────────────────────────────────────────────────

/// Where the property is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub city:     Option<String>,
  pub district: Option<String>,
}

impl Location {
  /// `"city - district"`, or whichever part exists, or the empty string.
  pub fn label(&self) -> String {
    let parts: Vec<&str> = [self.city.as_deref(), self.district.as_deref()]
      .into_iter()
      .flatten()
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .collect();
    parts.join(" - ")
  }
}

/// Counters the broker sees on the dashboard card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingStats {
  pub views:    u64,
  pub requests: u64,
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// A listing record as owned by the registry and persisted under its
/// canonical ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
  pub canonical_id: String,
  /// Raw references this listing has been addressed by. Diagnostic only;
  /// lookups always go through the canonical ID.
  #[serde(default)]
  pub aliases:      BTreeSet<String>,
  pub status:       ListingStatus,
  pub title:        String,
  pub price:        u64,
  #[serde(default)]
  pub location:     Location,
  pub owner_ref:    String,
  #[serde(default)]
  pub media_refs:   Vec<String>,
  #[serde(default)]
  pub stats:        ListingStats,
  #[serde(default)]
  pub pinned:       bool,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl Listing {
  /// A fresh draft with every optional field at its default.
  pub fn new(canonical_id: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      canonical_id: canonical_id.into(),
      aliases:      BTreeSet::new(),
      status:       ListingStatus::Draft,
      title:        String::new(),
      price:        0,
      location:     Location::default(),
      owner_ref:    String::new(),
      media_refs:   Vec::new(),
      stats:        ListingStats::default(),
      pinned:       false,
      created_at:   now,
      updated_at:   now,
    }
  }

  /// Serialise to the flat JSON record kept in the durable store.
  pub fn to_record(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  /// Parse a record previously written by [`Listing::to_record`].
  pub fn from_record(record: &str) -> Result<Self> {
    Ok(serde_json::from_str(record)?)
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// Fields accepted by an upsert. Present fields overwrite; absent fields keep
/// their current value (or the default on creation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingPatch {
  pub status:     Option<ListingStatus>,
  pub title:      Option<String>,
  pub price:      Option<u64>,
  pub location:   Option<Location>,
  pub owner_ref:  Option<String>,
  pub media_refs: Option<Vec<String>>,
  pub stats:      Option<ListingStats>,
  pub pinned:     Option<bool>,
}

impl ListingPatch {
  /// Merge into `listing`, returning whether anything changed.
  pub fn apply_to(self, listing: &mut Listing) -> bool {
    let before = listing.clone();
    if let Some(v) = self.status {
      listing.status = v;
    }
    if let Some(v) = self.title {
      listing.title = v;
    }
    if let Some(v) = self.price {
      listing.price = v;
    }
    if let Some(v) = self.location {
      listing.location = v;
    }
    if let Some(v) = self.owner_ref {
      listing.owner_ref = v;
    }
    if let Some(v) = self.media_refs {
      listing.media_refs = v;
    }
    if let Some(v) = self.stats {
      listing.stats = v;
    }
    if let Some(v) = self.pinned {
      listing.pinned = v;
    }
    *listing != before
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Parameters for listing queries. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
  pub status:    Option<ListingStatus>,
  /// Case-insensitive match against `location.city`.
  pub city:      Option<String>,
  pub owner_ref: Option<String>,
  pub pinned:    Option<bool>,
}

impl ListingFilter {
  pub fn matches(&self, listing: &Listing) -> bool {
    if let Some(status) = self.status
      && listing.status != status
    {
      return false;
    }
    if let Some(city) = &self.city {
      let hit = listing
        .location
        .city
        .as_deref()
        .is_some_and(|c| c.trim().eq_ignore_ascii_case(city.trim()));
      if !hit {
        return false;
      }
    }
    if let Some(owner) = &self.owner_ref
      && &listing.owner_ref != owner
    {
      return false;
    }
    if let Some(pinned) = self.pinned
      && listing.pinned != pinned
    {
      return false;
    }
    true
  }
}
