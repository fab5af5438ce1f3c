//! Notifications raised as a side effect of registry mutations.
//!
//! A notification is created once, may be marked read, and may be deleted.
//! Deleted notifications are never brought back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// What happened to the related listing.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
  ListingPublished,
  ListingUnpublished,
  ListingRemoved,
}

/// Caller-supplied part of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
  #[serde(rename = "type")]
  pub kind:               NotificationKind,
  pub related_listing_id: String,
  /// Short human-readable line, typically the listing title.
  #[serde(default)]
  pub title:              String,
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub id:                 Uuid,
  pub recipient_id:       String,
  #[serde(rename = "type")]
  pub kind:               NotificationKind,
  pub related_listing_id: String,
  pub title:              String,
  pub read:               bool,
  pub timestamp:          DateTime<Utc>,
}

impl Notification {
  pub fn new(
    recipient_id: impl Into<String>,
    payload: NewNotification,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      recipient_id: recipient_id.into(),
      kind: payload.kind,
      related_listing_id: payload.related_listing_id,
      title: payload.title,
      read: false,
      timestamp,
    }
  }
}
