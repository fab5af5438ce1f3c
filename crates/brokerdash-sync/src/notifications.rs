//! Per-recipient notification store and the publication notifier.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use brokerdash_core::{
  listing::ListingStatus,
  notification::{NewNotification, Notification, NotificationKind},
  store::KvStore,
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  bus::Topic,
  registry::{Registry, Watch},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Notifications keyed by recipient, oldest first within each recipient.
///
/// Cloning is cheap; clones share the same records.
#[derive(Clone, Default)]
pub struct NotificationStore {
  by_recipient: Arc<RwLock<HashMap<String, Vec<Notification>>>>,
}

impl NotificationStore {
  pub fn new() -> Self { Self::default() }

  /// Record a new unread notification for `recipient_id`.
  pub fn create_notification(
    &self,
    recipient_id: &str,
    payload: NewNotification,
  ) -> Notification {
    let notification = Notification::new(recipient_id, payload, Utc::now());
    self
      .by_recipient
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(recipient_id.to_owned())
      .or_default()
      .push(notification.clone());
    debug!(
      recipient = recipient_id,
      kind = %notification.kind,
      listing = %notification.related_listing_id,
      "notification created"
    );
    notification
  }

  /// Notifications for `recipient_id`, newest first.
  pub fn list(&self, recipient_id: &str, unread_only: bool) -> Vec<Notification> {
    let map = self.by_recipient.read().unwrap_or_else(PoisonError::into_inner);
    map
      .get(recipient_id)
      .map(|all| {
        all
          .iter()
          .rev()
          .filter(|n| !unread_only || !n.read)
          .cloned()
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn unread_count(&self, recipient_id: &str) -> usize {
    let map = self.by_recipient.read().unwrap_or_else(PoisonError::into_inner);
    map
      .get(recipient_id)
      .map(|all| all.iter().filter(|n| !n.read).count())
      .unwrap_or(0)
  }

  /// Mark one notification read and return it.
  pub fn mark_read(&self, recipient_id: &str, id: Uuid) -> Result<Notification> {
    let mut map = self.by_recipient.write().unwrap_or_else(PoisonError::into_inner);
    let n = map
      .get_mut(recipient_id)
      .and_then(|all| all.iter_mut().find(|n| n.id == id))
      .ok_or(Error::NotificationNotFound(id))?;
    n.read = true;
    Ok(n.clone())
  }

  /// Mark everything read; returns how many changed.
  pub fn mark_all_read(&self, recipient_id: &str) -> usize {
    let mut map = self.by_recipient.write().unwrap_or_else(PoisonError::into_inner);
    let Some(all) = map.get_mut(recipient_id) else {
      return 0;
    };
    let mut changed = 0;
    for n in all.iter_mut().filter(|n| !n.read) {
      n.read = true;
      changed += 1;
    }
    changed
  }

  /// Delete a notification for good.
  pub fn delete(&self, recipient_id: &str, id: Uuid) -> Result<()> {
    let mut map = self.by_recipient.write().unwrap_or_else(PoisonError::into_inner);
    let all = map
      .get_mut(recipient_id)
      .ok_or(Error::NotificationNotFound(id))?;
    let before = all.len();
    all.retain(|n| n.id != id);
    if all.len() == before {
      return Err(Error::NotificationNotFound(id));
    }
    Ok(())
  }
}

// ─── Publication notifier ────────────────────────────────────────────────────

/// Notify a listing's owner when it becomes published.
///
/// Runs as a registry watch, so the status it checks is the one the registry
/// holds at delivery time. Moving back to draft emits nothing, and listings
/// without an owner are skipped.
pub fn notify_on_status_change<S: KvStore>(
  registry: &Registry<S>,
  notifications: NotificationStore,
) -> Watch {
  registry.watch(&[Topic::StatusChanged], move |event, current| {
    let Some(listing) = current else {
      return Ok(());
    };
    if listing.status != ListingStatus::Published {
      return Ok(());
    }
    if listing.owner_ref.is_empty() {
      debug!(canonical_id = %event.canonical_id, "published listing has no owner");
      return Ok(());
    }
    notifications.create_notification(&listing.owner_ref, NewNotification {
      kind: NotificationKind::ListingPublished,
      related_listing_id: listing.canonical_id,
      title: listing.title,
    });
    Ok(())
  })
}
