//! Synchronization bus for broadcasting listing mutations.
//!
//! # Guarantees
//!
//! - **Synchronous**: `publish` returns after every handler has run
//! - **At-most-once**: each publish reaches each current subscriber once
//! - **No replay**: subscribers registered after a publish never see it
//! - **Fault isolation**: a handler that errors or panics is logged and
//!   skipped; the remaining handlers still run and the publisher never sees
//!   the failure
//!
//! Events are hints. They carry the mutation kind and canonical ID only;
//! handlers re-read the registry for the current record (see
//! [`crate::Registry::watch`]).

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{error, warn};

// ─── Topics and events ───────────────────────────────────────────────────────

/// Bus topic. The string forms are the wire names shared with views.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Topic {
  ListingMutated,
  ListingRemoved,
  StatusChanged,
}

/// What the registry did.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
  Created,
  Updated,
  StatusChanged,
  Removed,
}

/// Payload of every bus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
  pub mutation_kind: MutationKind,
  pub canonical_id:  String,
}

impl BusEvent {
  pub fn new(mutation_kind: MutationKind, canonical_id: impl Into<String>) -> Self {
    Self { mutation_kind, canonical_id: canonical_id.into() }
  }
}

/// Error a handler may return. It is logged by the bus and goes no further.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&BusEvent) -> HandlerResult + Send + Sync>;

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// Returned by [`Bus::subscribe`]; pass it to [`Bus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
  topic: Topic,
  id:    u64,
}

impl SubscriptionToken {
  pub fn topic(&self) -> Topic { self.topic }
}

struct Subscriber {
  id:      u64,
  topic:   Topic,
  handler: Handler,
}

#[derive(Default)]
struct BusInner {
  next_id:     AtomicU64,
  subscribers: Mutex<Vec<Subscriber>>,
}

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// In-process publish/subscribe bus.
///
/// There is no global instance; create one and hand clones to every
/// component that needs it. Clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct Bus {
  inner: Arc<BusInner>,
}

impl Bus {
  pub fn new() -> Self { Self::default() }

  /// Register `handler` for `topic`. Only events published after this call
  /// are delivered.
  pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionToken
  where
    F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
  {
    self.subscribe_shared(topic, Arc::new(handler))
  }

  pub(crate) fn subscribe_shared(
    &self,
    topic: Topic,
    handler: Handler,
  ) -> SubscriptionToken {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self.table().push(Subscriber { id, topic, handler });
    SubscriptionToken { topic, id }
  }

  /// Remove a subscription. Returns `false` if it was already gone.
  pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
    let mut table = self.table();
    let before = table.len();
    table.retain(|s| s.id != token.id);
    table.len() != before
  }

  /// Deliver `event` to every handler currently subscribed to `topic`, in
  /// subscription order.
  ///
  /// Returns the number of handlers that completed without error. Handlers
  /// added or removed while this call runs take effect on the next publish.
  pub fn publish(&self, topic: Topic, event: &BusEvent) -> usize {
    let handlers: Vec<(u64, Handler)> = self
      .table()
      .iter()
      .filter(|s| s.topic == topic)
      .map(|s| (s.id, Arc::clone(&s.handler)))
      .collect();

    let mut delivered = 0;
    for (id, handler) in handlers {
      match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => delivered += 1,
        Ok(Err(e)) => {
          warn!(
            %topic,
            subscriber = id,
            canonical_id = %event.canonical_id,
            error = %e,
            "bus handler failed"
          );
        }
        Err(panic) => {
          let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
          error!(
            %topic,
            subscriber = id,
            canonical_id = %event.canonical_id,
            panic = %message,
            "bus handler panicked"
          );
        }
      }
    }
    delivered
  }

  /// Number of live subscriptions, optionally restricted to one topic.
  pub fn subscriber_count(&self, topic: Option<Topic>) -> usize {
    self
      .table()
      .iter()
      .filter(|s| topic.is_none_or(|t| s.topic == t))
      .count()
  }

  // Handlers never run under this lock, so poisoning can only come from a
  // panic inside `Vec` itself; the table is still consistent then.
  fn table(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl std::fmt::Debug for Bus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Bus")
      .field("subscriber_count", &self.subscriber_count(None))
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  fn event(id: &str) -> BusEvent { BusEvent::new(MutationKind::Updated, id) }

  #[test]
  fn topic_wire_names() {
    assert_eq!(Topic::ListingMutated.to_string(), "listing-mutated");
    assert_eq!(Topic::ListingRemoved.as_ref(), "listing-removed");
    assert_eq!("status-changed".parse::<Topic>().unwrap(), Topic::StatusChanged);
  }

  #[test]
  fn delivers_to_matching_topic_only() {
    let bus = Bus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    bus.subscribe(Topic::ListingMutated, move |e| {
      s.lock().unwrap().push(e.canonical_id.clone());
      Ok(())
    });

    assert_eq!(bus.publish(Topic::ListingMutated, &event("a")), 1);
    assert_eq!(bus.publish(Topic::StatusChanged, &event("b")), 0);
    assert_eq!(*seen.lock().unwrap(), vec!["a"]);
  }

  #[test]
  fn late_subscribers_get_no_replay() {
    let bus = Bus::new();
    bus.publish(Topic::ListingMutated, &event("early"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.subscribe(Topic::ListingMutated, move |e| {
      s.lock().unwrap().push(e.canonical_id.clone());
      Ok(())
    });

    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn failing_and_panicking_handlers_are_isolated() {
    let bus = Bus::new();
    let hits = Arc::new(AtomicU64::new(0));

    bus.subscribe(Topic::StatusChanged, |_| Err("boom".into()));
    bus.subscribe(Topic::StatusChanged, |_| panic!("handler exploded"));
    let h = Arc::clone(&hits);
    bus.subscribe(Topic::StatusChanged, move |_| {
      h.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });

    let delivered = bus.publish(Topic::StatusChanged, &event("x"));
    assert_eq!(delivered, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The bus keeps working after a panic.
    bus.publish(Topic::StatusChanged, &event("y"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let bus = Bus::new();
    let hits = Arc::new(AtomicU64::new(0));
    let h = Arc::clone(&hits);
    let token = bus.subscribe(Topic::ListingRemoved, move |_| {
      h.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });

    bus.publish(Topic::ListingRemoved, &event("a"));
    assert!(bus.unsubscribe(token));
    assert!(!bus.unsubscribe(token));
    bus.publish(Topic::ListingRemoved, &event("b"));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(None), 0);
  }

  #[test]
  fn handler_may_subscribe_during_dispatch() {
    let bus = Bus::new();
    let inner_bus = bus.clone();
    bus.subscribe(Topic::ListingMutated, move |_| {
      inner_bus.subscribe(Topic::ListingMutated, |_| Ok(()));
      Ok(())
    });

    // The handler added mid-dispatch is not invoked for this event.
    assert_eq!(bus.publish(Topic::ListingMutated, &event("a")), 1);
    assert_eq!(bus.subscriber_count(Some(Topic::ListingMutated)), 2);
  }

  #[test]
  fn preserves_publish_order() {
    let bus = Bus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.subscribe(Topic::ListingMutated, move |e| {
      s.lock().unwrap().push(e.canonical_id.clone());
      Ok(())
    });
    for id in ["1", "2", "3"] {
      bus.publish(Topic::ListingMutated, &event(id));
    }
    assert_eq!(*seen.lock().unwrap(), vec!["1", "2", "3"]);
  }
}
