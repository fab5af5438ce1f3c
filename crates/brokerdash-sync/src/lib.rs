//! Listing registry and the in-process synchronization bus.
//!
//! The [`Registry`] owns every listing record. Each committed mutation is
//! announced on a [`Bus`] with only the mutation kind and canonical ID;
//! subscribers re-read the registry to learn the current state. Views that
//! mount later reconcile by querying the registry directly.

pub mod bus;
pub mod error;
pub mod grouping;
pub mod notifications;
pub mod registry;

pub use bus::{Bus, BusEvent, MutationKind, SubscriptionToken, Topic};
pub use error::{Error, Result};
pub use grouping::{CityGroup, UNSPECIFIED_CITY, group_by_city};
pub use notifications::{NotificationStore, notify_on_status_change};
pub use registry::{Registry, Watch};
