//! Listing, sample and notification types, identifier normalisation, and
//! the [`store::KvStore`] seam.
//!
//! No HTTP or database code lives here; every other crate builds on it.

// Implementors write `async fn` against the `impl Future + Send` signatures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod ident;
pub mod listing;
pub mod memory;
pub mod notification;
pub mod sample;
pub mod store;

pub use error::{Error, Result};
pub use ident::{canonical_id, normalize};
