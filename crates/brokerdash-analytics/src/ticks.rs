//! Clocks that drive the periodic recompute.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Notify;

/// Something the engine can wait on between periodic passes.
#[async_trait]
pub trait TickSource: Send + Sync + 'static {
  /// Resolve when the next pass is due. `period` is the configured tick
  /// interval; sources may ignore it.
  async fn tick(&self, period: Duration);
}

/// Real time: each tick waits one full `period`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTicks;

#[async_trait]
impl TickSource for IntervalTicks {
  async fn tick(&self, period: Duration) { tokio::time::sleep(period).await }
}

/// Ticks fired by hand, for tests and tools.
///
/// A fire with nobody waiting is remembered and releases the next wait, so
/// a test can fire before the engine's loop reaches its await.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
  notify: Arc<Notify>,
}

impl ManualTicks {
  pub fn new() -> Self { Self::default() }

  pub fn fire(&self) { self.notify.notify_one(); }
}

#[async_trait]
impl TickSource for ManualTicks {
  async fn tick(&self, _period: Duration) { self.notify.notified().await }
}
