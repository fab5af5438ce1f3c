//! Engagement analytics for listings.
//!
//! Viewer samples and interaction counts come from a [`SampleSource`]; the
//! [`EngagementEngine`] turns them into one [`EngagementSnapshot`] per
//! listing, rebuilt wholesale on every pass. Passes run on demand and, while
//! anyone is subscribed, on a periodic tick.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod rank;
pub mod snapshot;
pub mod source;
pub mod ticks;

pub use config::AnalyticsConfig;
pub use engine::{AnalyticsSubscription, EngagementEngine, Scope};
pub use error::{Error, Result};
pub use metrics::{Distribution, DistributionEntry, Trend, TrendResult};
pub use rank::{DEFAULT_TOP_N, RankMetric, rank, rank_by};
pub use snapshot::EngagementSnapshot;
pub use source::{RecordedSource, SampleSource, SourceError, SyntheticSource};
pub use ticks::{IntervalTicks, ManualTicks, TickSource};

#[cfg(test)]
mod tests;
