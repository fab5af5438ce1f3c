//! brokerdash server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! listing store, starts the engagement engine and serves the JSON API over
//! HTTP.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use brokerdash_analytics::{
  EngagementEngine, IntervalTicks, RecordedSource, Scope, SyntheticSource,
};
use brokerdash_api::AppState;
use brokerdash_store_sqlite::SqliteKvStore;
use brokerdash_sync::{Bus, NotificationStore, Registry, notify_on_status_change};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Broker listing dashboard server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  // Open the listing store and hydrate the registry from it.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteKvStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let registry = Registry::open(store, Bus::new())
    .await
    .context("failed to load listings")?;
  tracing::info!(listings = registry.len(), "registry loaded");

  let notifications = NotificationStore::new();
  let _notifier = notify_on_status_change(&registry, notifications.clone());

  // Engagement engine, fed either by ingestion or by random samples.
  let analytics = server_cfg.analytics.clone();
  let (engine, recorder) = if analytics.synthetic_samples {
    tracing::info!("analytics fed by synthetic samples");
    let engine =
      EngagementEngine::new(registry.clone(), SyntheticSource::new(OsRng), IntervalTicks, analytics);
    (engine, None)
  } else {
    let recorder = RecordedSource::new().with_retention(analytics.sample_retention());
    let _forget_removed = recorder.follow_removals(&registry);
    let engine =
      EngagementEngine::new(registry.clone(), recorder.clone(), IntervalTicks, analytics);
    (engine, Some(recorder))
  };
  // Held for the life of the server: keeps the ticker running and every
  // listing's snapshot cached for the API.
  let _analytics = engine.subscribe(Scope::All);

  let state = AppState { registry, notifications, engine, recorder };
  let app = axum::Router::new().nest("/api", brokerdash_api::api_router(state));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
