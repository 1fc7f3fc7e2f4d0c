//! YouTube Shorts Filter: binary entrypoint.
//! Boots the Axum HTTP server: loads config, wires the feed pipeline, and
//! mounts the feed, status and `/metrics` routes.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use yt_shorts_filter::api::{self, AppState};
use yt_shorts_filter::config::FilterConfig;
use yt_shorts_filter::ingest::fetcher::ReqwestTransport;
use yt_shorts_filter::metrics::Metrics;
use yt_shorts_filter::pipeline::Pipeline;
use yt_shorts_filter::stats::RunStats;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FILTER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FILTER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yt_shorts_filter=debug,info"));

    // The hosting runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = FilterConfig::load_default().context("loading filter config")?;
    if config.channels.is_empty() && config.usernames.is_empty() {
        tracing::warn!("no YouTube channels or usernames configured; set YOUTUBE_CHANNELS or YOUTUBE_USERNAMES");
    }
    tracing::info!(
        channels = config.channels.len(),
        usernames = config.usernames.len(),
        max_short_duration = config.max_short_duration,
        strict = config.strict_filter,
        "YouTube Shorts filter starting"
    );

    let metrics = Metrics::init().context("installing prometheus recorder")?;
    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let pipeline = Pipeline::from_config(&config, transport, Arc::new(RunStats::new()));

    let router = api::router(AppState::new(pipeline, config)).merge(metrics.router());

    Ok(router.into())
}
