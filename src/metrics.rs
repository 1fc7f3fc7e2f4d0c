// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register descriptions for every feed metric exactly once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_runs_total", "Pipeline runs started.");
        describe_counter!(
            "feed_entries_processed_total",
            "Entries classified across all runs."
        );
        describe_counter!(
            "feed_shorts_filtered_total",
            "Entries dropped as short-form content."
        );
        describe_counter!(
            "feed_errors_total",
            "Fetch failures, malformed feeds, skipped items and failed entry tasks."
        );
        describe_counter!(
            "feed_fetch_attempts_total",
            "Upstream fetch attempts, retries included."
        );
        describe_histogram!("feed_run_ms", "Wall time of one pipeline run in milliseconds.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once, from the binary.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
