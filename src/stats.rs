// src/stats.rs
//! Process-wide run counters.
//!
//! Plain atomics; only the pipeline writes them, handlers read snapshots.
//! Every increment is mirrored to the matching Prometheus counter.

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

const NEVER: i64 = i64::MIN;

#[derive(Debug)]
pub struct RunStats {
    requests: AtomicU64,
    entries_processed: AtomicU64,
    shorts_filtered: AtomicU64,
    errors: AtomicU64,
    /// Unix millis of the last run start, `NEVER` before the first.
    last_run_at: AtomicI64,
    started_at: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            entries_processed: AtomicU64::new(0),
            shorts_filtered: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_run_at: AtomicI64::new(NEVER),
            started_at: Instant::now(),
        }
    }

    pub fn begin_run(&self, now: DateTime<Utc>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.last_run_at
            .store(now.timestamp_millis(), Ordering::Relaxed);
        counter!("feed_runs_total").increment(1);
    }

    pub fn record_entry(&self) {
        self.entries_processed.fetch_add(1, Ordering::Relaxed);
        counter!("feed_entries_processed_total").increment(1);
    }

    pub fn record_short(&self) {
        self.shorts_filtered.fetch_add(1, Ordering::Relaxed);
        counter!("feed_shorts_filtered_total").increment(1);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("feed_errors_total").increment(1);
    }

    /// Percentage of processed entries filtered as shorts.
    pub fn efficiency(&self) -> f64 {
        efficiency_percent(
            self.shorts_filtered.load(Ordering::Relaxed),
            self.entries_processed.load(Ordering::Relaxed),
        )
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let processed = self.entries_processed.load(Ordering::Relaxed);
        let shorts = self.shorts_filtered.load(Ordering::Relaxed);
        let last = self.last_run_at.load(Ordering::Relaxed);
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            videos_processed: processed,
            shorts_filtered: shorts,
            errors: self.errors.load(Ordering::Relaxed),
            filter_efficiency_percent: efficiency_percent(shorts, processed),
            uptime_seconds: self.uptime_seconds(),
            last_request: (last != NEVER)
                .then(|| Utc.timestamp_millis_opt(last).single())
                .flatten(),
        }
    }
}

/// Share of processed entries that were shorts, in percent, two decimals.
pub fn efficiency_percent(shorts: u64, processed: u64) -> f64 {
    if processed == 0 {
        return 0.0;
    }
    let pct = shorts as f64 / processed as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub videos_processed: u64,
    pub shorts_filtered: u64,
    pub errors: u64,
    pub filter_efficiency_percent: f64,
    pub uptime_seconds: u64,
    pub last_request: Option<DateTime<Utc>>,
}
