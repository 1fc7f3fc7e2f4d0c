// src/pipeline.rs
//! Fetch → parse → classify/enrich → merge, over every configured source.
//!
//! Sources run concurrently through `buffer_unordered`, with fetches bounded
//! by their own semaphore; every entry of a parsed source is classified and
//! enriched on a shared semaphore-bounded task pool, so one source can be
//! enriching while others still fetch.
//! Per-source results are re-ordered by source index before merging.
//!
//! No per-source or per-entry failure escapes [`Pipeline::run`]: failures are
//! logged, counted once in [`RunStats`] and the source contributes nothing.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::histogram;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classify::{duration_from_title, ShortClassifier};
use crate::config::FilterConfig;
use crate::enrich::{EnrichOptions, EnrichedEntry, EntryEnricher};
use crate::ingest::fetcher::{FeedFetcher, FeedTransport, RetryPolicy};
use crate::ingest::parser::parse_feed;
use crate::ingest::types::Source;
use crate::merge::merge;
use crate::metrics::ensure_metrics_described;
use crate::stats::{RunStats, StatsSnapshot};

/* ---- Phases ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    FetchingAll,
    ParsingAll,
    ClassifyingAndEnriching,
    Merging,
    Done,
    Failed(FailureReason),
}

impl PipelinePhase {
    fn rank(self) -> u8 {
        match self {
            PipelinePhase::Idle => 0,
            PipelinePhase::FetchingAll => 1,
            PipelinePhase::ParsingAll => 2,
            PipelinePhase::ClassifyingAndEnriching => 3,
            PipelinePhase::Merging => 4,
            PipelinePhase::Done | PipelinePhase::Failed(_) => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::FetchingAll => "fetching_all",
            PipelinePhase::ParsingAll => "parsing_all",
            PipelinePhase::ClassifyingAndEnriching => "classifying_and_enriching",
            PipelinePhase::Merging => "merging",
            PipelinePhase::Done => "done",
            PipelinePhase::Failed(_) => "failed",
        }
    }
}

/// When a phase was left, relative to run start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub phase: PipelinePhase,
    pub ended_after_ms: u64,
}

/// Global barriers over per-source progress.
///
/// Each stage counter starts at the number of sources; a source settles a
/// stage whether it succeeded or not. The phase moves on when the last
/// outstanding source settles the current stage. Phases only move forward.
struct PhaseTracker {
    started: Instant,
    fetch_left: AtomicUsize,
    parse_left: AtomicUsize,
    process_left: AtomicUsize,
    state: Mutex<(PipelinePhase, Vec<PhaseTiming>)>,
}

impl PhaseTracker {
    fn new(sources: usize) -> Self {
        Self {
            started: Instant::now(),
            fetch_left: AtomicUsize::new(sources),
            parse_left: AtomicUsize::new(sources),
            process_left: AtomicUsize::new(sources),
            state: Mutex::new((PipelinePhase::Idle, Vec::new())),
        }
    }

    fn advance(&self, to: PipelinePhase) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let (current, timings) = &mut *guard;
        if to.rank() <= current.rank() {
            return;
        }
        let elapsed = self.started.elapsed();
        timings.push(PhaseTiming {
            phase: *current,
            ended_after_ms: elapsed.as_millis() as u64,
        });
        info!(
            from = current.as_str(),
            to = to.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline phase"
        );
        *current = to;
    }

    fn settle(counter: &AtomicUsize) -> bool {
        counter.fetch_sub(1, Ordering::AcqRel) == 1
    }

    fn fetched(&self) {
        if Self::settle(&self.fetch_left) {
            self.advance(PipelinePhase::ParsingAll);
        }
    }

    fn parsed(&self) {
        if Self::settle(&self.parse_left) {
            self.advance(PipelinePhase::ClassifyingAndEnriching);
        }
    }

    fn processed(&self) {
        if Self::settle(&self.process_left) {
            self.advance(PipelinePhase::Merging);
        }
    }

    /// Source gave up before producing entries: settle every remaining stage.
    fn abandoned_after_fetch(&self) {
        self.parsed();
        self.processed();
    }

    fn finish(&self) -> (PipelinePhase, Vec<PhaseTiming>) {
        let guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        (guard.0, guard.1.clone())
    }
}

/* ---- Report ---- */

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub entries: Vec<EnrichedEntry>,
    pub stats: StatsSnapshot,
    pub phase: PipelinePhase,
    /// Cancelled or past the run deadline; `entries` covers finished sources only.
    pub incomplete: bool,
    pub timings: Vec<PhaseTiming>,
    pub elapsed_ms: u64,
}

enum EntryOutcome {
    Kept(EnrichedEntry),
    Short { title: String, reason: String },
}

/* ---- Orchestrator ---- */

pub struct Pipeline {
    sources: Vec<Arc<Source>>,
    fetcher: FeedFetcher,
    classifier: Arc<ShortClassifier>,
    enricher: Arc<EntryEnricher>,
    stats: Arc<RunStats>,
    fetch_concurrency: usize,
    entry_concurrency: usize,
    deadline: Duration,
}

impl Pipeline {
    pub fn from_config(
        cfg: &FilterConfig,
        transport: Arc<dyn FeedTransport>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            sources: cfg.sources().into_iter().map(Arc::new).collect(),
            fetcher: FeedFetcher::new(transport, RetryPolicy::from(&cfg.fetch)),
            classifier: Arc::new(ShortClassifier::from_config(cfg)),
            enricher: Arc::new(EntryEnricher::new(EnrichOptions::from(cfg))),
            stats,
            fetch_concurrency: cfg.fetch.concurrency.max(1),
            entry_concurrency: cfg.entry_concurrency.max(1),
            deadline: cfg.run_deadline(),
        }
    }

    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub async fn run(&self) -> RunReport {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Run once. A tripped `cancel` (or the run deadline) stops new sources,
    /// drops in-flight work and returns what finished with `incomplete` set.
    pub async fn run_with_cancel(&self, cancel: CancellationToken) -> RunReport {
        ensure_metrics_described();
        self.stats.begin_run(Utc::now());
        let tracker = PhaseTracker::new(self.sources.len());

        if self.sources.is_empty() {
            warn!("no sources configured, nothing to fetch");
            tracker.advance(PipelinePhase::Failed(FailureReason::NoSources));
            return self.report(Vec::new(), &tracker, false);
        }

        tracker.advance(PipelinePhase::FetchingAll);
        let permits = Arc::new(Semaphore::new(self.entry_concurrency));
        let deadline = self.deadline;
        let stop = async move {
            tokio::select! {
                _ = cancel.cancelled() => warn!("run cancelled"),
                _ = tokio::time::sleep(deadline) => warn!(?deadline, "run deadline reached"),
            }
        };

        // Fetch slots are held only while a source is fetching, so a source
        // busy classifying never blocks another source's fetch.
        let fetch_slots = Semaphore::new(self.fetch_concurrency);
        let work: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, src)| self.run_source(idx, src, &fetch_slots, &permits, &tracker))
            .collect();

        let mut finished: Vec<(usize, Vec<EnrichedEntry>)> = stream::iter(work)
            .buffer_unordered(self.sources.len())
            .take_until(stop)
            .collect()
            .await;

        let incomplete = finished.len() < self.sources.len();
        finished.sort_by_key(|(idx, _)| *idx);

        tracker.advance(PipelinePhase::Merging);
        let merged = merge(finished.into_iter().map(|(_, batch)| batch).collect());
        tracker.advance(PipelinePhase::Done);

        self.report(merged, &tracker, incomplete)
    }

    fn report(&self, entries: Vec<EnrichedEntry>, tracker: &PhaseTracker, incomplete: bool) -> RunReport {
        let (phase, timings) = tracker.finish();
        let elapsed = tracker.started.elapsed();
        histogram!("feed_run_ms").record(elapsed.as_secs_f64() * 1_000.0);
        info!(
            entries = entries.len(),
            incomplete,
            phase = phase.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline run finished"
        );
        RunReport {
            entries,
            stats: self.stats.snapshot(),
            phase,
            incomplete,
            timings,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    async fn run_source(
        &self,
        idx: usize,
        source: Arc<Source>,
        fetch_slots: &Semaphore,
        permits: &Arc<Semaphore>,
        tracker: &PhaseTracker,
    ) -> (usize, Vec<EnrichedEntry>) {
        let fetched = {
            let _slot = fetch_slots.acquire().await;
            self.fetcher.fetch(source.clone()).await
        };
        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                error!(source = %source.identifier, url = %e.url, attempts = e.attempts, error = %e, "feed fetch failed");
                self.stats.record_error();
                tracker.fetched();
                tracker.abandoned_after_fetch();
                return (idx, Vec::new());
            }
        };
        tracker.fetched();

        let parsed = parse_feed(&raw.bytes, &source);
        drop(raw);
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => {
                warn!(source = %source.identifier, error = %e, "malformed feed");
                self.stats.record_error();
                tracker.abandoned_after_fetch();
                return (idx, Vec::new());
            }
        };
        for skipped in &parsed.skipped {
            warn!(source = %source.identifier, error = %skipped, "feed item skipped");
            self.stats.record_error();
        }
        tracker.parsed();

        // JoinSet aborts whatever is still running if this future is dropped.
        let mut tasks = JoinSet::new();
        for (pos, entry) in parsed.entries.into_iter().enumerate() {
            let permits = permits.clone();
            let classifier = self.classifier.clone();
            let enricher = self.enricher.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let verdict = classifier.classify(&entry);
                if verdict.is_short {
                    return (
                        pos,
                        EntryOutcome::Short {
                            title: entry.title,
                            reason: verdict.reason,
                        },
                    );
                }
                let duration = duration_from_title(&entry.title).or(entry.duration_hint);
                (pos, EntryOutcome::Kept(enricher.enrich(&entry, duration)))
            });
        }

        let mut kept = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            kept.extend(self.settle_entry(&source, joined));
        }
        tracker.processed();

        kept.sort_by_key(|(pos, _)| *pos);
        info!(source = %source.identifier, kept = kept.len(), "source processed");
        (idx, kept.into_iter().map(|(_, e)| e).collect())
    }

    /// Count one finished entry task; a panicked task still counts as processed.
    fn settle_entry(
        &self,
        source: &Source,
        joined: Result<(usize, EntryOutcome), JoinError>,
    ) -> Option<(usize, EnrichedEntry)> {
        self.stats.record_entry();
        match joined {
            Ok((pos, EntryOutcome::Kept(e))) => Some((pos, e)),
            Ok((_, EntryOutcome::Short { title, reason })) => {
                self.stats.record_short();
                debug!(source = %source.identifier, title = %title, reason = %reason, "filtered short");
                None
            }
            Err(e) => {
                error!(source = %source.identifier, error = %e, "entry task failed");
                self.stats.record_error();
                None
            }
        }
    }
}
