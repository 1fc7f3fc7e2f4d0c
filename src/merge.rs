// src/merge.rs
use std::collections::HashSet;

use crate::enrich::EnrichedEntry;

/// Flatten per-source batches (already in source order), keep the first
/// occurrence of each identity key, then order newest first.
///
/// The sort is stable and entries without a timestamp go last, so ties keep
/// the order in which they were scanned.
pub fn merge(batches: Vec<Vec<EnrichedEntry>>) -> Vec<EnrichedEntry> {
    let mut seen = HashSet::new();
    let mut out: Vec<EnrichedEntry> = batches
        .into_iter()
        .flatten()
        .filter(|e| seen.insert(e.identity_key()))
        .collect();

    // Some(_) > None, so a descending compare puts missing times last.
    out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    out
}
