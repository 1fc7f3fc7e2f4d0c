// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod atom;
pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod stats;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::pipeline::{Pipeline, PipelinePhase, RunReport};
