// src/ingest/mod.rs
//! Getting feeds in: source URLs, the retrying fetcher and the Atom/RSS parser.

pub mod fetcher;
pub mod parser;
pub mod types;
