// src/error.rs
//! Error taxonomy for the feed pipeline.
//!
//! None of these escape `Pipeline::run`: each is caught where it happens,
//! logged, and counted once in `RunStats::errors`.

use std::time::Duration;
use thiserror::Error;

/// One failed request against an upstream feed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from upstream")]
    Status { status: u16 },

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Classify a reqwest failure; `timeout` is the budget the request ran under.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            return TransportError::Timeout(timeout);
        }
        match e.status() {
            Some(s) => TransportError::Status {
                status: s.as_u16(),
            },
            None => TransportError::Request(e.to_string()),
        }
    }
}

/// A source stayed unreachable after every attempt.
#[derive(Debug, Error)]
#[error("fetching {url} failed after {attempts} attempt(s): {last}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub last: TransportError,
}

/// The payload could not be read as a feed document at all.
#[derive(Debug, Error)]
#[error("malformed feed: {reason}")]
pub struct MalformedFeedError {
    pub reason: String,
}

impl MalformedFeedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single item was dropped; its siblings are unaffected.
#[derive(Debug, Error)]
pub enum EntryParseError {
    #[error("item #{index} has no link")]
    MissingLink { index: usize },

    #[error("item #{index} could not be decoded: {reason}")]
    Invalid { index: usize, reason: String },

    #[error("document truncated after {read} item(s): {reason}")]
    Truncated { read: usize, reason: String },
}
