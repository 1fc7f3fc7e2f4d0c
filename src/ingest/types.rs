// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ChannelId,
    Username,
}

/// One configured feed origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub kind: SourceKind,
    pub identifier: String,
}

impl Source {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::ChannelId,
            identifier: id.into(),
        }
    }

    pub fn username(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Username,
            identifier: name.into(),
        }
    }

    /// Feed URL for this source. Does not check reachability.
    pub fn feed_url(&self) -> String {
        match self.kind {
            SourceKind::ChannelId => format!("{FEED_BASE}?channel_id={}", self.identifier),
            SourceKind::Username => format!("{FEED_BASE}?user={}", self.identifier),
        }
    }
}

/// Raw bytes of one successful fetch; dropped right after parsing.
#[derive(Debug)]
pub struct RawFeed {
    pub source: Arc<Source>,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// One normalized item from a source feed.
#[derive(Debug, Clone)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Timestamp text as it appeared in the feed.
    pub published_raw: Option<String>,
    pub summary_html: String,
    pub author: String,
    pub raw_id: Option<String>,
    /// `yt:videoId` when the feed carries it.
    pub video_id_hint: Option<String>,
    /// Seconds from `media:content@duration` / `itunes:duration`.
    pub duration_hint: Option<u32>,
    pub source: Arc<Source>,
}
