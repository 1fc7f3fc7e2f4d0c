// src/enrich.rs
//! Turns a kept [`Entry`] into the [`EnrichedEntry`] that goes into the
//! output feed. Pure: the parsed entry is never touched.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::ingest::types::Entry;

/// Watch-link query param, short link, embed, legacy `/v/`, shorts path.
static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[?&]v=([A-Za-z0-9_-]{11})",
        r"youtu\.be/([A-Za-z0-9_-]{11})",
        r"embed/([A-Za-z0-9_-]{11})",
        r"/v/([A-Za-z0-9_-]{11})",
        r"/shorts/([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("video id regex"))
    .collect()
});

/// `[2:30]`, `[2m30s]` or `[45s]`: the title already shows a duration.
static DURATION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d{1,2}:\d{2}|\d+m\d{2}s|\d+s)\]").expect("duration marker regex")
});

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{video_id}/maxresdefault.jpg")
}

/// First matching URL shape wins.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn has_duration_marker(title: &str) -> bool {
    DURATION_MARKER.is_match(title)
}

pub fn format_duration(seconds: u32) -> String {
    let (m, s) = (seconds / 60, seconds % 60);
    if m > 0 {
        format!("[{m}m{s:02}s]")
    } else {
        format!("[{s}s]")
    }
}

/// Prefix the title with its duration unless it already shows one.
/// Applying it twice gives the same result as applying it once.
pub fn add_duration_to_title(title: &str, duration: Option<u32>, enabled: bool) -> String {
    match duration {
        Some(d) if enabled && d > 0 && !has_duration_marker(title) => {
            format!("{} {}", format_duration(d), title)
        }
        _ => title.to_string(),
    }
}

/// Key used to spot the same video across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Video(String),
    FeedId(String),
    Link(String),
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub include_duration: bool,
    pub feedly_enhanced: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            include_duration: true,
            feedly_enhanced: true,
        }
    }
}

impl From<&FilterConfig> for EnrichOptions {
    fn from(cfg: &FilterConfig) -> Self {
        Self {
            include_duration: cfg.include_duration,
            feedly_enhanced: cfg.feedly_enhanced,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEntry {
    pub title: String,
    pub display_title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary_html: String,
    pub content_html: String,
    pub author: String,
    pub raw_id: Option<String>,
    pub video_id: Option<String>,
    pub duration_seconds: Option<u32>,
    pub thumbnail_url: Option<String>,
    pub source: String,
}

impl EnrichedEntry {
    /// Video id, else the feed-provided id, else the link.
    pub fn identity_key(&self) -> IdentityKey {
        if let Some(v) = &self.video_id {
            return IdentityKey::Video(v.clone());
        }
        if let Some(id) = &self.raw_id {
            return IdentityKey::FeedId(id.clone());
        }
        IdentityKey::Link(self.link.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryEnricher {
    opts: EnrichOptions,
}

impl EntryEnricher {
    pub fn new(opts: EnrichOptions) -> Self {
        Self { opts }
    }

    pub fn enrich(&self, entry: &Entry, duration: Option<u32>) -> EnrichedEntry {
        let video_id = extract_video_id(&entry.link).or_else(|| entry.video_id_hint.clone());
        let display_title = add_duration_to_title(&entry.title, duration, self.opts.include_duration);
        let content_html = match &video_id {
            Some(id) => self.player_content(entry, id),
            None => entry.summary_html.clone(),
        };

        EnrichedEntry {
            title: entry.title.clone(),
            display_title,
            link: entry.link.clone(),
            published_at: entry.published_at,
            summary_html: entry.summary_html.clone(),
            content_html,
            author: entry.author.clone(),
            raw_id: entry.raw_id.clone(),
            thumbnail_url: video_id.as_deref().map(thumbnail_url),
            video_id,
            duration_seconds: duration,
            source: entry.source.identifier.clone(),
        }
    }

    /// Thumbnail linking to the video, followed by the original description.
    fn player_content(&self, entry: &Entry, video_id: &str) -> String {
        let link = html_escape::encode_double_quoted_attribute(&entry.link);
        let thumb = thumbnail_url(video_id);
        let summary = &entry.summary_html;

        if self.opts.feedly_enhanced {
            let alt = html_escape::encode_double_quoted_attribute(&entry.title);
            let description = if summary.is_empty() {
                String::new()
            } else {
                format!(
                    "\n<div style=\"margin-top:15px; padding:10px; background:#f9f9f9; border-left:3px solid #ff0000;\"><strong>Description:</strong><br/>{summary}</div>"
                )
            };
            format!(
                "<div class=\"youtube-video\">\n\
<p><a href=\"{link}\" target=\"_blank\" rel=\"noopener\">\
<img src=\"{thumb}\" alt=\"Watch: {alt}\" style=\"max-width:100%; height:auto; border:1px solid #ccc; border-radius:4px; display:block;\" /></a></p>\n\
<p style=\"text-align:center; margin:10px 0;\"><a href=\"{link}\" target=\"_blank\" rel=\"noopener\">Watch on YouTube</a></p>{description}\n\
</div>"
            )
        } else {
            let description = if summary.is_empty() {
                String::new()
            } else {
                format!("\n<div>{summary}</div>")
            };
            format!(
                "<p><a href=\"{link}\" target=\"_blank\" rel=\"noopener\">\
<img src=\"{thumb}\" alt=\"Video Thumbnail\" style=\"max-width:100%; height:auto;\" /></a></p>\n\
<p><a href=\"{link}\" target=\"_blank\" rel=\"noopener\">Watch this video on YouTube</a></p>{description}"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Source;
    use std::sync::Arc;

    fn entry(title: &str, link: &str) -> Entry {
        Entry {
            title: title.to_string(),
            link: link.to_string(),
            published_at: None,
            published_raw: None,
            summary_html: "desc".to_string(),
            author: "a".to_string(),
            raw_id: Some("yt:video:x".to_string()),
            video_id_hint: None,
            duration_hint: None,
            source: Arc::new(Source::channel("UC1")),
        }
    }

    #[test]
    fn video_id_shapes() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?feature=x&v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("https://example.org/post/1"), None);
    }

    #[test]
    fn title_prefix_formats() {
        assert_eq!(add_duration_to_title("Test Video", Some(150), true), "[2m30s] Test Video");
        assert_eq!(add_duration_to_title("Test Video", Some(45), true), "[45s] Test Video");
        assert_eq!(add_duration_to_title("Test Video", None, true), "Test Video");
        assert_eq!(add_duration_to_title("Test Video", Some(150), false), "Test Video");
        assert_eq!(
            add_duration_to_title("[3:00] Test Video", Some(180), true),
            "[3:00] Test Video"
        );
    }

    #[test]
    fn title_prefix_is_idempotent() {
        let once = add_duration_to_title("Deep dive", Some(605), true);
        let twice = add_duration_to_title(&once, Some(605), true);
        assert_eq!(once, "[10m05s] Deep dive");
        assert_eq!(once, twice);
    }

    #[test]
    fn enrich_fills_video_fields() {
        let e = entry("Deep dive", "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        let out = EntryEnricher::default().enrich(&e, Some(605));
        assert_eq!(out.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            out.thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
        assert_eq!(out.display_title, "[10m05s] Deep dive");
        assert_eq!(out.title, "Deep dive");
        assert!(out.content_html.contains("maxresdefault.jpg"));
        assert!(out.content_html.contains("desc"));
        assert_eq!(out.identity_key(), IdentityKey::Video("dQw4w9WgXcQ".into()));
    }

    #[test]
    fn identity_falls_back_to_feed_id_then_link() {
        let mut e = entry("Post", "https://example.org/post/1");
        let out = EntryEnricher::default().enrich(&e, None);
        assert!(out.video_id.is_none());
        assert!(out.thumbnail_url.is_none());
        assert_eq!(out.content_html, "desc");
        assert_eq!(out.identity_key(), IdentityKey::FeedId("yt:video:x".into()));

        e.raw_id = None;
        let out = EntryEnricher::default().enrich(&e, None);
        assert_eq!(
            out.identity_key(),
            IdentityKey::Link("https://example.org/post/1".into())
        );
    }

    #[test]
    fn feed_video_id_hint_is_the_fallback() {
        let mut e = entry("Post", "https://example.org/post/1");
        e.video_id_hint = Some("abcdefghijk".into());
        let out = EntryEnricher::default().enrich(&e, None);
        assert_eq!(out.video_id.as_deref(), Some("abcdefghijk"));
    }
}
