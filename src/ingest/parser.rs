// src/ingest/parser.rs
//! Feed document parsing (Atom as served by YouTube, plus plain RSS 2.0).
//!
//! The document root is detected with a streaming reader, then every item is
//! cut out and decoded on its own, so one broken item never takes its
//! siblings down with it.

use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{EntryParseError, MalformedFeedError};
use crate::ingest::types::{Entry, Source};

/// Result of parsing one source document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub entries: Vec<Entry>,
    pub skipped: Vec<EntryParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Atom,
    Rss,
}

impl Dialect {
    fn item_tag(self) -> &'static [u8] {
        match self {
            Dialect::Atom => b"entry",
            Dialect::Rss => b"item",
        }
    }
}

/* ----------------------------
Item schemas (quick-xml serde)
---------------------------- */

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<Text>,
    #[serde(rename = "videoId", alias = "yt:videoId")]
    video_id: Option<Text>,
    #[serde(default)]
    title: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<Text>,
    updated: Option<Text>,
    #[serde(default)]
    summary: Vec<Text>,
    #[serde(default)]
    content: Vec<Text>,
    author: Option<Author>,
    #[serde(alias = "media:group")]
    group: Option<MediaGroup>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct MediaGroup {
    #[serde(alias = "media:description")]
    description: Option<Text>,
    #[serde(alias = "media:content")]
    content: Option<MediaContent>,
}

#[derive(Debug, Deserialize)]
struct MediaContent {
    #[serde(rename = "@duration")]
    duration: Option<String>,
}

/// Namespaced siblings share local names with the plain RSS elements
/// (`atom:link`, `itunes:author`, `media:description`), so every field is a
/// list and the first non-empty value wins.
#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    #[serde(default)]
    guid: Vec<Text>,
    #[serde(rename = "pubDate", default)]
    pub_date: Vec<Text>,
    #[serde(default)]
    description: Vec<Text>,
    #[serde(default)]
    author: Vec<Text>,
    #[serde(alias = "dc:creator", default)]
    creator: Vec<Text>,
    #[serde(rename = "duration", alias = "itunes:duration", default)]
    itunes_duration: Vec<Text>,
}

/* ----------------------------
Public API
---------------------------- */

/// Parse a raw feed payload into entries, in document order.
///
/// Fails only when the payload is not a feed document at all.
pub fn parse_feed(bytes: &[u8], source: &Arc<Source>) -> Result<ParsedFeed, MalformedFeedError> {
    let t0 = std::time::Instant::now();
    let text = String::from_utf8_lossy(bytes);
    let xml = scrub_html_entities_for_xml(&text);

    let (dialect, chunks, truncated) = split_items(&xml)?;

    let mut out = ParsedFeed::default();
    for (index, chunk) in chunks.iter().enumerate() {
        let decoded = match dialect {
            Dialect::Atom => decode_atom(index, chunk, source),
            Dialect::Rss => decode_rss(index, chunk, source),
        };
        match decoded {
            Ok(entry) => out.entries.push(entry),
            Err(e) => out.skipped.push(e),
        }
    }
    if let Some(reason) = truncated {
        out.skipped.push(EntryParseError::Truncated {
            read: chunks.len(),
            reason,
        });
    }

    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    tracing::debug!(
        source = %source.identifier,
        entries = out.entries.len(),
        skipped = out.skipped.len(),
        "parsed feed"
    );
    Ok(out)
}

/// Find the root element and cut every item element out as a standalone
/// document. Returns the chunks plus a reason if the scan stopped early.
fn split_items(xml: &str) -> Result<(Dialect, Vec<String>, Option<String>), MalformedFeedError> {
    let mut reader = Reader::from_str(xml);
    let mut dialect: Option<Dialect> = None;
    let mut chunks = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => match dialect {
                Some(d) => return Ok((d, chunks, Some(e.to_string()))),
                None => return Err(MalformedFeedError::new(e.to_string())),
            },
        };

        match event {
            Event::Start(e) | Event::Empty(e) if dialect.is_none() => {
                let root = e.local_name();
                dialect = match root.as_ref() {
                    b"feed" => Some(Dialect::Atom),
                    b"rss" | b"RDF" => Some(Dialect::Rss),
                    other => {
                        return Err(MalformedFeedError::new(format!(
                            "unexpected root element <{}>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                };
            }
            Event::Start(e) => {
                let Some(d) = dialect else { continue };
                if e.local_name().as_ref() != d.item_tag() {
                    continue;
                }
                let name = e.name().as_ref().to_vec();
                match reader.read_text(QName(&name)) {
                    Ok(inner) => chunks.push(wrap_item(d, &inner)),
                    Err(err) => return Ok((d, chunks, Some(err.to_string()))),
                }
            }
            Event::Empty(e) => {
                // <entry/> carries nothing; keep its slot so it is reported.
                if let Some(d) = dialect {
                    if e.local_name().as_ref() == d.item_tag() {
                        chunks.push(wrap_item(d, ""));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match dialect {
        Some(d) => Ok((d, chunks, None)),
        None => Err(MalformedFeedError::new("no root element")),
    }
}

fn wrap_item(d: Dialect, inner: &str) -> String {
    let tag = std::str::from_utf8(d.item_tag()).unwrap_or("item");
    format!("<{tag}>{inner}</{tag}>")
}

fn decode_atom(index: usize, chunk: &str, source: &Arc<Source>) -> Result<Entry, EntryParseError> {
    let item: AtomEntry = quick_xml::de::from_str(chunk).map_err(|e| EntryParseError::Invalid {
        index,
        reason: e.to_string(),
    })?;

    let link = item
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .and_then(|l| l.href.clone())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(EntryParseError::MissingLink { index })?;

    let published_raw = non_empty(item.published).or_else(|| non_empty(item.updated));
    let media_description = item
        .group
        .as_ref()
        .and_then(|g| g.description.as_ref())
        .map(|t| t.value.trim().to_string())
        .filter(|s| !s.is_empty());
    let summary_html = first_non_empty(item.summary)
        .or_else(|| first_non_empty(item.content))
        .or(media_description)
        .unwrap_or_default();
    let duration_hint = item
        .group
        .and_then(|g| g.content)
        .and_then(|c| c.duration)
        .and_then(|d| parse_duration_secs(&d));

    Ok(Entry {
        title: first_non_empty(item.title).unwrap_or_else(|| "Untitled".to_string()),
        link,
        published_at: published_raw.as_deref().and_then(parse_timestamp),
        published_raw,
        summary_html,
        author: item.author.and_then(|a| non_empty(a.name)).unwrap_or_default(),
        raw_id: non_empty(item.id),
        video_id_hint: non_empty(item.video_id),
        duration_hint,
        source: Arc::clone(source),
    })
}

fn decode_rss(index: usize, chunk: &str, source: &Arc<Source>) -> Result<Entry, EntryParseError> {
    let item: RssItem = quick_xml::de::from_str(chunk).map_err(|e| EntryParseError::Invalid {
        index,
        reason: e.to_string(),
    })?;

    let link = first_non_empty(item.link).ok_or(EntryParseError::MissingLink { index })?;
    let published_raw = first_non_empty(item.pub_date);

    Ok(Entry {
        title: first_non_empty(item.title).unwrap_or_else(|| "Untitled".to_string()),
        link,
        published_at: published_raw.as_deref().and_then(parse_timestamp),
        published_raw,
        summary_html: first_non_empty(item.description).unwrap_or_default(),
        author: first_non_empty(item.creator)
            .or_else(|| first_non_empty(item.author))
            .unwrap_or_default(),
        raw_id: first_non_empty(item.guid),
        video_id_hint: None,
        duration_hint: first_non_empty(item.itunes_duration)
            .and_then(|d| parse_duration_secs(&d)),
        source: Arc::clone(source),
    })
}

fn non_empty(t: Option<Text>) -> Option<String> {
    t.map(|t| t.value.trim().to_string()).filter(|s| !s.is_empty())
}

fn first_non_empty(v: Vec<Text>) -> Option<String> {
    v.into_iter().find_map(|t| non_empty(Some(t)))
}

/// RFC 3339 (Atom) first, RFC 2822 (RSS) second.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Accepts plain seconds (`"95"`) or clock form (`"1:35"`, `"1:02:03"`).
fn parse_duration_secs(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total: u32 = 0;
    for part in s.split(':') {
        let n: u32 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(n)?;
    }
    Some(total)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
