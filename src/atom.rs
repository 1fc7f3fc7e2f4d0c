// src/atom.rs
//! Atom 1.0 rendering of a merged run.

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::borrow::Cow;
use std::fmt::Write as _;

use crate::enrich::EnrichedEntry;

pub const CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";
pub const FEED_TITLE: &str = "YouTube RSS (No Shorts)";

/// Where the feed is served from; used for self links and the feed id.
#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub external_url: String,
}

/// Stable `urn:uuid:` style id derived from the external URL.
pub fn feed_id(external_url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(external_url.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for b in digest.iter().take(16) {
        let _ = write!(&mut hex, "{:02x}", b);
    }
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Drops code points XML 1.0 cannot carry even when escaped.
fn xml_chars(s: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c, '\t' | '\n' | '\r') || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}')
    }
    if s.chars().all(allowed) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|&c| allowed(c)).collect())
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn render_atom(entries: &[EnrichedEntry], meta: &FeedMeta, now: DateTime<Utc>) -> String {
    let base = meta.external_url.trim_end_matches('/');
    let now_s = rfc3339(now);
    let mut out = String::with_capacity(1024 + entries.len() * 1024);

    let _ = write!(
        out,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/" xml:lang="en">
  <title>{title}</title>
  <subtitle>Filtered YouTube feed without Shorts</subtitle>
  <id>{id}</id>
  <link href="{base}/rss" rel="self" type="application/atom+xml"/>
  <link href="{base}" rel="alternate" type="text/html"/>
  <updated>{now_s}</updated>
  <generator uri="{base}" version="1.0">YouTube RSS Shorts Filter</generator>
  <author>
    <name>YouTube RSS Filter</name>
    <uri>{base_text}</uri>
  </author>
  <category term="youtube" label="YouTube"/>
  <category term="video" label="Video"/>
"#,
        title = FEED_TITLE,
        id = feed_id(&meta.external_url),
        base = attr(base),
        base_text = text(base),
    );

    for e in entries {
        let id = e.raw_id.as_deref().unwrap_or(&e.link);
        let title = if e.display_title.trim().is_empty() {
            "Untitled"
        } else {
            e.display_title.as_str()
        };
        let author = if e.author.trim().is_empty() {
            "Unknown"
        } else {
            e.author.as_str()
        };
        let stamp = e.published_at.map(rfc3339).unwrap_or_else(|| now_s.clone());

        let _ = write!(
            out,
            r#"  <entry>
    <title>{title}</title>
    <id>{id}</id>
    <link href="{link}" rel="alternate" type="text/html"/>
    <published>{stamp}</published>
    <updated>{stamp}</updated>
    <summary type="html">{summary}</summary>
    <author>
      <name>{author}</name>
    </author>
"#,
            title = text(&xml_chars(title)),
            id = text(&xml_chars(id)),
            link = attr(&xml_chars(&e.link)),
            summary = text(&xml_chars(&e.content_html)),
            author = text(&xml_chars(author)),
        );
        if let Some(thumb) = &e.thumbnail_url {
            let _ = writeln!(out, r#"    <media:thumbnail url="{}"/>"#, attr(thumb));
        }
        out.push_str("    <category term=\"video\" label=\"Video\"/>\n  </entry>\n");
    }

    out.push_str("</feed>\n");
    out
}
