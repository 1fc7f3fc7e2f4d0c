// tests/common/mod.rs
//
// Shared helpers for integration tests: an in-memory transport keyed by feed
// URL and a tiny Atom fixture builder.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use yt_shorts_filter::config::{FetchSettings, FilterConfig};
use yt_shorts_filter::error::TransportError;
use yt_shorts_filter::ingest::fetcher::FeedTransport;

#[derive(Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
    Stall,
    /// Answers with the body after the given delay.
    Delayed(Duration, String),
}

#[derive(Default)]
pub struct MockTransport {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, url: impl Into<String>, reply: Reply) -> Self {
        self.replies.insert(url.into(), reply);
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.replies.get(url) {
            Some(Reply::Body(b)) => Ok(b.clone().into_bytes()),
            Some(Reply::Status(s)) => Err(TransportError::Status { status: *s }),
            Some(Reply::Stall) => std::future::pending().await,
            Some(Reply::Delayed(d, b)) => {
                tokio::time::sleep(*d).await;
                Ok(b.clone().into_bytes())
            }
            None => Err(TransportError::Status { status: 404 }),
        }
    }
}

pub fn channel_url(id: &str) -> String {
    format!("https://www.youtube.com/feeds/videos.xml?channel_id={id}")
}

pub fn user_url(name: &str) -> String {
    format!("https://www.youtube.com/feeds/videos.xml?user={name}")
}

/// One fixture entry: (video id, title, published).
pub type Item<'a> = (&'a str, &'a str, &'a str);

pub fn atom_feed(author: &str, items: &[Item]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <title>fixture</title>
"#,
    );
    for (id, title, published) in items {
        out.push_str(&format!(
            r#" <entry>
  <id>yt:video:{id}</id>
  <yt:videoId>{id}</yt:videoId>
  <title>{title}</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v={id}"/>
  <author><name>{author}</name></author>
  <published>{published}</published>
  <media:group><media:description>about {id}</media:description></media:group>
 </entry>
"#
        ));
    }
    out.push_str("</feed>\n");
    out
}

/// Config with the given sources and fast retries.
pub fn config(channels: &[&str], usernames: &[&str]) -> FilterConfig {
    FilterConfig {
        channels: channels.iter().map(|s| s.to_string()).collect(),
        usernames: usernames.iter().map(|s| s.to_string()).collect(),
        fetch: FetchSettings {
            timeout_secs: 5,
            max_attempts: 3,
            backoff_base_ms: 1,
            concurrency: 5,
        },
        ..FilterConfig::default()
    }
}

pub fn shared(t: MockTransport) -> Arc<MockTransport> {
    Arc::new(t)
}
