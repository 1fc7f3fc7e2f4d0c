// src/api.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::atom::{self, FeedMeta};
use crate::config::FilterConfig;
use crate::ingest::types::SourceKind;
use crate::pipeline::Pipeline;

pub const INCOMPLETE_HEADER: &str = "x-feed-incomplete";
const FEED_ROUTES: [&str; 5] = ["/rss", "/feed", "/atom", "/rss.xml", "/feed.xml"];

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<FilterConfig>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: FilterConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/", get(dashboard))
        .route("/rss-discovery", get(discovery))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/debug", get(debug_info));
    for path in FEED_ROUTES {
        r = r.route(path, get(feed));
    }
    r.fallback(not_found)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/* ---- Feed ---- */

async fn feed(State(state): State<AppState>) -> Response {
    tracing::info!("processing feed request");
    let report = state.pipeline.run().await;
    let meta = FeedMeta {
        external_url: state.config.external_url.clone(),
    };
    let body = atom::render_atom(&report.entries, &meta, Utc::now());

    let mut resp = (
        [
            (header::CONTENT_TYPE, atom::CONTENT_TYPE),
            (header::CACHE_CONTROL, "public, max-age=900"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response();
    if report.incomplete {
        resp.headers_mut().insert(
            HeaderName::from_static(INCOMPLETE_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    resp
}

/* ---- JSON ---- */

fn configuration_summary(cfg: &FilterConfig) -> Value {
    json!({
        "channels_configured": cfg.channels.len(),
        "usernames_configured": cfg.usernames.len(),
        "max_short_duration": cfg.max_short_duration,
        "include_duration": cfg.include_duration,
        "strict_filter": cfg.strict_filter,
        "feedly_enhanced": cfg.feedly_enhanced,
        "debug_mode": cfg.debug,
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.pipeline.stats().snapshot();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": stats.uptime_seconds,
        "version": env!("CARGO_PKG_VERSION"),
        "configuration": configuration_summary(&state.config),
        "statistics": {
            "total_requests": stats.requests,
            "videos_processed": stats.videos_processed,
            "shorts_filtered": stats.shorts_filtered,
            "errors": stats.errors,
            "filter_efficiency": stats.filter_efficiency_percent,
        },
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let s = state.pipeline.stats().snapshot();
    Json(json!({
        "requests": s.requests,
        "videos_processed": s.videos_processed,
        "shorts_filtered": s.shorts_filtered,
        "errors": s.errors,
        "filter_efficiency_percent": s.filter_efficiency_percent,
        "uptime_seconds": s.uptime_seconds,
        "last_request": s.last_request,
        "configuration": configuration_summary(&state.config),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn debug_info(State(state): State<AppState>) -> Response {
    let cfg = &state.config;
    if !cfg.debug {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Debug mode not enabled" })),
        )
            .into_response();
    }

    let feed_urls: Vec<Value> = state
        .pipeline
        .sources()
        .iter()
        .map(|s| {
            json!({
                "type": match s.kind {
                    SourceKind::ChannelId => "channel_id",
                    SourceKind::Username => "username",
                },
                "identifier": s.identifier,
                "url": s.feed_url(),
            })
        })
        .collect();

    Json(json!({
        "environment_variables": {
            "YOUTUBE_CHANNELS": cfg.channels,
            "YOUTUBE_USERNAMES": cfg.usernames,
            "MAX_SHORT_DURATION": cfg.max_short_duration,
            "INCLUDE_DURATION": cfg.include_duration,
            "STRICT_FILTER": cfg.strict_filter,
            "FEEDLY_ENHANCED": cfg.feedly_enhanced,
            "DEBUG": cfg.debug,
            "RENDER_EXTERNAL_URL": cfg.external_url,
        },
        "fetch": {
            "timeout_secs": cfg.fetch.timeout_secs,
            "max_attempts": cfg.fetch.max_attempts,
            "backoff_base_ms": cfg.fetch.backoff_base_ms,
            "concurrency": cfg.fetch.concurrency,
            "entry_concurrency": cfg.entry_concurrency,
            "run_deadline_secs": cfg.run_deadline_secs,
        },
        "feed_urls": feed_urls,
        "statistics": state.pipeline.stats().snapshot(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn not_found(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut endpoints = vec!["/"];
    endpoints.extend(FEED_ROUTES);
    endpoints.extend(["/rss-discovery", "/health", "/stats"]);
    if state.config.debug {
        endpoints.push("/debug");
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "The requested endpoint does not exist",
            "available_endpoints": endpoints,
        })),
    )
}

/* ---- HTML ---- */

async fn dashboard(State(state): State<AppState>) -> Html<String> {
    let s = state.pipeline.stats().snapshot();
    let cfg = &state.config;
    let base = html_escape::encode_double_quoted_attribute(&cfg.external_url);
    let last = s
        .last_request
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>YouTube RSS Shorts Filter</title>
<link rel="alternate" type="application/atom+xml" title="{title}" href="{base}/rss">
</head>
<body>
<h1>YouTube RSS Shorts Filter</h1>
<h2>Statistics</h2>
<ul>
<li>Requests: {requests}</li>
<li>Videos processed: {processed}</li>
<li>Shorts filtered: {shorts}</li>
<li>Filter efficiency: {eff}%</li>
<li>Errors: {errors}</li>
<li>Uptime: {uptime}s</li>
<li>Last request: {last}</li>
</ul>
<h2>Configuration</h2>
<ul>
<li>Channels: {channels}</li>
<li>Usernames: {usernames}</li>
<li>Max short duration: {max}s</li>
<li>Duration in titles: {include}</li>
<li>Strict filter: {strict}</li>
</ul>
<h2>Feeds</h2>
<p><a href="{base}/rss">Atom feed</a> | <a href="{base}/rss-discovery">Feed discovery</a> | <a href="{base}/health">Health</a> | <a href="{base}/stats">Stats</a></p>
</body>
</html>
"#,
        title = atom::FEED_TITLE,
        requests = s.requests,
        processed = s.videos_processed,
        shorts = s.shorts_filtered,
        eff = s.filter_efficiency_percent,
        errors = s.errors,
        uptime = s.uptime_seconds,
        channels = cfg.channels.len(),
        usernames = cfg.usernames.len(),
        max = cfg.max_short_duration,
        include = cfg.include_duration,
        strict = cfg.strict_filter,
    ))
}

async fn discovery(State(state): State<AppState>) -> Html<String> {
    let base = html_escape::encode_double_quoted_attribute(&state.config.external_url);
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="alternate" type="application/rss+xml" title="{title}" href="{base}/rss">
<link rel="alternate" type="application/atom+xml" title="{title}" href="{base}/atom">
</head>
<body>
<h1>{title}</h1>
<p>Feed readers pick up the feed from this page automatically.</p>
<ul>
<li><a href="{base}/rss">{base}/rss</a></li>
<li><a href="{base}/atom">{base}/atom</a></li>
</ul>
<p><a href="{base}">Back to dashboard</a></p>
</body>
</html>
"#,
        title = atom::FEED_TITLE,
    ))
}
