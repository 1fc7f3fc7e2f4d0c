// src/config/filter.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::types::Source;

pub const ENV_CONFIG_PATH: &str = "FILTER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/filter.toml";

fn default_max_short_duration() -> u32 {
    90
}
fn default_true() -> bool {
    true
}
fn default_external_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1_000
}
fn default_fetch_concurrency() -> usize {
    5
}
fn default_entry_concurrency() -> usize {
    10
}
fn default_run_deadline_secs() -> u64 {
    60
}

/// Everything the service reads at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub usernames: Vec<String>,
    /// Titles carrying `[M:SS]` at or below this many seconds are shorts.
    #[serde(default = "default_max_short_duration")]
    pub max_short_duration: u32,
    #[serde(default = "default_true")]
    pub include_duration: bool,
    #[serde(default)]
    pub strict_filter: bool,
    #[serde(default = "default_true")]
    pub feedly_enhanced: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_external_url")]
    pub external_url: String,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default = "default_entry_concurrency")]
    pub entry_concurrency: usize,
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            max_attempts: default_fetch_attempts(),
            backoff_base_ms: default_backoff_ms(),
            concurrency: default_fetch_concurrency(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            usernames: Vec::new(),
            max_short_duration: default_max_short_duration(),
            include_duration: true,
            strict_filter: false,
            feedly_enhanced: true,
            debug: false,
            external_url: default_external_url(),
            fetch: FetchSettings::default(),
            entry_concurrency: default_entry_concurrency(),
            run_deadline_secs: default_run_deadline_secs(),
        }
    }
}

impl FilterConfig {
    /// Load a TOML config file. Missing keys fall back to defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading filter config from {}", path.display()))?;
        let cfg: FilterConfig = toml::from_str(&content)
            .with_context(|| format!("parsing filter config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Resolve config using env var + fallbacks, then apply env overrides:
    /// 1) $FILTER_CONFIG_PATH
    /// 2) config/filter.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if fallback.exists() {
                Self::load_from_file(&fallback)?
            } else {
                Self::default()
            }
        };
        Ok(base.with_env_overrides(|k| std::env::var(k).ok()))
    }

    /// Apply the deployment env vars on top of `self`. `lookup` is injected so
    /// tests don't have to touch the process environment.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("YOUTUBE_CHANNELS") {
            self.channels = split_list(&v);
        }
        if let Some(v) = lookup("YOUTUBE_USERNAMES") {
            self.usernames = split_list(&v);
        }
        if let Some(v) = lookup("MAX_SHORT_DURATION") {
            override_num("MAX_SHORT_DURATION", &v, &mut self.max_short_duration);
        }
        if let Some(v) = lookup("INCLUDE_DURATION") {
            self.include_duration = parse_flag(&v);
        }
        if let Some(v) = lookup("STRICT_FILTER") {
            self.strict_filter = parse_flag(&v);
        }
        if let Some(v) = lookup("FEEDLY_ENHANCED") {
            self.feedly_enhanced = parse_flag(&v);
        }
        if let Some(v) = lookup("DEBUG") {
            self.debug = parse_flag(&v);
        }
        if let Some(v) = lookup("RENDER_EXTERNAL_URL") {
            self.external_url = v;
        }
        if let Some(v) = lookup("FETCH_TIMEOUT_SECS") {
            override_num("FETCH_TIMEOUT_SECS", &v, &mut self.fetch.timeout_secs);
        }
        if let Some(v) = lookup("FETCH_RETRIES") {
            override_num("FETCH_RETRIES", &v, &mut self.fetch.max_attempts);
        }
        if let Some(v) = lookup("FETCH_BACKOFF_MS") {
            override_num("FETCH_BACKOFF_MS", &v, &mut self.fetch.backoff_base_ms);
        }
        if let Some(v) = lookup("FETCH_CONCURRENCY") {
            override_num("FETCH_CONCURRENCY", &v, &mut self.fetch.concurrency);
        }
        if let Some(v) = lookup("ENTRY_CONCURRENCY") {
            override_num("ENTRY_CONCURRENCY", &v, &mut self.entry_concurrency);
        }
        if let Some(v) = lookup("RUN_DEADLINE_SECS") {
            override_num("RUN_DEADLINE_SECS", &v, &mut self.run_deadline_secs);
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.channels = clean_list(self.channels);
        self.usernames = clean_list(self.usernames);
        self.fetch.max_attempts = self.fetch.max_attempts.max(1);
        self.fetch.concurrency = self.fetch.concurrency.max(1);
        self.entry_concurrency = self.entry_concurrency.max(1);

        let url = self.external_url.trim().trim_end_matches('/').to_string();
        self.external_url = if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("https://{url}")
        };
        self
    }

    /// Configured sources in a stable order: channels first, then usernames.
    pub fn sources(&self) -> Vec<Source> {
        self.channels
            .iter()
            .map(Source::channel)
            .chain(self.usernames.iter().map(Source::username))
            .collect()
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn override_num<T: std::str::FromStr>(key: &str, raw: &str, slot: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = raw, "ignoring unparsable numeric override"),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(str::to_string).collect()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;
    use std::collections::HashMap;
    use std::{env, fs};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_deployed_service() {
        let cfg = FilterConfig::default();
        assert_eq!(cfg.max_short_duration, 90);
        assert!(cfg.include_duration);
        assert!(!cfg.strict_filter);
        assert_eq!(cfg.fetch.max_attempts, 3);
        assert_eq!(cfg.fetch.concurrency, 5);
        assert_eq!(cfg.entry_concurrency, 10);
    }

    #[test]
    fn env_overrides_trim_lists_and_parse_flags() {
        let cfg = FilterConfig::default().with_env_overrides(lookup_from(&[
            ("YOUTUBE_CHANNELS", " UC1 ,, UC2"),
            ("YOUTUBE_USERNAMES", "alice"),
            ("STRICT_FILTER", "TRUE"),
            ("INCLUDE_DURATION", "false"),
            ("MAX_SHORT_DURATION", "60"),
            ("RENDER_EXTERNAL_URL", "feeds.example.org/"),
        ]));
        assert_eq!(cfg.channels, vec!["UC1".to_string(), "UC2".to_string()]);
        assert!(cfg.strict_filter);
        assert!(!cfg.include_duration);
        assert_eq!(cfg.max_short_duration, 60);
        assert_eq!(cfg.external_url, "https://feeds.example.org");

        let sources = cfg.sources();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].kind, SourceKind::ChannelId);
        assert_eq!(sources[2].kind, SourceKind::Username);
    }

    #[test]
    fn bad_numbers_are_ignored_and_floors_apply() {
        let cfg = FilterConfig::default().with_env_overrides(lookup_from(&[
            ("MAX_SHORT_DURATION", "ninety"),
            ("FETCH_CONCURRENCY", "0"),
            ("FETCH_RETRIES", "0"),
        ]));
        assert_eq!(cfg.max_short_duration, 90);
        assert_eq!(cfg.fetch.concurrency, 1);
        assert_eq!(cfg.fetch.max_attempts, 1);
    }

    #[test]
    fn toml_file_fills_missing_keys_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("filter.toml");
        fs::write(
            &p,
            r#"
channels = ["UCabc"]
strict_filter = true

[fetch]
max_attempts = 5
"#,
        )
        .unwrap();
        let cfg = FilterConfig::load_from_file(&p).unwrap();
        assert_eq!(cfg.channels, vec!["UCabc".to_string()]);
        assert!(cfg.strict_filter);
        assert_eq!(cfg.fetch.max_attempts, 5);
        assert_eq!(cfg.fetch.timeout_secs, 10);
        assert_eq!(cfg.max_short_duration, 90);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var("YOUTUBE_CHANNELS");

        // no file in CWD -> defaults
        let cfg = FilterConfig::load_default().unwrap();
        assert!(cfg.channels.is_empty());

        let p = tmp.path().join("custom.toml");
        fs::write(&p, r#"usernames = ["bob"]"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = FilterConfig::load_default().unwrap();
        assert_eq!(cfg.usernames, vec!["bob".to_string()]);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(FilterConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
