// src/classify.rs
//! Shorts detection.
//!
//! Signals are kept as an explicit ordered list and evaluated short-circuit:
//! the first signal that fires decides, nothing is combined or scored.
//!
//! 1. keywords (`#shorts`, "short video", ...) in title or summary
//! 2. `[M:SS]` duration marker in the title at or below the threshold
//! 3. strict-mode wording heuristics (only when enabled)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::ingest::types::Entry;

pub const REASON_NOT_SHORT: &str = "not detected as short";
pub const REASON_KEYWORDS: &str = "contains shorts keywords";
pub const REASON_STRICT: &str = "strict mode pattern match";

static SHORTS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)#shorts?|#short|#youtubeshorts|shorts|short video").expect("keyword regex")
});

/// `[M:SS]` / `[MM:SS]` anywhere in the title.
static TITLE_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,2}):(\d{2})\]").expect("title duration regex"));

static STRICT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(quick|fast|rapid|instant)\b",
        r"(?i)\b(tip|hack|trick)\b",
        r"(?i)\b(\d+\s*sec(ond)?s?)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("strict regex"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_short: bool,
    pub reason: String,
}

impl Classification {
    fn short(reason: impl Into<String>) -> Self {
        Self {
            is_short: true,
            reason: reason.into(),
        }
    }

    fn keep() -> Self {
        Self {
            is_short: false,
            reason: REASON_NOT_SHORT.to_string(),
        }
    }
}

/// Decode a `[M:SS]` marker from a title into seconds.
///
/// Minutes 0–99, seconds 00–59. Anything else is simply absent.
pub fn duration_from_title(title: &str) -> Option<u32> {
    let caps = TITLE_DURATION.captures(title)?;
    let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
    let seconds: u32 = caps.get(2)?.as_str().parse().ok()?;
    if seconds > 59 {
        return None;
    }
    Some(minutes * 60 + seconds)
}

/// One detection rule. Order in [`ShortClassifier::signals`] is precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Keywords,
    TitleDuration { max_seconds: u32 },
    StrictPatterns,
}

impl Signal {
    /// `Some(reason)` when this signal marks the entry as a short.
    pub fn evaluate(&self, title: &str, summary: &str) -> Option<String> {
        match self {
            Signal::Keywords => (SHORTS_KEYWORDS.is_match(title) || SHORTS_KEYWORDS.is_match(summary))
                .then(|| REASON_KEYWORDS.to_string()),
            Signal::TitleDuration { max_seconds } => duration_from_title(title)
                .filter(|secs| secs <= max_seconds)
                .map(|secs| format!("duration from title: {secs}s")),
            Signal::StrictPatterns => STRICT_PATTERNS
                .iter()
                .any(|re| re.is_match(title) || re.is_match(summary))
                .then(|| REASON_STRICT.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShortClassifier {
    signals: Vec<Signal>,
}

impl ShortClassifier {
    pub fn new(max_short_duration: u32, strict: bool) -> Self {
        let mut signals = vec![
            Signal::Keywords,
            Signal::TitleDuration {
                max_seconds: max_short_duration,
            },
        ];
        if strict {
            signals.push(Signal::StrictPatterns);
        }
        Self { signals }
    }

    pub fn from_config(cfg: &FilterConfig) -> Self {
        Self::new(cfg.max_short_duration, cfg.strict_filter)
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn classify(&self, entry: &Entry) -> Classification {
        self.classify_text(&entry.title, &entry.summary_html)
    }

    pub fn classify_text(&self, title: &str, summary: &str) -> Classification {
        self.signals
            .iter()
            .find_map(|s| s.evaluate(title, summary))
            .map(Classification::short)
            .unwrap_or_else(Classification::keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_decoding() {
        assert_eq!(duration_from_title("[2:30] Test Video"), Some(150));
        assert_eq!(duration_from_title("[0:45] Quick Video"), Some(45));
        assert_eq!(duration_from_title("[10:05] Long Video"), Some(605));
        assert_eq!(duration_from_title("Test Video"), None);
        assert_eq!(duration_from_title("2:30 Test Video"), None);
        assert_eq!(duration_from_title("[invalid] Test Video"), None);
        assert_eq!(duration_from_title("[1:75] Bad seconds"), None);
    }

    #[test]
    fn keywords_win_over_everything_else() {
        let c = ShortClassifier::new(90, true);
        let r = c.classify_text("Amazing #SHORTS compilation [9:00]", "");
        assert!(r.is_short);
        assert_eq!(r.reason, REASON_KEYWORDS);

        let r = c.classify_text("Plain title", "a Short Video about cats");
        assert!(r.is_short);
        assert!(r.reason.contains("keywords"));
    }

    #[test]
    fn title_duration_respects_threshold() {
        let c = ShortClassifier::new(90, false);
        let r = c.classify_text("[0:45] Quick Video", "");
        assert!(r.is_short);
        assert!(r.reason.contains("45"));

        let r = c.classify_text("[2:30] Test Video", "");
        assert!(!r.is_short);
        let r = c.classify_text("[5:30] Detailed", "In-depth tutorial");
        assert!(!r.is_short);
        assert_eq!(r.reason, REASON_NOT_SHORT);
    }

    #[test]
    fn strict_patterns_only_when_enabled() {
        let relaxed = ShortClassifier::new(90, false);
        let strict = ShortClassifier::new(90, true);
        let title = "One kitchen hack you need";
        assert!(!relaxed.classify_text(title, "").is_short);
        let r = strict.classify_text(title, "");
        assert!(r.is_short);
        assert_eq!(r.reason, REASON_STRICT);
        assert!(strict.classify_text("Explained in 30 seconds", "").is_short);
        assert_eq!(relaxed.signals().len(), 2);
        assert_eq!(strict.signals().len(), 3);
    }
}
