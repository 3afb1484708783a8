//! Core data models used throughout the bookshelf.
//!
//! A [`Resource`] is created by a search backend, tagged with its topic by the
//! orchestrator, and enriched in place by the curation pipeline before it is
//! cached and served.

use serde::{Deserialize, Serialize};

/// Maximum length of display strings (title, snippet, summary).
pub const DISPLAY_MAX_CHARS: usize = 500;

/// Classification of a resource by where it is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Article,
    Video,
    Book,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Video => "video",
            ContentType::Book => "book",
        }
    }
}

/// One search hit flowing through the pipeline.
///
/// Every field has a serde default so that payloads written by older
/// processes (or by hand) still load from the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    /// Legacy alias of `content_type`, assigned by the search backend.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Set only by [`Resource::placeholder`]; never serialized.
    #[serde(skip)]
    failed: bool,
}

impl Resource {
    /// A fresh, ranked search hit. Score decays by 0.1 per rank and is not
    /// clamped, so ranks past 10 go negative.
    pub fn ranked(title: String, url: String, snippet: String, rank: usize, kind: ContentType) -> Self {
        Self {
            title,
            url,
            snippet,
            score: 1.0 - (rank as f64) * 0.1,
            topic: None,
            relevance: None,
            recency: None,
            authority: None,
            content_type: None,
            kind: Some(kind),
            summary: None,
            failed: false,
        }
    }

    /// Stand-in result returned when a search backend fails.
    pub fn placeholder(message: impl Into<String>, kind: ContentType) -> Self {
        Self {
            title: "Error".to_string(),
            url: String::new(),
            snippet: message.into(),
            score: 0.0,
            topic: None,
            relevance: None,
            recency: None,
            authority: None,
            content_type: None,
            kind: Some(kind),
            summary: None,
            failed: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.failed
    }

    /// Whether this resource passes a `content_type` filter. Either the
    /// curated `content_type` or the legacy `type` may match.
    pub fn matches_type(&self, filter: &str) -> bool {
        self.content_type.map(|c| c.as_str()) == Some(filter)
            || self.kind.map(|c| c.as_str()) == Some(filter)
    }
}

/// Query cache occupancy, reported by `/vibe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_queries: usize,
    pub max: usize,
}

/// Print a numbered resource listing for the CLI.
pub fn print_resources(resources: &[Resource]) {
    if resources.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in resources.iter().enumerate() {
        let kind = r
            .content_type
            .or(r.kind)
            .map(|c| c.as_str())
            .unwrap_or("article");
        println!("{}. [{:.2}] {} / {}", i + 1, r.score, kind, r.title);
        if let Some(ref topic) = r.topic {
            println!("    topic: {}", topic);
        }
        if !r.url.is_empty() {
            println!("    url: {}", r.url);
        }
        let excerpt = r.summary.as_deref().unwrap_or(&r.snippet);
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!();
    }
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
