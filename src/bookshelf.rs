//! Bookshelf orchestration.
//!
//! A bookshelf is the curated resource list for a set of topics. Building
//! one goes through every layer in turn:
//!
//! ```text
//! result cache ──hit──▶ filter ──▶ caller
//!      │ miss / refresh
//!      ▼
//! search (per topic, sequential, query cache) ──▶ tag topic ──▶ curate
//!      ──▶ result cache (unfiltered) ──▶ filter ──▶ caller
//! ```
//!
//! The content-type filter is applied to the returned copy only. The cache
//! always holds the full curated list, so a narrow first request never
//! hides results from a later broader one.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::curate::Curator;
use crate::models::{print_resources, truncate_chars, CacheStats, Resource};
use crate::result_cache::ResultCache;
use crate::search::SearchProvider;

/// Topics warmed by [`Bookshelf::prewarm`] when none are given.
pub const DEMO_TOPICS: &[&str] = &[
    "binary search",
    "sorting algorithms",
    "recursion",
    "arrays",
    "linked lists",
];

/// Per-topic count used when pre-warming the demo topics.
pub const DEMO_PER_TOPIC: usize = 3;

const PREWARM_TIMEOUT_SECS: u64 = 120;

pub struct Bookshelf {
    search: SearchProvider,
    results: ResultCache,
    curator: Curator,
}

impl Bookshelf {
    pub fn new(search: SearchProvider, results: ResultCache, curator: Curator) -> Self {
        Self {
            search,
            results,
            curator,
        }
    }

    /// Wire every component from config and the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let search = SearchProvider::from_config(&config.search)?;
        let results = ResultCache::from_config(&config.result_cache);
        let curator = Curator::from_config(&config.curation);
        info!(
            backend = search.backend_name(),
            result_cache = results.is_available(),
            curation = curator.has_generator(),
            "bookshelf ready"
        );
        Ok(Self::new(search, results, curator))
    }

    pub fn search(&self) -> &SearchProvider {
        &self.search
    }

    pub fn backend_name(&self) -> &'static str {
        self.search.backend_name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.search.cache_stats()
    }

    /// Curated resources for `topics`, optionally narrowed to one content type.
    ///
    /// With `skip_cache` both caches are bypassed for reads and writes of
    /// search results, though the fresh curated list still replaces the
    /// result-cache entry.
    pub async fn get_resources(
        &self,
        topics: &[String],
        per_topic: usize,
        skip_cache: bool,
        content_type: Option<&str>,
    ) -> Vec<Resource> {
        if !skip_cache && !topics.is_empty() {
            if let Some(cached) = self.results.get(topics, per_topic).await {
                debug!(topics = topics.len(), "bookshelf served from result cache");
                return filter_by_type(cached, content_type);
            }
        }

        let mut raw = Vec::new();
        for topic in topics.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let hits = self.search.search(topic, per_topic, skip_cache).await;
            raw.extend(hits.into_iter().map(|mut r| {
                if !r.is_placeholder() {
                    r.topic = Some(topic.to_string());
                }
                r
            }));
        }

        let curated = self.curator.curate(raw, true, true).await;

        if !topics.is_empty() && !curated.is_empty() {
            self.results.put(topics, per_topic, &curated).await;
        }

        filter_by_type(curated, content_type)
    }

    /// Populate the caches for `topics`, or for [`DEMO_TOPICS`] when none are
    /// given, and return the curated list.
    pub async fn prewarm(&self, topics: Option<Vec<String>>, per_topic: usize) -> Vec<Resource> {
        let (topics, per_topic) = match topics {
            Some(t) if !t.is_empty() => (t, per_topic),
            _ => (
                DEMO_TOPICS.iter().map(|t| t.to_string()).collect(),
                DEMO_PER_TOPIC,
            ),
        };
        let resources = self.get_resources(&topics, per_topic, false, None).await;
        info!(topics = topics.len(), per_topic, count = resources.len(), "prewarmed");
        resources
    }
}

/// Status line for the active search backend.
pub fn vibe_message(backend: &str) -> &'static str {
    match backend {
        "tavily" => "Tavily is powering the bookshelf.",
        "exa" => "Exa is powering the bookshelf. Cache is saving your quota.",
        _ => "DuckDuckGo fallback is active. Set TAVILY_API_KEY or EXA_API_KEY for enhanced search.",
    }
}

/// CLI entry point for `shelf bookshelf`.
pub async fn run_bookshelf(
    config: &Config,
    topics: &[String],
    per_topic: usize,
    content_type: Option<&str>,
    refresh: bool,
) -> Result<()> {
    let shelf = Bookshelf::from_config(config)?;
    let resources = shelf
        .get_resources(topics, per_topic, refresh, content_type)
        .await;
    print_resources(&resources);
    Ok(())
}

/// CLI entry point for `shelf prewarm`. With `remote`, asks a running server
/// to warm its caches instead of warming in-process.
pub async fn run_prewarm(
    config: &Config,
    topics: Vec<String>,
    per_topic: usize,
    remote: Option<&str>,
) -> Result<()> {
    let topics = if topics.is_empty() { None } else { Some(topics) };
    let shown: Vec<String> = match topics {
        Some(ref t) => t.clone(),
        None => DEMO_TOPICS.iter().map(|t| t.to_string()).collect(),
    };
    println!("Prewarming bookshelf cache for topics: {}", shown.join(", "));

    let resources = match remote {
        Some(base) => prewarm_remote(base, &shown, topics.map_or(DEMO_PER_TOPIC, |_| per_topic)).await?,
        None => Bookshelf::from_config(config)?.prewarm(topics, per_topic).await,
    };

    println!("OK: {} resources cached.", resources.len());
    if let Some(first) = resources.first() {
        println!("Sample: {} ...", truncate_chars(&first.title, 60));
    }
    Ok(())
}

async fn prewarm_remote(base: &str, topics: &[String], per_topic: usize) -> Result<Vec<Resource>> {
    let url = format!("{}/bookshelf/prewarm", base.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PREWARM_TIMEOUT_SECS))
        .build()?;
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "topics": topics, "per_topic": per_topic }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;
    if !resp.status().is_success() {
        bail!("prewarm failed (HTTP {}) at {}", resp.status(), url);
    }

    #[derive(Deserialize)]
    struct PrewarmResponse {
        #[serde(default)]
        resources: Vec<Resource>,
    }
    let body: PrewarmResponse = resp.json().await.context("prewarm returned invalid JSON")?;
    Ok(body.resources)
}

/// CLI entry point for `shelf vibe`.
pub fn run_vibe(config: &Config) -> Result<()> {
    let search = SearchProvider::from_config(&config.search)?;
    let results = ResultCache::from_config(&config.result_cache);
    let curator = Curator::from_config(&config.curation);
    let stats = search.cache_stats();

    println!("backend:       {}", search.backend_name());
    println!("query cache:   {}/{}", stats.cached_queries, stats.max);
    println!("result cache:  {}", if results.is_available() { "s3" } else { "off" });
    println!("curation:      {}", if curator.has_generator() { "bedrock" } else { "off" });
    println!();
    println!("{}", vibe_message(search.backend_name()));
    Ok(())
}

/// Keep resources whose `content_type` or legacy `type` equals `filter`.
/// An unknown filter value matches nothing.
pub fn filter_by_type(resources: Vec<Resource>, filter: Option<&str>) -> Vec<Resource> {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => resources.into_iter().filter(|r| r.matches_type(f)).collect(),
        None => resources,
    }
}

/// Split a comma-separated topic list, dropping blanks.
pub fn split_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
