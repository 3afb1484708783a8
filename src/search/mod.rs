//! Web search backends.
//!
//! Exactly one backend serves a process. It is chosen once, when the
//! [`SearchProvider`] is built, from the environment:
//!
//! | Priority | Variable | Backend |
//! |----------|----------|---------|
//! | 1 | `TAVILY_API_KEY` | [`tavily`] |
//! | 2 | `EXA_API_KEY` | [`exa`] |
//! | 3 | - | [`duckduckgo`] (no credentials) |
//!
//! Backends form a closed enum and are dispatched with `match`. Every
//! backend returns ranked [`Resource`]s with `score = 1.0 - rank * 0.1` and a
//! `type` of `video` or `article`.
//!
//! # Failure
//!
//! [`SearchProvider::search`] and [`SearchProvider::search_video`] never
//! return an error. Any failure (network, HTTP status, malformed body) is
//! logged and replaced with a single placeholder resource whose snippet
//! carries the error text.

pub mod duckduckgo;
pub mod exa;
pub mod tavily;

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, SearchConfig};
use crate::models::{print_resources, truncate_chars, CacheStats, ContentType, Resource, DISPLAY_MAX_CHARS};
use crate::query_cache::{QueryCache, QueryKey, QueryKind};

/// Hosts whose pages are classified as video.
pub const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];

/// The active search backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    Tavily { api_key: String },
    Exa { api_key: String },
    DuckDuckGo,
}

impl SearchBackend {
    /// Select a backend from `TAVILY_API_KEY` / `EXA_API_KEY`.
    pub fn from_env() -> Self {
        Self::select(
            std::env::var("TAVILY_API_KEY").ok(),
            std::env::var("EXA_API_KEY").ok(),
        )
    }

    /// Tavily wins over Exa; blank keys count as unset.
    pub fn select(tavily_key: Option<String>, exa_key: Option<String>) -> Self {
        let non_blank = |k: Option<String>| k.filter(|k| !k.trim().is_empty());
        if let Some(api_key) = non_blank(tavily_key) {
            SearchBackend::Tavily { api_key }
        } else if let Some(api_key) = non_blank(exa_key) {
            SearchBackend::Exa { api_key }
        } else {
            SearchBackend::DuckDuckGo
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchBackend::Tavily { .. } => "tavily",
            SearchBackend::Exa { .. } => "exa",
            SearchBackend::DuckDuckGo => "duckduckgo",
        }
    }
}

/// A search backend plus its own query cache.
pub struct SearchProvider {
    backend: SearchBackend,
    config: SearchConfig,
    client: reqwest::Client,
    cache: QueryCache,
}

impl SearchProvider {
    pub fn new(backend: SearchBackend, config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("bookshelf/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            backend,
            config: config.clone(),
            client,
            cache: QueryCache::new(config.cache_max),
        })
    }

    /// Build with the backend chosen from the environment.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Self::new(SearchBackend::from_env(), config)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Search the web for `topic`. With `skip_cache` the query cache is
    /// neither read nor written.
    pub async fn search(&self, topic: &str, limit: usize, skip_cache: bool) -> Vec<Resource> {
        let key = QueryKey::new(QueryKind::Search, topic, limit);
        if !skip_cache {
            if let Some(hit) = self.cache.get(&key) {
                debug!(topic, limit, "query cache hit");
                return hit;
            }
        }

        match self.fetch(topic, limit, QueryKind::Search).await {
            Ok(results) => {
                if !skip_cache {
                    self.cache.put(key, results.clone());
                }
                results
            }
            Err(e) => {
                warn!(backend = self.backend_name(), topic, "search failed: {:#}", e);
                vec![Resource::placeholder(format!("{:#}", e), ContentType::Article)]
            }
        }
    }

    /// Video-only search. Results are cached separately from [`search`](Self::search).
    pub async fn search_video(&self, topic: &str, limit: usize) -> Vec<Resource> {
        let key = QueryKey::new(QueryKind::Video, topic, limit);
        if let Some(hit) = self.cache.get(&key) {
            debug!(topic, limit, "video cache hit");
            return hit;
        }

        match self.fetch(topic, limit, QueryKind::Video).await {
            Ok(results) => {
                self.cache.put(key, results.clone());
                results
            }
            Err(e) => {
                warn!(backend = self.backend_name(), topic, "video search failed: {:#}", e);
                vec![Resource::placeholder(format!("{:#}", e), ContentType::Video)]
            }
        }
    }

    async fn fetch(&self, topic: &str, limit: usize, kind: QueryKind) -> Result<Vec<Resource>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let results = match &self.backend {
            SearchBackend::Tavily { api_key } => {
                tavily::search(&self.client, &self.config.tavily_endpoint, api_key, topic, limit, kind)
                    .await?
            }
            SearchBackend::Exa { api_key } => {
                exa::search(&self.client, &self.config.exa_endpoint, api_key, topic, limit, kind).await?
            }
            SearchBackend::DuckDuckGo => {
                duckduckgo::search(&self.client, &self.config.duckduckgo_endpoint, topic, limit, kind)
                    .await?
            }
        };
        debug!(backend = self.backend_name(), topic, count = results.len(), "search complete");
        Ok(results)
    }
}

/// CLI entry point for `shelf search`.
pub async fn run_search(config: &Config, topic: &str, limit: usize, video: bool, fresh: bool) -> Result<()> {
    if topic.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let provider = SearchProvider::from_config(&config.search)?;
    let results = if video {
        provider.search_video(topic, limit).await
    } else {
        provider.search(topic, limit, fresh).await
    };
    println!("backend: {}", provider.backend_name());
    println!();
    print_resources(&results);
    Ok(())
}

/// Query text used for the video variant on backends without a domain filter.
pub(crate) fn video_query(topic: &str) -> String {
    format!("{} site:youtube.com", topic)
}

/// Whether `url`'s host is (or is a subdomain of) a known video host.
/// Unparseable and empty URLs are never video.
pub fn is_video_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    VIDEO_HOSTS
        .iter()
        .any(|v| host == *v || host.ends_with(&format!(".{}", v)))
}

/// Legacy `type` for a search hit.
pub fn kind_for_url(url: &str) -> ContentType {
    if is_video_url(url) {
        ContentType::Video
    } else {
        ContentType::Article
    }
}

static NON_ASCII: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").expect("valid regex"));

/// Replace runs of non-ASCII characters with a space, trim, and cap the length.
pub fn sanitize(s: &str) -> String {
    let replaced = NON_ASCII.replace_all(s, " ");
    truncate_chars(replaced.trim(), DISPLAY_MAX_CHARS)
}

/// Turn `(title, url, snippet)` rows into ranked resources for `kind`.
///
/// For [`QueryKind::Video`] non-video URLs are dropped before ranking. At most
/// `limit` resources are returned.
pub(crate) fn rank_rows(rows: Vec<(String, String, String)>, limit: usize, kind: QueryKind) -> Vec<Resource> {
    rows.into_iter()
        .filter(|(_, url, _)| kind == QueryKind::Search || is_video_url(url))
        .take(limit)
        .enumerate()
        .map(|(rank, (title, url, snippet))| {
            let content = match kind {
                QueryKind::Video => ContentType::Video,
                QueryKind::Search => kind_for_url(&url),
            };
            Resource::ranked(title, url, snippet, rank, content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, response::Html, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_select_priority() {
        assert_eq!(
            SearchBackend::select(Some("t".into()), Some("e".into())),
            SearchBackend::Tavily { api_key: "t".into() }
        );
        assert_eq!(
            SearchBackend::select(None, Some("e".into())),
            SearchBackend::Exa { api_key: "e".into() }
        );
        assert_eq!(SearchBackend::select(Some("  ".into()), None), SearchBackend::DuckDuckGo);
        assert_eq!(SearchBackend::select(None, None).name(), "duckduckgo");
    }

    #[test]
    fn test_is_video_url() {
        assert!(is_video_url("https://youtube.com/x"));
        assert!(is_video_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_video_url("https://youtu.be/abc"));
        assert!(is_video_url("https://vimeo.com/123"));
        assert!(!is_video_url("https://a.com"));
        assert!(!is_video_url("https://notyoutube.com/x"));
        assert!(!is_video_url("https://a.com/?ref=youtube.com"));
        assert!(!is_video_url(""));
    }

    #[test]
    fn test_sanitize_strips_non_ascii_and_truncates() {
        assert_eq!(sanitize("  Merge sort 🚀🚀 explained  "), "Merge sort   explained");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(&"a".repeat(900)).len(), 500);
    }

    #[test]
    fn test_rank_rows_scores_and_types() {
        let rows = vec![
            ("A".to_string(), "https://a.com".to_string(), "s".to_string()),
            ("B".to_string(), "https://youtube.com/x".to_string(), "s".to_string()),
            ("C".to_string(), "https://c.com".to_string(), "s".to_string()),
        ];
        let ranked = rank_rows(rows, 2, QueryKind::Search);
        assert_eq!(ranked.len(), 2);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert!((ranked[1].score - 0.9).abs() < 1e-9);
        assert_eq!(ranked[0].kind, Some(ContentType::Article));
        assert_eq!(ranked[1].kind, Some(ContentType::Video));
    }

    #[test]
    fn test_rank_rows_video_drops_non_video() {
        let rows = vec![
            ("A".to_string(), "https://a.com".to_string(), String::new()),
            ("B".to_string(), "https://youtu.be/b".to_string(), String::new()),
        ];
        let ranked = rank_rows(rows, 5, QueryKind::Video);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "B");
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].kind, Some(ContentType::Video));
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_placeholder_and_skips_cache() {
        let config = SearchConfig {
            tavily_endpoint: "http://127.0.0.1:9/search".to_string(),
            timeout_secs: 2,
            ..SearchConfig::default()
        };
        let provider =
            SearchProvider::new(SearchBackend::Tavily { api_key: "k".into() }, &config).unwrap();

        let results = provider.search("recursion", 3, false).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_placeholder());
        assert_eq!(results[0].score, 0.0);
        assert!(!results[0].snippet.is_empty());
        assert_eq!(provider.cache_stats().cached_queries, 0);

        let videos = provider.search_video("recursion", 3).await;
        assert_eq!(videos[0].kind, Some(ContentType::Video));
        assert!(videos[0].is_placeholder());
    }

    /// DuckDuckGo stand-in that answers the first request with the 202
    /// rate-limit challenge and every later one with a single result.
    async fn flaky_duckduckgo() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/html/",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (
                            StatusCode::ACCEPTED,
                            Html("<html><body><div class=\"anomaly-modal\">bots use DuckDuckGo too</div></body></html>"),
                        )
                    } else {
                        (
                            StatusCode::OK,
                            Html("<html><body><div class=\"result\"><a class=\"result__a\" href=\"https://a.com/arrays\">Arrays</a></div></body></html>"),
                        )
                    }
                }),
            )
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/html/", addr), hits)
    }

    #[tokio::test]
    async fn test_duckduckgo_challenge_is_not_cached() {
        let (endpoint, hits) = flaky_duckduckgo().await;
        let provider = SearchProvider::new(SearchBackend::DuckDuckGo, &SearchConfig {
            duckduckgo_endpoint: endpoint,
            ..SearchConfig::default()
        })
        .unwrap();

        let first = provider.search("arrays", 3, false).await;
        assert_eq!(first.len(), 1);
        assert!(first[0].is_placeholder());
        assert_eq!(provider.cache_stats().cached_queries, 0);

        let second = provider.search("arrays", 3, false).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].url, "https://a.com/arrays");
        assert_eq!(provider.cache_stats().cached_queries, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_empty_without_network() {
        let provider = SearchProvider::new(SearchBackend::DuckDuckGo, &SearchConfig {
            duckduckgo_endpoint: "http://127.0.0.1:9/".to_string(),
            ..SearchConfig::default()
        })
        .unwrap();
        assert!(provider.search("arrays", 0, false).await.is_empty());
    }
}
