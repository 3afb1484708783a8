//! Remote cache of curated bookshelf results.
//!
//! Curated lists are stored as JSON objects keyed by a digest of the topic set
//! and the per-topic count. The key scheme is shared with other deployments
//! of the bookshelf, so it must stay byte-for-byte stable:
//!
//! ```text
//! topics'  = sorted(lower(trim(t)) for t in topics if trim(t) != "")
//! payload  = {"per_topic": N, "topics": [topics'...]}   (sorted keys, ", " / ": ", ASCII-escaped)
//! key      = "{prefix}/" + hex(sha256(payload))[..24] + ".json"
//! ```
//!
//! Duplicate topics are kept, so `["x", "x"]` and `["x"]` map to different keys.
//!
//! The cache fails open: when no store is configured every call is a no-op,
//! and any store error is logged and treated as a miss.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ResultCacheConfig;
use crate::models::Resource;
use crate::sigv4::{self, hex_sha256, AwsCredentials, SigningInput};

/// Minimal key-value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Result cache over an optional [`ObjectStore`].
pub struct ResultCache {
    store: Option<Arc<dyn ObjectStore>>,
    prefix: String,
}

impl ResultCache {
    pub fn new(store: Option<Arc<dyn ObjectStore>>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(None, "bookshelf")
    }

    /// Build from config. The S3 store is only attached when a bucket is
    /// configured and AWS credentials are present.
    pub fn from_config(config: &ResultCacheConfig) -> Self {
        let prefix = config.resolved_prefix();
        let Some(bucket) = config.resolved_bucket() else {
            info!("result cache disabled: no bucket configured");
            return Self::new(None, prefix);
        };
        let creds = match AwsCredentials::from_env() {
            Ok(c) => c,
            Err(e) => {
                info!("result cache disabled: {:#}", e);
                return Self::new(None, prefix);
            }
        };
        match S3Store::new(bucket.clone(), config, creds) {
            Ok(store) => {
                info!(bucket = %bucket, prefix = %prefix, "result cache backed by S3");
                Self::new(Some(Arc::new(store)), prefix)
            }
            Err(e) => {
                warn!("result cache disabled: {:#}", e);
                Self::new(None, prefix)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn key(&self, topics: &[String], per_topic: usize) -> String {
        cache_key(&self.prefix, topics, per_topic)
    }

    /// Look up a curated list. Any failure is a miss.
    pub async fn get(&self, topics: &[String], per_topic: usize) -> Option<Vec<Resource>> {
        let store = self.store.as_ref()?;
        let key = self.key(topics, per_topic);

        let bytes = match store.get(&key).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!(key = %key, "result cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, "result cache read failed: {:#}", e);
                return None;
            }
        };

        match decode_resources(&bytes) {
            Ok(resources) => {
                debug!(key = %key, count = resources.len(), "result cache hit");
                Some(resources)
            }
            Err(e) => {
                warn!(key = %key, "result cache entry unreadable: {:#}", e);
                None
            }
        }
    }

    /// Store a curated list. Failures are logged and dropped.
    pub async fn put(&self, topics: &[String], per_topic: usize, resources: &[Resource]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = self.key(topics, per_topic);
        let body = match serde_json::to_vec(resources) {
            Ok(b) => b,
            Err(e) => {
                warn!(key = %key, "result cache encode failed: {}", e);
                return;
            }
        };
        if let Err(e) = store.put(&key, body, "application/json").await {
            warn!(key = %key, "result cache write failed: {:#}", e);
        } else {
            debug!(key = %key, count = resources.len(), "result cache stored");
        }
    }
}

/// Accepts either a bare list or `{"resources": [...]}`.
fn decode_resources(bytes: &[u8]) -> Result<Vec<Resource>> {
    let value: Value = serde_json::from_slice(bytes).context("not JSON")?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("resources") {
            Some(list @ Value::Array(_)) => list,
            _ => bail!("object without a resources list"),
        },
        _ => bail!("expected a list of resources"),
    };
    Ok(serde_json::from_value(list)?)
}

/// Derive the object key for a topic set and per-topic count.
pub fn cache_key(prefix: &str, topics: &[String], per_topic: usize) -> String {
    let mut normalized: Vec<String> = topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    normalized.sort();

    let payload = canonical_payload(&normalized, per_topic);
    let digest = hex_sha256(payload.as_bytes());
    format!("{}/{}.json", prefix, &digest[..24])
}

/// `{"per_topic": N, "topics": [...]}` exactly as a sorted-keys, ASCII-only
/// JSON dump with default separators renders it.
fn canonical_payload(topics: &[String], per_topic: usize) -> String {
    let items: Vec<String> = topics.iter().map(|t| ascii_json_string(t)).collect();
    format!(
        "{{\"per_topic\": {}, \"topics\": [{}]}}",
        per_topic,
        items.join(", ")
    )
}

fn ascii_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
    out
}

// ============ S3 store ============

/// Objects in an S3 bucket, via the REST API with SigV4 signing.
pub struct S3Store {
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Store {
    pub fn new(bucket: String, config: &ResultCacheConfig, creds: AwsCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            bucket,
            region: config.resolved_region(),
            endpoint_url: config.endpoint_url.clone(),
            creds,
            client,
        })
    }

    /// Virtual-hosted style on AWS; path style on custom endpoints.
    fn location(&self, key: &str) -> (String, String, String) {
        let encoded_key = sigv4::encode_path(key);
        match self.endpoint_url {
            Some(ref endpoint) => {
                let host = sigv4::endpoint_host(endpoint);
                let scheme = sigv4::endpoint_scheme(endpoint);
                let uri = format!("/{}/{}", sigv4::uri_encode(&self.bucket), encoded_key);
                (format!("{}://{}{}", scheme, host, uri), host, uri)
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.bucket, self.region);
                let uri = format!("/{}", encoded_key);
                (format!("https://{}{}", host, uri), host, uri)
            }
        }
    }

    fn signed(
        &self,
        method: reqwest::Method,
        key: &str,
        payload: &[u8],
        extra_headers: Vec<(String, String)>,
    ) -> reqwest::RequestBuilder {
        let (url, host, uri) = self.location(key);
        let headers = sigv4::sign(
            SigningInput {
                method: method.as_str(),
                host: &host,
                canonical_uri: &uri,
                canonical_query: "",
                payload,
                region: &self.region,
                service: "s3",
                extra_headers,
            },
            &self.creds,
            Utc::now(),
        );
        let mut req = self.client.request(method, &url);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .signed(reqwest::Method::GET, key, b"", Vec::new())
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let resp = self
            .signed(
                reqwest::Method::PUT,
                key,
                &body,
                vec![("content-type".to_string(), content_type.to_string())],
            )
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.bucket, key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }
}

// ============ In-memory store ============

/// In-process [`ObjectStore`] for tests and single-node runs.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Insert raw bytes directly, bypassing encoding.
    pub fn insert_raw(&self, key: &str, body: Vec<u8>) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), body);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.insert_raw(key, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Vec<Resource> {
        vec![Resource::ranked(
            "Binary search".into(),
            "https://a.com".into(),
            "snippet".into(),
            0,
            ContentType::Article,
        )]
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            bail!("connection refused")
        }
        async fn put(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> Result<()> {
            bail!("access denied")
        }
    }

    #[test]
    fn test_canonical_payload_matches_sorted_json_dump() {
        assert_eq!(
            canonical_payload(&topics(&["binary search", "recursion"]), 3),
            r#"{"per_topic": 3, "topics": ["binary search", "recursion"]}"#
        );
        assert_eq!(canonical_payload(&[], 2), r#"{"per_topic": 2, "topics": []}"#);
    }

    #[test]
    fn test_ascii_escaping() {
        assert_eq!(ascii_json_string("caf\u{e9}"), r#""caf\u00e9""#);
        assert_eq!(ascii_json_string("a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(ascii_json_string("\u{1F600}"), r#""\ud83d\ude00""#);
        assert_eq!(ascii_json_string("\u{7f}"), r#""\u007f""#);
    }

    #[test]
    fn test_key_shape() {
        let key = cache_key("bookshelf", &topics(&["recursion"]), 3);
        assert!(key.starts_with("bookshelf/"));
        assert!(key.ends_with(".json"));
        let hash = key.trim_start_matches("bookshelf/").trim_end_matches(".json");
        assert_eq!(hash.len(), 24);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        let expected = &hex_sha256(br#"{"per_topic": 3, "topics": ["recursion"]}"#)[..24];
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_key_ignores_order_case_whitespace_and_blanks() {
        let a = cache_key("p", &topics(&["Merge Sort", " binary search "]), 3);
        let b = cache_key("p", &topics(&["binary search", "merge sort", "  "]), 3);
        assert_eq!(a, b);
        assert_ne!(a, cache_key("p", &topics(&["binary search", "merge sort"]), 4));
    }

    #[test]
    fn test_key_keeps_duplicates() {
        let single = cache_key("p", &topics(&["x"]), 1);
        assert_eq!(single, cache_key("p", &topics(&[" X "]), 1));
        assert_ne!(single, cache_key("p", &topics(&["X", " x "]), 1));
    }

    #[test]
    fn test_decode_accepts_both_shapes() {
        let list = serde_json::to_vec(&sample()).unwrap();
        assert_eq!(decode_resources(&list).unwrap().len(), 1);

        let wrapped = serde_json::to_vec(&serde_json::json!({ "resources": sample() })).unwrap();
        assert_eq!(decode_resources(&wrapped).unwrap().len(), 1);

        assert!(decode_resources(b"not json").is_err());
        assert!(decode_resources(br#"{"other": 1}"#).is_err());
        assert!(decode_resources(b"42").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_through_memory_store() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(Some(store.clone()), "bookshelf");
        let t = topics(&["recursion"]);

        assert!(cache.get(&t, 3).await.is_none());
        cache.put(&t, 3, &sample()).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys()[0], cache.key(&t, 3));

        let hit = cache.get(&topics(&[" RECURSION "]), 3).await.unwrap();
        assert_eq!(hit, sample());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = ResultCache::disabled();
        assert!(!cache.is_available());
        cache.put(&topics(&["a"]), 1, &sample()).await;
        assert!(cache.get(&topics(&["a"]), 1).await.is_none());
    }

    #[tokio::test]
    async fn test_store_errors_fail_open() {
        let cache = ResultCache::new(Some(Arc::new(FailingStore)), "bookshelf");
        cache.put(&topics(&["a"]), 1, &sample()).await;
        assert!(cache.get(&topics(&["a"]), 1).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(Some(store.clone()), "bookshelf");
        let t = topics(&["a"]);
        store.insert_raw(&cache.key(&t, 1), b"<Error>NoSuchKey</Error>".to_vec());
        assert!(cache.get(&t, 1).await.is_none());
    }

    #[test]
    fn test_s3_location_styles() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        let config = ResultCacheConfig {
            region: Some("us-east-1".into()),
            ..ResultCacheConfig::default()
        };
        let aws = S3Store::new("shelf".into(), &config, creds.clone()).unwrap();
        let (url, host, uri) = aws.location("bookshelf/abc.json");
        assert_eq!(host, "shelf.s3.us-east-1.amazonaws.com");
        assert_eq!(uri, "/bookshelf/abc.json");
        assert_eq!(url, "https://shelf.s3.us-east-1.amazonaws.com/bookshelf/abc.json");

        let minio_config = ResultCacheConfig {
            endpoint_url: Some("http://localhost:9000".into()),
            ..config
        };
        let minio = S3Store::new("shelf".into(), &minio_config, creds).unwrap();
        let (url, host, uri) = minio.location("bookshelf/abc.json");
        assert_eq!(host, "localhost:9000");
        assert_eq!(uri, "/shelf/bookshelf/abc.json");
        assert_eq!(url, "http://localhost:9000/shelf/bookshelf/abc.json");
    }
}
