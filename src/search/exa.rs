//! Exa search API backend (`EXA_API_KEY`).

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use super::{rank_rows, sanitize};
use crate::models::{truncate_chars, Resource, DISPLAY_MAX_CHARS};
use crate::query_cache::QueryKind;

const VIDEO_DOMAINS: &[&str] = &["youtube.com", "www.youtube.com"];

pub async fn search(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    topic: &str,
    limit: usize,
    kind: QueryKind,
) -> Result<Vec<Resource>> {
    let mut body = serde_json::json!({
        "query": topic,
        "type": "auto",
        "numResults": limit,
        "contents": { "text": { "maxCharacters": 20000 } },
    });
    if kind == QueryKind::Video {
        body["includeDomains"] = serde_json::json!(VIDEO_DOMAINS);
    }

    let resp = client
        .post(endpoint)
        .header("x-api-key", api_key)
        .json(&body)
        .send()
        .await
        .context("exa request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!(
            "exa error {}: {}",
            status,
            text.chars().take(500).collect::<String>()
        );
    }

    let payload: Value = resp.json().await.context("exa returned invalid JSON")?;
    parse_response(&payload, limit, kind)
}

/// Parse an Exa `/search` response body.
///
/// The snippet is the first 500 characters of the page text; when the text
/// is missing the first highlight (or description) is used instead.
pub fn parse_response(payload: &Value, limit: usize, kind: QueryKind) -> Result<Vec<Resource>> {
    let results = payload
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("invalid exa response: missing results array"))?;

    let rows = results
        .iter()
        .map(|row| {
            let url = row
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let title = sanitize(row.get("title").and_then(|v| v.as_str()).unwrap_or_default());
            let text = match row.get("text") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => String::new(),
            };
            let mut snippet = sanitize(&truncate_chars(&text, DISPLAY_MAX_CHARS));
            if snippet.is_empty() {
                let fallback = row
                    .get("highlights")
                    .and_then(|h| h.as_array())
                    .and_then(|h| h.first())
                    .and_then(|h| h.as_str())
                    .or_else(|| row.get("description").and_then(|d| d.as_str()))
                    .unwrap_or_default();
                snippet = sanitize(fallback);
            }
            (title, url, snippet)
        })
        .collect();

    Ok(rank_rows(rows, limit, kind))
}
