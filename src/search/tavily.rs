//! Tavily search API backend (`TAVILY_API_KEY`).

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use super::{rank_rows, sanitize, video_query};
use crate::models::Resource;
use crate::query_cache::QueryKind;

pub async fn search(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    topic: &str,
    limit: usize,
    kind: QueryKind,
) -> Result<Vec<Resource>> {
    let query = match kind {
        QueryKind::Search => topic.to_string(),
        QueryKind::Video => video_query(topic),
    };
    let body = serde_json::json!({
        "query": query,
        "max_results": limit,
        "search_depth": "basic",
    });

    let resp = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .context("tavily request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!(
            "tavily error {}: {}",
            status,
            text.chars().take(500).collect::<String>()
        );
    }

    let payload: Value = resp.json().await.context("tavily returned invalid JSON")?;
    parse_response(&payload, limit, kind)
}

/// Parse a Tavily `/search` response body.
pub fn parse_response(payload: &Value, limit: usize, kind: QueryKind) -> Result<Vec<Resource>> {
    let results = payload
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("invalid tavily response: missing results array"))?;

    let rows = results
        .iter()
        .map(|row| {
            let field = |names: &[&str]| {
                names
                    .iter()
                    .find_map(|n| row.get(*n).and_then(|v| v.as_str()))
                    .unwrap_or_default()
                    .to_string()
            };
            let url = field(&["url", "link"]);
            let title = sanitize(&field(&["title"]));
            let snippet = sanitize(&field(&["content", "snippet", "body"]));
            (title, url, snippet)
        })
        .collect();

    Ok(rank_rows(rows, limit, kind))
}
