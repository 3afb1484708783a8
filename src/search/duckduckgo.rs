//! DuckDuckGo HTML backend. Needs no credentials.
//!
//! Scrapes the lite HTML results page. Result links are usually wrapped in a
//! `//duckduckgo.com/l/?uddg=<target>` redirect, which is unwrapped here.
//! Sponsored results (`.result--ad`) are skipped.
//!
//! Anything but `200 OK` is a failure, as is a page with no `.result`
//! container at all. The rate-limit challenge comes back as `202` with no
//! result blocks and must not be cached as an empty hit list.

use anyhow::{anyhow, bail, Context, Result};
use scraper::{ElementRef, Html, Selector};

use super::{rank_rows, sanitize, video_query};
use crate::models::Resource;
use crate::query_cache::QueryKind;

pub async fn search(
    client: &reqwest::Client,
    endpoint: &str,
    topic: &str,
    limit: usize,
    kind: QueryKind,
) -> Result<Vec<Resource>> {
    let query = match kind {
        QueryKind::Search => topic.to_string(),
        QueryKind::Video => video_query(topic),
    };

    let resp = client
        .get(endpoint)
        .query(&[("q", query.as_str())])
        .send()
        .await
        .context("duckduckgo request failed")?;

    if resp.status() != reqwest::StatusCode::OK {
        bail!("duckduckgo error {}", resp.status());
    }

    let html = resp.text().await.context("duckduckgo body unreadable")?;
    parse_results(&html, limit, kind)
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("invalid selector '{}': {:?}", s, e))
}

/// Parse a results page into ranked resources.
pub fn parse_results(html: &str, limit: usize, kind: QueryKind) -> Result<Vec<Resource>> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    if document.select(&selector(".result")?).next().is_none() {
        bail!("duckduckgo returned a page without results markup");
    }

    let rows = document
        .select(&result_sel)
        .filter(|el| !el.value().classes().any(|c| c == "result--ad"))
        .filter_map(|el| {
            let link = el.select(&link_sel).next()?;
            let url = resolve_href(link.value().attr("href")?)?;
            let title = sanitize(&element_text(&link));
            let snippet = el
                .select(&snippet_sel)
                .next()
                .map(|s| sanitize(&element_text(&s)))
                .unwrap_or_default();
            Some((title, url, snippet))
        })
        .collect();

    Ok(rank_rows(rows, limit, kind))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join("")
}

/// Turn a result `href` into the target URL, unwrapping DuckDuckGo's
/// `/l/?uddg=` redirect when present.
fn resolve_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = url::Url::parse(&absolute).ok()?;

    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");
    if is_redirect {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }
    Some(absolute)
}
