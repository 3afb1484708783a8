//! Resource curation: scoring, classification, and summaries.
//!
//! [`Curator::curate`] takes the concatenated per-topic search results and:
//!
//! 1. Groups them by `topic` in first-seen order. Untagged resources (error
//!    placeholders) form their own group, which is never scored.
//! 2. Scores each tagged group with one text-generation call. The model
//!    answers with `index,relevance,recency,authority` lines, which are
//!    blended into `score = 0.5*rel + 0.25*rec + 0.25*auth` (clamped to
//!    `[0, 1]`). A scored group is re-sorted by score.
//! 3. Classifies every resource as `article`, `video` or `book` from its URL.
//! 4. Optionally writes a one-sentence summary for the first few resources.
//! 5. Sorts everything by score, descending and stable.
//!
//! Curation never fails. A generator error leaves the affected group or
//! resource as it was.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::config::CurationConfig;
use crate::llm::TextGenerator;
use crate::models::{truncate_chars, ContentType, Resource, DISPLAY_MAX_CHARS};
use crate::search::is_video_url;

const SCORE_MAX_TOKENS: u32 = 1024;
const SCORE_TEMPERATURE: f32 = 0.0;
const SUMMARY_MAX_TOKENS: u32 = 80;
const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Hosts and paths that mark a URL as a book.
const BOOK_MARKERS: &[&str] = &["books.google", "oreilly.com", "mitpress.mit.edu"];

pub struct Curator {
    generator: Option<Arc<dyn TextGenerator>>,
    max_summaries: usize,
    summary_threshold: usize,
}

impl Curator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: &CurationConfig) -> Self {
        Self {
            generator,
            max_summaries: config.max_summaries,
            summary_threshold: config.summary_threshold,
        }
    }

    /// Build with the generator configured in `config`, if any.
    pub fn from_config(config: &CurationConfig) -> Self {
        Self::new(crate::llm::create_generator(config), config)
    }

    /// A curator that only classifies and sorts.
    pub fn without_generator() -> Self {
        Self::new(None, &CurationConfig::default())
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn curate(
        &self,
        resources: Vec<Resource>,
        score_enabled: bool,
        summarize_enabled: bool,
    ) -> Vec<Resource> {
        if resources.is_empty() {
            return resources;
        }

        let mut curated = Vec::with_capacity(resources.len());
        for (topic, mut group) in group_by_topic(resources) {
            if let (Some(topic), Some(generator), true) = (topic.as_deref(), &self.generator, score_enabled) {
                score_group(generator.as_ref(), topic, &mut group).await;
            }
            curated.extend(group);
        }

        for resource in &mut curated {
            let content_type = classify(&resource.url);
            resource.content_type = Some(content_type);
            if resource.kind.is_none() {
                resource.kind = Some(content_type);
            }
        }

        match &self.generator {
            Some(generator) if summarize_enabled && curated.len() <= self.summary_threshold => {
                for (i, resource) in curated.iter_mut().enumerate() {
                    resource.summary = Some(if i < self.max_summaries && !resource.is_placeholder() {
                        summarize(generator.as_ref(), resource).await
                    } else {
                        snippet_summary(resource)
                    });
                }
            }
            _ => {
                for resource in &mut curated {
                    resource.summary = Some(snippet_summary(resource));
                }
            }
        }

        sort_by_score(&mut curated);
        curated
    }
}

/// Partition into `(topic, group)` pairs, preserving first-seen order.
fn group_by_topic(resources: Vec<Resource>) -> Vec<(Option<String>, Vec<Resource>)> {
    let mut groups: Vec<(Option<String>, Vec<Resource>)> = Vec::new();
    for resource in resources {
        match groups.iter_mut().find(|(t, _)| *t == resource.topic) {
            Some((_, group)) => group.push(resource),
            None => groups.push((resource.topic.clone(), vec![resource])),
        }
    }
    groups
}

fn sort_by_score(resources: &mut [Resource]) {
    resources.sort_by(|a, b| b.score.total_cmp(&a.score));
}

async fn score_group(generator: &dyn TextGenerator, topic: &str, group: &mut [Resource]) {
    let prompt = build_score_prompt(topic, group);
    let text = match generator
        .generate(&prompt, SCORE_MAX_TOKENS, SCORE_TEMPERATURE)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(topic, model = generator.model_name(), "scoring failed: {:#}", e);
            return;
        }
    };

    let mut applied = 0;
    for line in parse_score_lines(&text) {
        let Some(resource) = group.get_mut(line.index) else {
            continue;
        };
        resource.score = line.combined();
        resource.relevance = Some(line.relevance);
        resource.recency = Some(line.recency);
        resource.authority = Some(line.authority);
        applied += 1;
    }
    debug!(topic, applied, total = group.len(), "group scored");
    sort_by_score(group);
}

/// Prompt asking for one `index,relevance,recency,authority` line per resource.
pub fn build_score_prompt(topic: &str, resources: &[Resource]) -> String {
    let mut prompt = format!(
        "You are a quality rater for educational web resources. For the learning topic \"{}\", rate each resource below.\n\n\
         For each resource, output a single line: index,relevance,recency,authority\n\
         - relevance: 0.0-1.0 (how well it matches the topic)\n\
         - recency: 0.0-1.0 (how up-to-date it seems from URL/snippet)\n\
         - authority: 0.0-1.0 (trustworthiness of source)\n\n\
         Output ONLY the comma-separated lines, one per resource, no other text. Example:\n\
         0,0.9,0.8,0.95\n\
         1,0.7,0.6,0.7\n\n\
         Resources:\n\
         ---\n",
        topic
    );
    let entries: Vec<String> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] Title: {}\nURL: {}\nSnippet: {}",
                i,
                truncate_chars(&r.title, 200),
                truncate_chars(&r.url, 300),
                truncate_chars(&r.snippet, 400)
            )
        })
        .collect();
    prompt.push_str(&entries.join("\n---\n"));
    prompt
}

/// One parsed rating line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreLine {
    pub index: usize,
    pub relevance: f64,
    pub recency: f64,
    pub authority: f64,
}

impl ScoreLine {
    pub fn combined(&self) -> f64 {
        (0.5 * self.relevance + 0.25 * self.recency + 0.25 * self.authority).clamp(0.0, 1.0)
    }
}

static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+),([\d.]+),([\d.]+),([\d.]+)(?:,|$)").expect("valid regex")
});

/// Extract every well-formed rating line. Anything else is skipped line by
/// line, including numbers that do not parse (`0,1..2,0.5,0.5`).
pub fn parse_score_lines(text: &str) -> Vec<ScoreLine> {
    text.lines()
        .filter_map(|line| {
            let caps = SCORE_LINE.captures(line.trim())?;
            Some(ScoreLine {
                index: caps[1].parse().ok()?,
                relevance: caps[2].parse().ok()?,
                recency: caps[3].parse().ok()?,
                authority: caps[4].parse().ok()?,
            })
        })
        .collect()
}

/// Content type from URL rules. Empty or unrecognised URLs are articles.
pub fn classify(url: &str) -> ContentType {
    if is_video_url(url) {
        return ContentType::Video;
    }
    let lower = url.to_lowercase();
    let is_book = BOOK_MARKERS.iter().any(|m| lower.contains(m))
        || (lower.contains("amazon.com") && lower.contains("/dp/"));
    if is_book {
        ContentType::Book
    } else {
        ContentType::Article
    }
}

fn snippet_summary(resource: &Resource) -> String {
    truncate_chars(&resource.snippet, DISPLAY_MAX_CHARS)
}

pub fn build_summary_prompt(topic: &str, resource: &Resource) -> String {
    format!(
        "Topic: {}. Resource: \"{}\". Snippet: {}\n\
         In one sentence (max 25 words), summarize why this resource is useful for learning this topic. \
         Output only the sentence, no quotes.",
        topic,
        truncate_chars(&resource.title, 200),
        truncate_chars(&resource.snippet, 600)
    )
}

async fn summarize(generator: &dyn TextGenerator, resource: &Resource) -> String {
    let topic = resource.topic.as_deref().unwrap_or_default();
    let prompt = build_summary_prompt(topic, resource);
    match generator
        .generate(&prompt, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE)
        .await
    {
        Ok(text) if !text.trim().is_empty() => truncate_chars(text.trim(), DISPLAY_MAX_CHARS),
        Ok(_) => snippet_summary(resource),
        Err(e) => {
            debug!(url = %resource.url, "summary failed: {:#}", e);
            snippet_summary(resource)
        }
    }
}
