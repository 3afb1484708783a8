//! Text-to-speech.
//!
//! Text is cut into chunks of at most [`CHUNK_CHARS`] characters on word
//! boundaries, each chunk is synthesized by the Google Translate TTS
//! endpoint, and the MP3 frames are concatenated into one stream.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::debug;

use crate::config::SpeechConfig;

/// Longest text the TTS endpoint accepts in one request.
pub const CHUNK_CHARS: usize = 100;

pub struct SpeechClient {
    endpoint: String,
    max_chars: usize,
    client: reqwest::Client,
}

impl SpeechClient {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            max_chars: config.max_chars,
            client,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Synthesize `text` in `lang` and return MP3 bytes.
    ///
    /// Callers validate with [`prepare_text`] first; empty text is an error here.
    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>> {
        let chunks = split_chunks(text, CHUNK_CHARS);
        if chunks.is_empty() {
            bail!("nothing to speak");
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let resp = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", lang),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                    ("client", "tw-ob"),
                ])
                .send()
                .await
                .context("speech request failed")?;

            if !resp.status().is_success() {
                bail!("speech service error {} on chunk {}/{}", resp.status(), idx + 1, total);
            }
            audio.extend_from_slice(&resp.bytes().await.context("speech body unreadable")?);
        }

        debug!(chunks = chunks.len(), bytes = audio.len(), lang, "speech synthesized");
        Ok(audio)
    }
}

/// Trim `text` and cap it at `max_chars`, ending a truncated text with a
/// full stop. `None` when nothing is left to speak.
pub fn prepare_text(text: &str, max_chars: usize) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > max_chars {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('.');
        Some(cut)
    } else {
        Some(text.to_string())
    }
}

/// Split on whitespace into chunks of at most `max` characters. Words longer
/// than `max` are hard-split.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.push(word.drain(..max).collect());
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + needed > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    #[test]
    fn test_prepare_text() {
        assert_eq!(prepare_text("   ", 10), None);
        assert_eq!(prepare_text("", 10), None);
        assert_eq!(prepare_text(" hi ", 10).as_deref(), Some("hi"));
        assert_eq!(prepare_text("abcdefghijkl", 10).as_deref(), Some("abcdefghij."));
        assert_eq!(prepare_text("abcdefghij", 10).as_deref(), Some("abcdefghij"));
    }

    #[test]
    fn test_split_chunks_on_words() {
        let chunks = split_chunks("merge sort splits the list in half", 12);
        assert_eq!(chunks, vec!["merge sort", "splits the", "list in half"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
    }

    #[test]
    fn test_split_chunks_hard_splits_long_words() {
        let chunks = split_chunks("a bcdefghij k", 4);
        assert_eq!(chunks, vec!["a", "bcde", "fghi", "j k"]);
    }

    #[test]
    fn test_split_chunks_empty() {
        assert!(split_chunks(" \n ", 100).is_empty());
    }

    #[test]
    fn test_split_chunks_counts_chars_not_bytes() {
        let chunks = split_chunks("ééé ééé", 7);
        assert_eq!(chunks, vec!["ééé ééé"]);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_chunks() {
        let app = Router::new().route(
            "/tts",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                format!("[{}:{}]", q.get("idx").cloned().unwrap_or_default(), q["tl"])
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = SpeechClient::new(&SpeechConfig {
            endpoint: format!("http://{}/tts", addr),
            ..SpeechConfig::default()
        })
        .unwrap();
        let text = "word ".repeat(30);
        let audio = client.synthesize(&text, "fr").await.unwrap();
        assert_eq!(String::from_utf8(audio).unwrap(), "[0:fr][1:fr]");
    }

    #[tokio::test]
    async fn test_synthesize_unreachable_is_error() {
        let client = SpeechClient::new(&SpeechConfig {
            endpoint: "http://127.0.0.1:9/tts".to_string(),
            timeout_secs: 2,
            ..SpeechConfig::default()
        })
        .unwrap();
        assert!(client.synthesize("hello", "en").await.is_err());
        assert!(client.synthesize("  ", "en").await.is_err());
    }
}
