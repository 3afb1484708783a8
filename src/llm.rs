//! Text generation for scoring and summaries.
//!
//! Defines the [`TextGenerator`] trait and the Amazon Bedrock implementation.
//! Bedrock is called with the Anthropic messages body over a SigV4-signed
//! `POST /model/{model_id}/invoke`.
//!
//! The generator is only built when AWS credentials are present in the
//! environment; otherwise [`create_generator`] returns `None` and curation
//! runs without scoring or summaries.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CurationConfig;
use crate::sigv4::{self, AwsCredentials, SigningInput};

/// A prompt-in, text-out language model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Generate a completion for a single user prompt.
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// Build the configured generator, or `None` when curation is disabled or
/// credentials are missing.
pub fn create_generator(config: &CurationConfig) -> Option<Arc<dyn TextGenerator>> {
    if !config.enabled {
        info!("curation disabled by config");
        return None;
    }
    match BedrockGenerator::from_env(config) {
        Ok(generator) => {
            info!(model = generator.model_name(), "bedrock curation enabled");
            Some(Arc::new(generator))
        }
        Err(e) => {
            info!("bedrock curation unavailable: {:#}", e);
            None
        }
    }
}

pub struct BedrockGenerator {
    model_id: String,
    region: String,
    endpoint: String,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl BedrockGenerator {
    pub fn new(config: &CurationConfig, creds: AwsCredentials) -> Result<Self> {
        let region = config.resolved_region();
        let endpoint = config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model_id: config.resolved_model_id(),
            region,
            endpoint,
            creds,
            client,
        })
    }

    pub fn from_env(config: &CurationConfig) -> Result<Self> {
        Self::new(config, AwsCredentials::from_env()?)
    }
}

#[async_trait]
impl TextGenerator for BedrockGenerator {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
        });
        let payload = serde_json::to_vec(&body)?;

        let host = sigv4::endpoint_host(&self.endpoint);
        let path = format!("/model/{}/invoke", sigv4::uri_encode(&self.model_id));
        // Non-S3 services sign the path encoded a second time.
        let canonical_uri = sigv4::encode_path(&path);

        let headers = sigv4::sign(
            SigningInput {
                method: "POST",
                host: &host,
                canonical_uri: &canonical_uri,
                canonical_query: "",
                payload: &payload,
                region: &self.region,
                service: "bedrock",
                extra_headers: vec![
                    ("content-type".to_string(), "application/json".to_string()),
                    ("accept".to_string(), "application/json".to_string()),
                ],
            },
            &self.creds,
            Utc::now(),
        );

        let url = format!("{}://{}{}", sigv4::endpoint_scheme(&self.endpoint), host, path);
        let mut req = self.client.post(&url).body(payload);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let resp = req.send().await.context("bedrock request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "bedrock error {}: {}",
                status,
                text.chars().take(500).collect::<String>()
            );
        }

        let json: Value = resp.json().await.context("bedrock returned invalid JSON")?;
        let text = parse_messages_response(&json)?;
        debug!(model = %self.model_id, chars = text.len(), "bedrock completion");
        Ok(text)
    }
}

/// Extract the first text block from an Anthropic messages response.
pub fn parse_messages_response(json: &Value) -> Result<String> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("invalid bedrock response: no text content block"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_messages_response_picks_text_block() {
        let body = json!({
            "content": [
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "0,0.9,0.8,0.95"}
            ]
        });
        assert_eq!(parse_messages_response(&body).unwrap(), "0,0.9,0.8,0.95");
    }

    #[test]
    fn test_parse_messages_response_without_text() {
        assert!(parse_messages_response(&json!({"content": []})).is_err());
        assert!(parse_messages_response(&json!({"message": "denied"})).is_err());
    }

    #[test]
    fn test_disabled_config_has_no_generator() {
        let config = CurationConfig {
            enabled: false,
            ..CurationConfig::default()
        };
        assert!(create_generator(&config).is_none());
    }

    #[test]
    fn test_endpoint_defaults_to_region() {
        let config = CurationConfig {
            region: Some("us-west-2".to_string()),
            ..CurationConfig::default()
        };
        let creds = AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        let generator = BedrockGenerator::new(&config, creds).unwrap();
        assert_eq!(generator.endpoint, "https://bedrock-runtime.us-west-2.amazonaws.com");
        assert_eq!(generator.region, "us-west-2");
    }
}
