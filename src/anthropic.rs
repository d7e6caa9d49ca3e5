use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderSettings;
use crate::error::{JudgeError, JudgeResult};
use crate::evaluation::{JudgeClient, ScoringRequest, parse_free_text_score};
use crate::judge::Provider;
use crate::models::Score;

const API_VERSION: &str = "2023-06-01";

/// Judge backed by the Anthropic Messages API.
///
/// The API has no JSON mode, so the reply is free text and the score is taken
/// from the first JSON object found in it.
pub struct AnthropicJudge {
    api_key: String,
    base_url: String,
    http_client: Client,
    max_tokens: u32,
}

impl AnthropicJudge {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: Client::new(),
            max_tokens,
        }
    }

    /// Create the client from provider settings, reading the API key from the environment
    pub fn from_settings(settings: &ProviderSettings) -> JudgeResult<Self> {
        let api_key = std::env::var(&settings.env_var_api_key).map_err(|_| {
            JudgeError::Configuration(format!(
                "Environment variable {} not found",
                settings.env_var_api_key
            ))
        })?;

        Ok(Self::new(api_key, &settings.api_endpoint, settings.max_tokens))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<RequestMessage>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into a classified error
async fn error_from_response(response: reqwest::Response) -> JudgeError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    match status.as_u16() {
        429 => JudgeError::RateLimited {
            retry_after,
            message,
        },
        // 529 is Anthropic's "overloaded"
        408 | 500..=599 => JudgeError::Unavailable {
            status: status.as_u16(),
            message,
        },
        code => JudgeError::Api {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl JudgeClient for AnthropicJudge {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn score(&self, model: &str, request: &ScoringRequest<'_>) -> JudgeResult<Score> {
        let body = MessagesRequest {
            model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![RequestMessage {
                role: "user",
                content: request.prompt(),
            }],
        };

        tracing::debug!(model, dimension = %request.dimension, "requesting Anthropic judgement");
        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let api_response: MessagesResponse = response.json().await?;
        let text = api_response
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        parse_free_text_score(&text)
    }
}
