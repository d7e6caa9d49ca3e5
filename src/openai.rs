use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;

use crate::config::ProviderSettings;
use crate::error::{JudgeError, JudgeResult};
use crate::evaluation::{JudgeClient, ScoringRequest, parse_structured_score};
use crate::judge::Provider;
use crate::models::Score;

/// Judge backed by the OpenAI chat completions API in JSON mode
pub struct OpenAIJudge {
    client: Client<OpenAIConfig>,
    max_tokens: u16,
}

impl OpenAIJudge {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, max_tokens: u32) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        // SDK retries off; RetryExecutor owns the policy
        let no_backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(openai_config).with_backoff(no_backoff),
            max_tokens: u16::try_from(max_tokens).unwrap_or(u16::MAX),
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

    /// Build the JSON-mode chat completion request
    fn build_request(&self, model: &str, prompt: String) -> JudgeResult<CreateChatCompletionRequest> {
        let user_message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| JudgeError::Configuration(format!("Failed to build user message: {}", e)))?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([user_message])
            .response_format(ResponseFormat::JsonObject)
            .max_tokens(self.max_tokens)
            .temperature(0.0)
            .build()
            .map_err(|e| JudgeError::Configuration(format!("Failed to build judge request: {}", e)))
    }

    /// Extract content from the completion
    fn extract_content(response: CreateChatCompletionResponse) -> JudgeResult<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| JudgeError::Parse("judge returned no content".to_string()))
    }
}

/// Map SDK errors onto the retry taxonomy
fn classify(err: OpenAIError) -> JudgeError {
    match err {
        OpenAIError::Reqwest(e) => JudgeError::from(e),
        OpenAIError::ApiError(api) => match api.r#type.as_deref() {
            Some("rate_limit_exceeded" | "requests" | "tokens") => JudgeError::RateLimited {
                retry_after: None,
                message: api.message,
            },
            // server errors carry no type
            Some("server_error") | None => JudgeError::Transport(api.message),
            Some(_) => JudgeError::Rejected(api.message),
        },
        // an undecodable envelope is a gateway or server fault, not judge output
        OpenAIError::JSONDeserialize(e) => {
            JudgeError::Transport(format!("malformed completion response: {}", e))
        }
        other => JudgeError::Transport(other.to_string()),
    }
}

#[async_trait]
impl JudgeClient for OpenAIJudge {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn score(&self, model: &str, request: &ScoringRequest<'_>) -> JudgeResult<Score> {
        let chat_request = self.build_request(model, request.prompt())?;

        tracing::debug!(model, dimension = %request.dimension, "requesting OpenAI judgement");
        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(classify)?;

        let content = Self::extract_content(response)?;
        parse_structured_score(&content)
    }
}
