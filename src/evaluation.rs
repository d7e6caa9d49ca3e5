use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::anthropic::AnthropicJudge;
use crate::config::Config;
use crate::error::{JudgeError, JudgeResult};
use crate::judge::Provider;
use crate::models::{Dimension, Score};
use crate::openai::OpenAIJudge;

pub const RELEVANCE_RUBRIC: &str = "
Rate the relevance of this support bot response on a 1-5 scale:
- 5: Directly addresses the ticket issue, technically accurate, no irrelevant information
- 4: Addresses the issue correctly, minor omissions or slightly tangential details
- 3: Partially relevant, misses key aspects or includes notable off-topic content
- 2: Loosely related but doesn't solve the actual problem
- 1: Completely off-topic or technically incorrect
";

pub const TONE_RUBRIC: &str = "
Rate the tone of this support bot response on a 1-5 scale:
- 5: Professional and concise - clear, direct, no fluff
- 4: Mostly professional/concise, minor verbosity or slight tone issues
- 3: Acceptable but noticeably verbose, overly casual, or slightly robotic
- 2: Too informal, too wordy, or awkwardly phrased
- 1: Unprofessional, confusing, or inappropriate tone
";

pub fn rubric(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Relevance => RELEVANCE_RUBRIC,
        Dimension::Tone => TONE_RUBRIC,
    }
}

/// What a judge is asked to score
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub ticket: &'a str,
    pub response: &'a str,
    pub dimension: Dimension,
}

impl ScoringRequest<'_> {
    /// Build the judge prompt for this request
    pub fn prompt(&self) -> String {
        format!(
            "You are evaluating a support bot response for {dimension}.\n\n\
             TICKET:\n{ticket}\n\n\
             RESPONSE:\n{response}\n\n\
             {rubric}\n\
             Respond with JSON: {{\"score\": <1-5>, \"reasoning\": \"<brief explanation>\"}}",
            dimension = self.dimension,
            ticket = self.ticket,
            response = self.response,
            rubric = rubric(self.dimension),
        )
    }
}

/// A judge backend able to score one dimension of one response
#[async_trait]
pub trait JudgeClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Submit one scoring prompt to `model` and parse the verdict
    async fn score(&self, model: &str, request: &ScoringRequest<'_>) -> JudgeResult<Score>;
}

/// Parse a judge reply that must consist of a single JSON object
pub fn parse_structured_score(content: &str) -> JudgeResult<Score> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| JudgeError::Parse(format!("judge output is not valid JSON: {}", e)))?;
    score_from_value(&value)
}

/// Parse a free-text judge reply, using the first JSON object found in it
pub fn parse_free_text_score(content: &str) -> JudgeResult<Score> {
    let value = find_json_object(content)
        .ok_or_else(|| JudgeError::Parse("no JSON object found in judge output".to_string()))?;
    score_from_value(&value)
}

/// Locate the first complete JSON object embedded in `text`
fn find_json_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}

fn score_from_value(value: &Value) -> JudgeResult<Score> {
    let object = value
        .as_object()
        .ok_or_else(|| JudgeError::Parse("judge output is not a JSON object".to_string()))?;

    let raw_score = object
        .get("score")
        .ok_or_else(|| JudgeError::Parse("missing 'score' field".to_string()))?;
    let score = raw_score.as_i64().ok_or_else(|| {
        JudgeError::Parse(format!("'score' must be an integer, got {}", raw_score))
    })?;

    let reasoning = object
        .get("reasoning")
        .ok_or_else(|| JudgeError::Parse("missing 'reasoning' field".to_string()))?
        .as_str()
        .ok_or_else(|| JudgeError::Parse("'reasoning' must be a string".to_string()))?;

    Score::new(score, reasoning)
}

/// Judge clients keyed by provider, built once per run
#[derive(Default)]
pub struct JudgeRegistry {
    clients: HashMap<Provider, Arc<dyn JudgeClient>>,
    /// Why a provider has no client
    unavailable: HashMap<Provider, String>,
}

impl JudgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client for every judge provider the mapping routes to.
    ///
    /// A provider whose client cannot be built is remembered as unavailable so
    /// only the examples routed to it fail.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        for name in config.mapping.judge_mapping.values() {
            let Ok(provider) = Provider::from_name(name) else {
                // reported per example by the resolver
                continue;
            };
            if registry.clients.contains_key(&provider) || registry.unavailable.contains_key(&provider) {
                continue;
            }

            let client: JudgeResult<Arc<dyn JudgeClient>> = match provider {
                Provider::OpenAI => OpenAIJudge::from_settings(&config.providers.openai)
                    .map(|c| Arc::new(c) as Arc<dyn JudgeClient>),
                Provider::Anthropic => AnthropicJudge::from_settings(&config.providers.anthropic)
                    .map(|c| Arc::new(c) as Arc<dyn JudgeClient>),
            };

            match client {
                Ok(client) => {
                    tracing::debug!(provider = %provider, "judge client ready");
                    registry = registry.with_client(client);
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "judge client unavailable");
                    registry.unavailable.insert(provider, e.to_string());
                }
            }
        }

        registry
    }

    pub fn with_client(mut self, client: Arc<dyn JudgeClient>) -> Self {
        let provider = client.provider();
        self.unavailable.remove(&provider);
        self.clients.insert(provider, client);
        self
    }

    pub fn get(&self, provider: Provider) -> JudgeResult<&Arc<dyn JudgeClient>> {
        self.clients.get(&provider).ok_or_else(|| {
            let reason = self
                .unavailable
                .get(&provider)
                .map(String::as_str)
                .unwrap_or("no client configured");
            JudgeError::Configuration(format!(
                "No judge client for provider '{}': {}",
                provider, reason
            ))
        })
    }
}
