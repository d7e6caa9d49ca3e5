use crate::config::JudgeMapping;
use crate::error::{JudgeError, JudgeResult};
use serde::Serialize;
use std::fmt;

/// Backend family that either produced a response or judges one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

const OPENAI_PREFIXES: &[&str] = &["gpt-", "o1-", "o3-", "o4-", "chatgpt-"];
const ANTHROPIC_PREFIXES: &[&str] = &["claude-"];

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAI, Provider::Anthropic];

    /// Name used as a key in the judge mapping tables
    pub fn name(self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    pub fn from_name(name: &str) -> JudgeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.name() == name)
            .ok_or_else(|| JudgeError::Configuration(format!("Unknown judge provider: {}", name)))
    }

    /// Infer the provider from a model name's naming convention
    pub fn for_model(model: &str) -> JudgeResult<Self> {
        if OPENAI_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
            Ok(Provider::OpenAI)
        } else if ANTHROPIC_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
            Ok(Provider::Anthropic)
        } else {
            Err(JudgeError::Configuration(format!(
                "Unknown model provider for: {}",
                model
            )))
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Judge chosen for one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeAssignment {
    pub provider: Provider,
    pub model: String,
}

/// Pick the judge provider and model for a response produced by `response_model`.
pub fn resolve(response_model: &str, mapping: &JudgeMapping) -> JudgeResult<JudgeAssignment> {
    let response_provider = Provider::for_model(response_model)?;

    let judge_name = mapping
        .judge_mapping
        .get(response_provider.name())
        .ok_or_else(|| {
            JudgeError::Configuration(format!(
                "No judge provider mapped for response provider '{}'",
                response_provider
            ))
        })?;
    let judge_provider = Provider::from_name(judge_name)?;

    let judge_model = mapping
        .judge_models
        .get(judge_provider.name())
        .ok_or_else(|| {
            JudgeError::Configuration(format!(
                "No judge model configured for judge provider '{}'",
                judge_provider
            ))
        })?;

    Ok(JudgeAssignment {
        provider: judge_provider,
        model: judge_model.clone(),
    })
}
