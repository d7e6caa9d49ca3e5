use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Routing tables deciding which provider judges which responses
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JudgeMapping {
    /// Response provider name -> judge provider name
    pub judge_mapping: BTreeMap<String, String>,
    /// Judge provider name -> judge model identifier
    pub judge_models: BTreeMap<String, String>,
}

/// Connection settings for one judge backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// API endpoint
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Maximum tokens the judge may generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    256
}

fn default_openai_settings() -> ProviderSettings {
    ProviderSettings {
        api_endpoint: "https://api.openai.com/v1".to_string(),
        env_var_api_key: "OPENAI_API_KEY".to_string(),
        max_tokens: default_max_tokens(),
    }
}

fn default_anthropic_settings() -> ProviderSettings {
    ProviderSettings {
        api_endpoint: "https://api.anthropic.com/v1".to_string(),
        env_var_api_key: "ANTHROPIC_API_KEY".to_string(),
        max_tokens: default_max_tokens(),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_settings")]
    pub openai: ProviderSettings,
    #[serde(default = "default_anthropic_settings")]
    pub anthropic: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai_settings(),
            anthropic: default_anthropic_settings(),
        }
    }
}

/// Retry settings as written in the config file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_max_elapsed_ms() -> u64 {
    120_000
}

fn default_attempt_timeout_ms() -> u64 {
    60_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            jitter: self.jitter,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Root configuration for a judging run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(flatten)]
    pub mapping: JudgeMapping,
    /// Number of examples scored at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        ensure!(
            self.retry.max_attempts >= 1,
            "retry.max_attempts must be at least 1"
        );
        Ok(())
    }
}
