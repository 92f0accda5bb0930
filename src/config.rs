//! Typed configuration surface.
//!
//! This crate does not read environment variables or config files — that
//! loading step belongs to an embedder. What it does define is the shape of
//! the configuration an embedder hands in, and validates it so
//! `ConfigError` has something concrete to report. Grounded on
//! `Agent::create_llm_instance`'s provider-string parsing in the teacher.

use crate::error::ConfigError;
use std::time::Duration;

/// Recognized LLM providers. An embedder's concrete `LLMClient` is free to
/// support others; this enum only covers what `ProviderKind::parse` accepts
/// when inferring a provider from a bare model name, mirroring the teacher's
/// `create_llm_instance` prefix heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Xai,
}

impl ProviderKind {
    /// Parses a `"provider/model"` string, or infers the provider from a
    /// bare model name's prefix (`claude` -> Anthropic, `grok` -> Xai,
    /// `gemini` -> Gemini, anything else -> OpenAI).
    pub fn parse(model: &str) -> (ProviderKind, String) {
        if let Some((provider, rest)) = model.split_once('/') {
            let kind = match provider {
                "openai" => ProviderKind::OpenAi,
                "anthropic" => ProviderKind::Anthropic,
                "gemini" => ProviderKind::Gemini,
                "xai" => ProviderKind::Xai,
                other => {
                    log::warn!("unrecognized llm provider prefix '{other}', defaulting to openai");
                    ProviderKind::OpenAi
                }
            };
            return (kind, rest.to_string());
        }
        let lower = model.to_lowercase();
        let kind = if lower.starts_with("claude") {
            ProviderKind::Anthropic
        } else if lower.starts_with("grok") {
            ProviderKind::Xai
        } else if lower.starts_with("gemini") {
            ProviderKind::Gemini
        } else {
            ProviderKind::OpenAi
        };
        (kind, model.to_string())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Xai => "xai",
        }
    }
}

/// Configuration for a concrete `LLMClient` an embedder constructs. This
/// crate only validates the shape; it never dials out.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let (provider, model) = ProviderKind::parse(&model);
        Self {
            provider,
            model,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Agent-level execution bounds. Validated once at construction time.
#[derive(Debug, Clone, Copy)]
pub struct AgentLimits {
    pub max_iterations: u32,
    pub max_execution_time: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_execution_time: Duration::from_secs(180),
        }
    }
}

impl AgentLimits {
    pub fn validate(max_iterations: i64, max_execution_time_secs: i64) -> Result<Self, ConfigError> {
        if max_iterations < 1 {
            return Err(ConfigError::InvalidMaxIterations(max_iterations));
        }
        if max_execution_time_secs <= 0 {
            return Err(ConfigError::InvalidMaxExecutionTime(max_execution_time_secs));
        }
        Ok(Self {
            max_iterations: max_iterations as u32,
            max_execution_time: Duration::from_secs(max_execution_time_secs as u64),
        })
    }
}
