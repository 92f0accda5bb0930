//! The `LLMClient` contract (spec.md §6 "External Interfaces").
//!
//! Concrete provider HTTP bindings are external collaborators — this module
//! only specifies the async trait every provider adapter implements, plus a
//! `MockLlmClient` test double used by this crate's own integration tests.
//! Grounded on `llms/base_llm.rs`'s `BaseLLM` trait shape in the teacher,
//! adapted to an async contract since the teacher's `call()` is sync and
//! its timeout/retry plumbing around it is a stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub role: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub model: String,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 2000, stop: Vec::new() }
    }
}

/// Provider-agnostic chat interface. Every concrete adapter (OpenAI,
/// Anthropic, ...) is expected to implement this and nothing more from this
/// crate's point of view.
#[async_trait]
pub trait LLMClient: Send + Sync + std::fmt::Debug {
    async fn chat(&self, messages: Vec<ChatMessage>, options: ChatOptions) -> Result<ChatResponse, LlmError>;

    fn model(&self) -> &str {
        "unknown"
    }

    fn provider(&self) -> &str {
        "unknown"
    }
}

/// A scripted test double. Returns canned responses in order, looping the
/// last one if it runs out, or returns the configured error. Used by this
/// crate's own integration tests and useful to embedders writing their own
/// Crew/Agent tests without a live provider.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockLlmClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Builds a client whose queue mixes scripted failures and successes,
    /// e.g. `[Err(...), Ok("...")]` for a transient-failure-then-success test.
    pub fn scripted(responses: Vec<Result<&str, LlmError>>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(
                responses.into_iter().map(|r| r.map(|s| s.to_string())).collect(),
            ),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMClient for MockLlmClient {
    async fn chat(&self, _messages: Vec<ChatMessage>, _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = {
            let mut q = self.responses.lock();
            q.pop_front()
        };
        let content = match next {
            Some(result) => result?,
            None => "FINAL_ANSWER[no more scripted responses]".to_string(),
        };
        Ok(ChatResponse {
            content,
            role: "assistant".into(),
            finish_reason: FinishReason::Stop,
            usage: Usage { prompt_tokens: 10, completion_tokens: 10, total_tokens: 20 },
            model: "mock".into(),
            provider: "mock".into(),
        })
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
