//! HumanGate: blocking human-in-the-loop interactions (spec.md §4.9).
//!
//! The teacher has no equivalent module — Agent/Task/Crew here all stub
//! human involvement out entirely. Built fresh against spec.md's contract,
//! following the teacher's general trait-for-pluggable-backend shape
//! (`BaseLLM`, `BaseTool`) for the `InputSource` seam so tests never touch
//! stdin.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionType {
    Approval,
    Input,
    Choice,
    Review,
    Confirmation,
    Feedback,
}

#[derive(Debug, Clone)]
pub struct HumanInteraction {
    pub id: Uuid,
    pub interaction_type: InteractionType,
    pub prompt: String,
    pub options: Vec<String>,
    pub response: Option<String>,
    pub auto_answered: bool,
    pub created_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Modify,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFailureDecision {
    RetrySame,
    RetryWithNewParams,
    Skip,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    AgentRevise,
    HumanSupplied(String),
}

/// Pluggable source of human responses. Production embedders implement this
/// over a real terminal/UI channel; tests use `FixedSource`/`ScriptedSource`.
#[async_trait]
pub trait InputSource: Send + Sync + std::fmt::Debug {
    /// Returns `None` on timeout or when running non-interactively.
    async fn read_line(&self, prompt: &str, timeout: Duration) -> Option<String>;
}

/// Always returns the same canned answer, instantly. Useful for
/// auto-approve/auto-reject test scenarios.
#[derive(Debug)]
pub struct FixedSource(pub String);

#[async_trait]
impl InputSource for FixedSource {
    async fn read_line(&self, _prompt: &str, _timeout: Duration) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Returns successive canned answers in order, then falls back to `None`
/// (simulating timeout/non-interactive) once exhausted.
#[derive(Debug)]
pub struct ScriptedSource {
    queue: Mutex<VecDeque<String>>,
}

impl ScriptedSource {
    pub fn new(answers: Vec<&str>) -> Self {
        Self { queue: Mutex::new(answers.into_iter().map(String::from).collect()) }
    }
}

#[async_trait]
impl InputSource for ScriptedSource {
    async fn read_line(&self, _prompt: &str, _timeout: Duration) -> Option<String> {
        self.queue.lock().pop_front()
    }
}

/// Never responds — every call acts like a timeout/non-interactive run.
#[derive(Debug, Default)]
pub struct NonInteractiveSource;

#[async_trait]
impl InputSource for NonInteractiveSource {
    async fn read_line(&self, _prompt: &str, _timeout: Duration) -> Option<String> {
        None
    }
}

fn parse_approval(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "y" | "approve" | "ok" | "continue" => Some(true),
        "no" | "n" | "reject" | "cancel" | "abort" => Some(false),
        _ => None,
    }
}

pub struct HumanGate {
    pub default_timeout: Duration,
    /// Default used when a prompt times out or runs non-interactively.
    pub default_approval: bool,
    source: Arc<dyn InputSource>,
    log: Mutex<Vec<HumanInteraction>>,
}

impl std::fmt::Debug for HumanGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanGate")
            .field("default_timeout", &self.default_timeout)
            .field("default_approval", &self.default_approval)
            .finish_non_exhaustive()
    }
}

impl HumanGate {
    pub fn new(source: Arc<dyn InputSource>) -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            default_approval: true,
            source,
            log: Mutex::new(Vec::new()),
        }
    }

    /// A gate that never blocks and always approves/accepts defaults —
    /// the non-interactive mode of spec.md §4.9.
    pub fn auto_approve() -> Self {
        Self::new(Arc::new(NonInteractiveSource))
    }

    pub fn with_fixed_response(response: impl Into<String>) -> Self {
        Self::new(Arc::new(FixedSource(response.into())))
    }

    fn record(&self, interaction_type: InteractionType, prompt: &str, options: Vec<String>, response: Option<String>, auto: bool, started: DateTime<Utc>) {
        self.log.lock().push(HumanInteraction {
            id: Uuid::new_v4(),
            interaction_type,
            prompt: prompt.to_string(),
            options,
            response,
            auto_answered: auto,
            created_at: started,
            elapsed: (Utc::now() - started).to_std().unwrap_or_default(),
        });
    }

    pub fn interactions(&self) -> Vec<HumanInteraction> {
        self.log.lock().clone()
    }

    pub async fn approval(&self, prompt: &str) -> bool {
        let started = Utc::now();
        let raw = self.source.read_line(prompt, self.default_timeout).await;
        let (approved, auto) = match raw.as_deref().and_then(parse_approval) {
            Some(b) => (b, false),
            None => (self.default_approval, true),
        };
        self.record(InteractionType::Approval, prompt, vec![], raw, auto, started);
        approved
    }

    pub async fn confirmation(&self, prompt: &str) -> bool {
        self.approval(prompt).await
    }

    pub async fn input(&self, prompt: &str) -> String {
        let started = Utc::now();
        let raw = self.source.read_line(prompt, self.default_timeout).await;
        let auto = raw.is_none();
        let value = raw.clone().unwrap_or_default();
        self.record(InteractionType::Input, prompt, vec![], raw, auto, started);
        value
    }

    /// Non-blocking variant used for mid-reasoning-loop guidance collection:
    /// a short timeout, and `None` on timeout rather than a default string.
    pub async fn input_with_timeout(&self, prompt: &str, timeout: Duration) -> Option<String> {
        let started = Utc::now();
        let raw = self.source.read_line(prompt, timeout).await;
        let auto = raw.is_none();
        self.record(InteractionType::Input, prompt, vec![], raw.clone(), auto, started);
        raw
    }

    pub async fn choice(&self, prompt: &str, options: &[String]) -> String {
        let started = Utc::now();
        let raw = self.source.read_line(prompt, self.default_timeout).await;
        let auto = raw.is_none();
        let chosen = match &raw {
            None => options.first().cloned().unwrap_or_default(),
            Some(answer) => resolve_choice(answer, options).unwrap_or_else(|| options.first().cloned().unwrap_or_default()),
        };
        self.record(InteractionType::Choice, prompt, options.to_vec(), raw, auto, started);
        chosen
    }

    pub async fn review(&self, content: &str) -> ReviewDecision {
        let started = Utc::now();
        let prompt = format!("Review this result and respond with accept/revise/<replacement text>:\n{content}");
        let raw = self.source.read_line(&prompt, self.default_timeout).await;
        let auto = raw.is_none();
        let decision = match raw.as_deref() {
            None => ReviewDecision::Accept,
            Some(s) if s.trim().eq_ignore_ascii_case("accept") => ReviewDecision::Accept,
            Some(s) if s.trim().eq_ignore_ascii_case("revise") => ReviewDecision::AgentRevise,
            Some(s) => ReviewDecision::HumanSupplied(s.to_string()),
        };
        self.record(InteractionType::Review, &prompt, vec![], raw, auto, started);
        decision
    }

    pub async fn feedback(&self, prompt: &str) -> String {
        self.input(prompt).await
    }

    pub async fn retry_decision(&self, prompt: &str) -> RetryDecision {
        let started = Utc::now();
        let options = vec!["retry".to_string(), "modify".to_string(), "abort".to_string()];
        let raw = self.source.read_line(prompt, self.default_timeout).await;
        let auto = raw.is_none();
        let decision = match raw.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(ref s) if s == "abort" => RetryDecision::Abort,
            Some(ref s) if s == "modify" => RetryDecision::Modify,
            _ => RetryDecision::Retry,
        };
        self.record(InteractionType::Approval, prompt, options, raw, auto, started);
        decision
    }

    pub async fn tool_failure_decision(&self, prompt: &str) -> ToolFailureDecision {
        let started = Utc::now();
        let options = vec!["retry_same".to_string(), "retry_new_params".to_string(), "skip".to_string(), "abort".to_string()];
        let raw = self.source.read_line(prompt, self.default_timeout).await;
        let auto = raw.is_none();
        let decision = match raw.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(ref s) if s == "retry_same" => ToolFailureDecision::RetrySame,
            Some(ref s) if s == "retry_new_params" => ToolFailureDecision::RetryWithNewParams,
            Some(ref s) if s == "abort" => ToolFailureDecision::Abort,
            _ => ToolFailureDecision::Skip,
        };
        self.record(InteractionType::Approval, prompt, options, raw, auto, started);
        decision
    }
}

fn resolve_choice(answer: &str, options: &[String]) -> Option<String> {
    let trimmed = answer.trim();
    if let Ok(idx) = trimmed.parse::<usize>() {
        if idx >= 1 && idx <= options.len() {
            return Some(options[idx - 1].clone());
        }
    }
    options
        .iter()
        .find(|o| o.to_lowercase() == trimmed.to_lowercase())
        .or_else(|| options.iter().find(|o| o.to_lowercase().contains(&trimmed.to_lowercase())))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approval_parses_keywords_case_insensitively() {
        let gate = HumanGate::with_fixed_response("YES");
        assert!(gate.approval("proceed?").await);
        let gate = HumanGate::with_fixed_response("no");
        assert!(!gate.approval("proceed?").await);
    }

    #[tokio::test]
    async fn non_interactive_uses_default() {
        let gate = HumanGate::auto_approve();
        assert!(gate.approval("proceed?").await);
        let interactions = gate.interactions();
        assert_eq!(interactions.len(), 1);
        assert!(interactions[0].auto_answered);
    }

    #[tokio::test]
    async fn choice_resolves_numeric_and_substring() {
        let options = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let gate = HumanGate::with_fixed_response("2");
        assert_eq!(gate.choice("pick", &options).await, "beta");
        let gate = HumanGate::with_fixed_response("gam");
        assert_eq!(gate.choice("pick", &options).await, "gamma");
    }
}
