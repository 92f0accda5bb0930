//! Error taxonomy for the orchestration engine.
//!
//! Corresponds to spec.md §7 "Error Handling Design". Each failure domain
//! gets its own `thiserror` enum; `CrewError` is the top-level type most
//! public constructors return.

use thiserror::Error;

/// Configuration failures. Surfaced synchronously, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),
    #[error("missing api key for provider {0}")]
    MissingApiKey(String),
    #[error("invalid process configuration: {0}")]
    InvalidProcess(String),
    #[error("max_iterations must be >= 1, got {0}")]
    InvalidMaxIterations(i64),
    #[error("max_execution_time must be > 0 seconds, got {0}")]
    InvalidMaxExecutionTime(i64),
}

/// Tool lookup/execution failures. These stay inside the reasoning loop and
/// are reported back into the transcript rather than aborting the agent.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("ToolNotFound: no tool named '{name}' is available to this agent")]
    NotFound { name: String },
    #[error("invalid parameters for tool '{name}': {message}")]
    InvalidParams { name: String, message: String },
    #[error("tool '{name}' failed: {message}")]
    ExecutionFailed { name: String, message: String },
}

/// LLM provider failures. Transparent to the Agent: any variant is treated
/// as an iteration failure that falls into Task retry semantics.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Agent-level failures surfaced out of the reasoning loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("agent exhausted its iteration/time budget without producing a usable answer")]
    NoFinalAnswer,
    #[error("agent '{agent}' is not permitted to delegate to '{target}'")]
    DelegationNotAllowed { agent: String, target: String },
}

/// Task-level terminal failures. One-to-one with spec.md §7's
/// `DependencyNotMet` / `TaskFailed` / `TaskCancelled` / `TaskTimeout`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Dependencies not met: {missing}")]
    DependencyNotMet { missing: String },
    #[error("{reason}")]
    Cancelled { reason: String },
    #[error("{message}")]
    Failed { message: String },
    #[error("task timed out")]
    Timeout,
}

/// Top-level error type. `Crew::execute` never raises this for task-level
/// failures (those are folded into the `CrewRunSummary`); only
/// configuration errors escape as `Err`.
#[derive(Debug, Error)]
pub enum CrewError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("{0}")]
    Other(String),
}
