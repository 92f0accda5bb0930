//! `Task`: a stateful unit of work bound to an agent (spec.md §4.6).
//!
//! Keeps the teacher's `Task` struct shape (status/timestamps/retry_count,
//! `context` as a list of prerequisite identifiers, `key()` MD5 hashing,
//! `interpolate_inputs`) but the actual execution semantics — dependency
//! enforcement, retry-with-backoff, human-confirmation gating, review
//! points — are written fresh: the teacher's `execute_sync` has none of
//! this (no dependency check, no retry loop, no human-gate calls at all).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::TaskError;
use crate::human::{HumanGate, ReviewDecision, RetryDecision};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A point-in-time view of a prerequisite task, used to check dependency
/// satisfaction and to render the context block handed to the dependent
/// task's agent. Deliberately decoupled from `Task` itself so callers
/// (Process strategies, AsyncExecutor) can assemble it without fighting the
/// borrow checker over `&mut` access to the task currently executing.
#[derive(Debug, Clone)]
pub struct DependencySnapshot {
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<String>,
}

/// Renders the completed/incomplete prerequisite context block. Pure and
/// idempotent: calling it twice on the same snapshots produces identical
/// text.
pub fn render_context_data(deps: &[DependencySnapshot]) -> String {
    if deps.is_empty() {
        return String::new();
    }
    deps.iter()
        .map(|d| match (&d.status, &d.result) {
            (TaskStatus::Completed, Some(result)) => format!("Task: {}\nResult: {}\n---", d.name, result),
            _ => format!("Task: {}\nStatus: {}\n---", d.name, d.status),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns `Err(missing_names)` when any prerequisite has not reached
/// `Completed`.
pub fn check_dependencies(deps: &[DependencySnapshot]) -> Result<(), Vec<String>> {
    let missing: Vec<String> = deps
        .iter()
        .filter(|d| d.status != TaskStatus::Completed)
        .map(|d| d.name.clone())
        .collect();
    if missing.is_empty() { Ok(()) } else { Err(missing) }
}

pub type TaskCallback = Arc<dyn Fn(&Task) + Send + Sync>;
/// Invoked after every agent reasoning iteration, independent of the
/// per-task `callback` above which only fires on terminal transitions.
pub type StepCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub expected_output: Option<String>,
    pub agent: Option<String>,
    pub dependencies: Vec<String>,
    pub tools: Vec<String>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub require_human_confirmation: bool,
    pub human_input: bool,
    pub review_points: Vec<String>,
    pub callback: Option<TaskCallback>,
    original_description: String,
    original_expected_output: Option<String>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("agent", &self.agent)
            .field("dependencies", &self.dependencies)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.clone(),
            expected_output: None,
            agent: None,
            dependencies: Vec::new(),
            tools: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
            start_time: None,
            end_time: None,
            retry_count: 0,
            max_retries: 2,
            require_human_confirmation: false,
            human_input: false,
            review_points: Vec::new(),
            callback: None,
            original_description: description,
            original_expected_output: None,
        }
    }

    pub fn with_agent(mut self, role: impl Into<String>) -> Self {
        self.agent = Some(role.into());
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.original_expected_output = Some(expected.clone());
        self.expected_output = Some(expected);
        self
    }

    pub fn with_dependency(mut self, task_name: impl Into<String>) -> Self {
        self.dependencies.push(task_name.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `{key}`-style templating over description/expected_output, applied
    /// once against the originals so repeated calls don't compound.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, String>) {
        self.description = interpolate_string(&self.original_description, inputs);
        if let Some(original) = &self.original_expected_output {
            self.expected_output = Some(interpolate_string(original, inputs));
        }
    }

    /// MD5 of `description|expected_output`, using the originals when the
    /// task has been interpolated so the key is stable across template runs.
    pub fn key(&self) -> String {
        let expected = self.original_expected_output.as_deref().unwrap_or("");
        crate::memory::content_hash(&format!("{}|{}", self.original_description, expected))
    }

    pub fn execution_time(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Runs this task to completion, honoring human-confirmation gating,
    /// dependency enforcement, retry-with-backoff, and review points.
    pub async fn execute(
        &mut self,
        deps: &[DependencySnapshot],
        agent: Arc<AsyncMutex<Agent>>,
        tools: Arc<ToolRegistry>,
        human_gate: Arc<HumanGate>,
        step_callback: Option<StepCallback>,
    ) -> Result<String, TaskError> {
        loop {
            self.status = TaskStatus::Running;
            self.start_time = Some(Utc::now());

            if self.require_human_confirmation {
                let approved = human_gate
                    .confirmation(&format!("Approve execution of task '{}'?", self.name))
                    .await;
                if !approved {
                    let reason = format!("approval was denied for task '{}'", self.name);
                    self.status = TaskStatus::Cancelled;
                    self.end_time = Some(Utc::now());
                    self.result = Some(format!("Task cancelled by human: {reason}"));
                    self.invoke_callback();
                    return Err(TaskError::Cancelled { reason });
                }
            }

            if let Err(missing) = check_dependencies(deps) {
                self.status = TaskStatus::Failed;
                self.end_time = Some(Utc::now());
                let missing_joined = missing.join(", ");
                self.result = Some(format!("Dependencies not met: {missing_joined}"));
                self.invoke_callback();
                return Err(TaskError::DependencyNotMet { missing: missing_joined });
            }

            let context_data = render_context_data(deps);
            let allowed_tools = self.tools.clone();

            let attempt = {
                let mut guard = agent.lock().await;
                guard
                    .execute_task(self, &context_data, &allowed_tools, tools.as_ref(), human_gate.as_ref(), step_callback.as_ref())
                    .await
            };

            match attempt {
                Ok(raw_result) => {
                    let final_result = self
                        .apply_review(raw_result, &agent, &context_data, &allowed_tools, &tools, &human_gate, step_callback.as_ref())
                        .await;
                    self.status = TaskStatus::Completed;
                    self.end_time = Some(Utc::now());
                    self.result = Some(final_result.clone());
                    self.invoke_callback();
                    return Ok(final_result);
                }
                Err(agent_err) => {
                    if self.retry_count < self.max_retries {
                        self.retry_count += 1;
                        if self.human_input {
                            let decision = human_gate
                                .retry_decision(&format!("Task '{}' failed: {agent_err}. Retry?", self.name))
                                .await;
                            if decision == RetryDecision::Abort {
                                self.status = TaskStatus::Failed;
                                self.end_time = Some(Utc::now());
                                let message = format!("aborted by human after failure: {agent_err}");
                                self.result = Some(message.clone());
                                self.invoke_callback();
                                return Err(TaskError::Failed { message });
                            }
                        }
                        let backoff_secs = 2u64.saturating_pow(self.retry_count.min(16));
                        sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }
                    self.status = TaskStatus::Failed;
                    self.end_time = Some(Utc::now());
                    let message = agent_err.to_string();
                    self.result = Some(message.clone());
                    self.invoke_callback();
                    return Err(TaskError::Failed { message });
                }
            }
        }
    }

    async fn apply_review(
        &self,
        result: String,
        agent: &Arc<AsyncMutex<Agent>>,
        context_data: &str,
        allowed_tools: &[String],
        tools: &Arc<ToolRegistry>,
        human_gate: &Arc<HumanGate>,
        step_callback: Option<&StepCallback>,
    ) -> String {
        if !self.review_points.iter().any(|p| p == "completion") {
            return result;
        }
        match human_gate.review(&result).await {
            ReviewDecision::Accept => result,
            ReviewDecision::HumanSupplied(text) => text,
            ReviewDecision::AgentRevise => {
                let revision_context = format!("{context_data}\n\nPlease revise based on reviewer feedback.");
                let mut guard = agent.lock().await;
                guard
                    .execute_task(self, &revision_context, allowed_tools, tools.as_ref(), human_gate.as_ref(), step_callback)
                    .await
                    .unwrap_or(result)
            }
        }
    }

    fn invoke_callback(&self) {
        if let Some(cb) = &self.callback {
            cb(self);
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task(name={}, status={}, agent={:?})", self.name, self.status, self.agent)
    }
}

pub(crate) fn interpolate_string(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut output = template.to_string();
    for (key, value) in inputs {
        output = output.replace(&format!("{{{key}}}"), value);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_context_data_is_idempotent() {
        let deps = vec![DependencySnapshot { name: "A".into(), status: TaskStatus::Completed, result: Some("ok".into()) }];
        let a = render_context_data(&deps);
        let b = render_context_data(&deps);
        assert_eq!(a, b);
    }

    #[test]
    fn check_dependencies_reports_missing_names() {
        let deps = vec![
            DependencySnapshot { name: "A".into(), status: TaskStatus::Completed, result: Some("x".into()) },
            DependencySnapshot { name: "B".into(), status: TaskStatus::Pending, result: None },
        ];
        let err = check_dependencies(&deps).unwrap_err();
        assert_eq!(err, vec!["B".to_string()]);
    }

    #[test]
    fn interpolate_inputs_is_based_on_originals() {
        let mut task = Task::new("t1", "Summarize {topic}").with_expected_output("A summary of {topic}");
        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "rust".to_string());
        task.interpolate_inputs(&inputs);
        assert_eq!(task.description, "Summarize rust");
        assert_eq!(task.expected_output.as_deref(), Some("A summary of rust"));

        let mut inputs2 = HashMap::new();
        inputs2.insert("topic".to_string(), "go".to_string());
        task.interpolate_inputs(&inputs2);
        assert_eq!(task.description, "Summarize go");
    }

    #[test]
    fn key_is_stable_across_interpolation() {
        let mut task = Task::new("t1", "Summarize {topic}").with_expected_output("out");
        let key_before = task.key();
        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "rust".to_string());
        task.interpolate_inputs(&inputs);
        assert_eq!(key_before, task.key());
    }
}
