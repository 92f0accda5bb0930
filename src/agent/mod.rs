//! `Agent`: builds reasoning context, runs the reasoning loop, dispatches
//! tool calls, delegates when acting as a manager (spec.md §4.5).
//!
//! Keeps the teacher's `Agent` struct shape (identity fields, `key()`,
//! `interpolate_inputs`) and its general "build prompt -> call LLM -> parse
//! response -> loop" outline, but the actual loop body is written fresh:
//! the teacher's own loop lives inside an unseen `CrewAgentExecutor` and is
//! mostly stubbed where it matters (`execute_with_timeout` is a literal
//! no-op, its tool executor only logs and echoes a string).

pub mod parser;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AgentLimits;
use crate::error::AgentError;
use crate::human::HumanGate;
use crate::llm::{ChatMessage, ChatOptions, LLMClient};
use crate::memory::Memory;
use crate::task::{interpolate_string, StepCallback, Task};
use crate::tools::ToolRegistry;
use uuid::Uuid;

pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<String>,
    pub limits: AgentLimits,
    pub is_manager: bool,
    pub allow_delegation: bool,
    pub subordinates: Vec<String>,
    pub human_input: bool,
    pub require_approval_for_tools: bool,
    pub require_approval_for_final_answer: bool,
    pub memory: Memory,
    pub llm: Arc<dyn LLMClient>,
    original_role: String,
    original_goal: String,
    original_backstory: String,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("is_manager", &self.is_manager)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        llm: Arc<dyn LLMClient>,
    ) -> Self {
        let role = role.into();
        let goal = goal.into();
        let backstory = backstory.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: role.clone(),
            goal: goal.clone(),
            backstory: backstory.clone(),
            tools: Vec::new(),
            limits: AgentLimits::default(),
            is_manager: false,
            allow_delegation: false,
            subordinates: Vec::new(),
            human_input: false,
            require_approval_for_tools: false,
            require_approval_for_final_answer: false,
            memory: Memory::new(),
            llm,
            original_role: role,
            original_goal: goal,
            original_backstory: backstory,
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn as_manager(mut self, subordinates: Vec<String>) -> Self {
        self.is_manager = true;
        self.allow_delegation = true;
        self.subordinates = subordinates;
        self
    }

    /// `{key}`-style templating over role/goal/backstory, mirroring
    /// `Task::interpolate_inputs`.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, String>) {
        self.role = interpolate_string(&self.original_role, inputs);
        self.goal = interpolate_string(&self.original_goal, inputs);
        self.backstory = interpolate_string(&self.original_backstory, inputs);
    }

    pub fn key(&self) -> String {
        crate::memory::content_hash(&format!("{}|{}|{}", self.original_role, self.original_goal, self.original_backstory))
    }

    pub fn can_delegate_to(&self, target_role: &str) -> bool {
        if !self.is_manager {
            return false;
        }
        self.subordinates.iter().any(|s| s == target_role) || self.allow_delegation
    }

    /// Runs the reasoning loop for `task`, returning the final answer text
    /// or an `AgentError` once the iteration/time budget and retries inside
    /// the loop are both exhausted. Records the outcome in `self.memory`
    /// either way.
    pub async fn execute_task(
        &mut self,
        task: &Task,
        context_data: &str,
        allowed_task_tools: &[String],
        tools: &ToolRegistry,
        human_gate: &HumanGate,
        step_callback: Option<&StepCallback>,
    ) -> Result<String, AgentError> {
        let allowed: HashSet<String> = self
            .tools
            .iter()
            .chain(allowed_task_tools.iter())
            .map(|t| t.to_lowercase())
            .collect();

        let tools_desc = if allowed.is_empty() {
            "No tools are available for this task.".to_string()
        } else {
            tools
                .names()
                .into_iter()
                .filter(|n| allowed.contains(&n.to_lowercase()))
                .map(|n| tools.resolve(n).map(|t| format!("- {}: {}", t.name(), t.description())).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n")
        };

        let memory_context = self.memory.relevant_executions(&task.description, 3);

        let start = Instant::now();
        let mut prior_reasoning = String::new();
        let mut prior_tool_result = String::new();
        let mut human_guidance = String::new();
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;
            if iteration > self.limits.max_iterations {
                break;
            }
            if start.elapsed() > self.limits.max_execution_time {
                break;
            }

            if self.human_input && (iteration == 1 || iteration % 3 == 0) {
                if let Some(guidance) = human_gate
                    .input_with_timeout(&format!("Guidance for '{}'? (leave blank to skip)", task.name), Duration::from_secs(5))
                    .await
                {
                    if !guidance.trim().is_empty() {
                        human_guidance = guidance;
                    }
                }
            }

            let messages = compose_messages(
                self,
                task,
                context_data,
                &tools_desc,
                &prior_reasoning,
                &prior_tool_result,
                &human_guidance,
                iteration,
                memory_context.as_deref(),
            );

            let response = self.llm.chat(messages, ChatOptions { temperature: 0.1, ..Default::default() }).await?;

            let tool_calls = parser::parse_tool_calls(&response.content);
            let mut any_tool_succeeded = false;
            let mut tool_lines = Vec::new();
            for call in &tool_calls {
                let (text, success) = self.use_tool(&call.name, call.params_map(), tools, human_gate, &allowed).await;
                any_tool_succeeded |= success;
                tool_lines.push(format!("{}: {}", call.name, text));
            }
            prior_tool_result = tool_lines.join("\n");

            if let Some(cb) = step_callback {
                cb(&format!("[{}] iteration {iteration}: {}", task.name, parser::last_nonempty_lines(&response.content, 1)));
            }

            if let Some(final_text) = parser::extract_final_answer(&response.content) {
                let answer = self.finalize_answer(final_text, human_gate).await;
                self.memory.add_execution(&task.name, &task.description, &answer, start.elapsed(), true);
                return Ok(answer);
            }

            if !any_tool_succeeded && parser::has_completion_keyword(&response.content) {
                let answer = self.finalize_answer(response.content.clone(), human_gate).await;
                self.memory.add_execution(&task.name, &task.description, &answer, start.elapsed(), true);
                return Ok(answer);
            }

            prior_reasoning = response.content;
        }

        let best_effort = parser::last_nonempty_lines(&prior_reasoning, 3);
        let elapsed = start.elapsed();
        if best_effort.is_empty() {
            self.memory.add_execution(&task.name, &task.description, "no usable answer", elapsed, false);
            return Err(AgentError::NoFinalAnswer);
        }
        let answer = self.finalize_answer(best_effort, human_gate).await;
        self.memory.add_execution(&task.name, &task.description, &answer, elapsed, true);
        Ok(answer)
    }

    async fn finalize_answer(&mut self, answer: String, human_gate: &HumanGate) -> String {
        if self.require_approval_for_final_answer && self.human_input {
            let approved = human_gate.approval(&format!("Approve this final answer?\n{answer}")).await;
            if !approved {
                let feedback = human_gate.feedback("What should change?").await;
                return format!("{answer}\n\n[revision requested by reviewer: {feedback}]");
            }
        }
        answer
    }

    /// Resolves and invokes a tool by name within the scope of `allowed`.
    /// Returns `(text, succeeded)`; a `ToolNotFound`/out-of-scope/denied
    /// call is reported as text rather than aborting the reasoning loop.
    pub async fn use_tool(
        &mut self,
        name: &str,
        params: HashMap<String, String>,
        tools: &ToolRegistry,
        human_gate: &HumanGate,
        allowed: &HashSet<String>,
    ) -> (String, bool) {
        let resolved = tools.resolve(name).filter(|t| allowed.contains(&t.name().to_lowercase()));
        let Some(tool) = resolved else {
            return (format!("ToolNotFound: no tool named '{name}' is available to this agent"), false);
        };

        if self.require_approval_for_tools && self.human_input {
            let approved = human_gate
                .approval(&format!("Agent '{}' wants to call tool '{}' with {:?}", self.role, tool.name(), params))
                .await;
            if !approved {
                return (format!("Tool call to '{}' was not approved by human reviewer", tool.name()), false);
            }
        }

        let params_repr = format!("{params:?}");
        match tool.execute(params.clone()).await {
            Ok(result) => {
                self.memory.add_tool_usage(tool.name(), &params_repr, &result);
                (result, true)
            }
            Err(err) => {
                self.memory.add_tool_usage(tool.name(), &params_repr, &err.to_string());
                if self.human_input {
                    use crate::human::ToolFailureDecision;
                    match human_gate.tool_failure_decision(&format!("Tool '{}' failed: {err}", tool.name())).await {
                        ToolFailureDecision::RetrySame => match tool.execute(params).await {
                            Ok(result) => (result, true),
                            Err(err2) => (format!("ToolFailure: {err2}"), false),
                        },
                        ToolFailureDecision::RetryWithNewParams => {
                            (format!("ToolFailure: {err} (retry with new params requested; none supplied)"), false)
                        }
                        ToolFailureDecision::Skip => (format!("Tool '{}' skipped after failure: {err}", tool.name()), false),
                        ToolFailureDecision::Abort => (format!("ToolFailure (aborted): {err}"), false),
                    }
                } else {
                    (format!("ToolFailure: {err}"), false)
                }
            }
        }
    }

    /// One-shot delegation-instruction generation for a manager agent.
    pub async fn delegate_task(
        &self,
        task: &Task,
        target_role: &str,
        target_goal: &str,
        target_tools: &[String],
    ) -> Result<String, AgentError> {
        if !self.can_delegate_to(target_role) {
            return Err(AgentError::DelegationNotAllowed { agent: self.role.clone(), target: target_role.to_string() });
        }
        let prompt = format!(
            "You are delegating a task to a co-worker.\nTask: {}\nExpected Output: {}\nCo-worker role: {target_role}\nCo-worker goal: {target_goal}\nCo-worker tools: {}\n\nWrite clear, concise instructions for the co-worker to complete this task.",
            task.description,
            task.expected_output.clone().unwrap_or_default(),
            target_tools.join(", "),
        );
        let response = self.llm.chat(vec![ChatMessage::user(prompt)], ChatOptions::default()).await?;
        Ok(response.content)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent(role={}, is_manager={})", self.role, self.is_manager)
    }
}

#[allow(clippy::too_many_arguments)]
fn compose_messages(
    agent: &Agent,
    task: &Task,
    context_data: &str,
    tools_desc: &str,
    prior_reasoning: &str,
    prior_tool_result: &str,
    human_guidance: &str,
    iteration: u32,
    memory_context: Option<&str>,
) -> Vec<ChatMessage> {
    let system = format!(
        "You are {role}.\nBackstory: {backstory}\nYour goal: {goal}\n\nAvailable tools:\n{tools_desc}\n\n\
         Use USE_TOOL[tool_name](key=value, ...) to invoke a tool. When you have the final answer, \
         respond with FINAL_ANSWER[<content>].",
        role = agent.role,
        backstory = agent.backstory,
        goal = agent.goal,
    );

    let mut user = format!("Task: {}\n", task.description);
    if let Some(expected) = &task.expected_output {
        user.push_str(&format!("Expected Output: {expected}\n"));
    }
    if !context_data.is_empty() {
        user.push_str(&format!("\nContext from prior tasks:\n{context_data}\n"));
    }
    if let Some(mem) = memory_context {
        user.push_str(&format!("\nRelevant past executions:\n{mem}\n"));
    }
    if !prior_reasoning.is_empty() {
        user.push_str(&format!("\nYour previous reasoning:\n{prior_reasoning}\n"));
    }
    if !prior_tool_result.is_empty() {
        user.push_str(&format!("\nPrevious tool results:\n{prior_tool_result}\n"));
    }
    if !human_guidance.is_empty() {
        user.push_str(&format!("\nHuman guidance:\n{human_guidance}\n"));
    }
    user.push_str(&format!("\nIteration: {iteration}\n"));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn reasoning_loop_stops_on_final_answer() {
        let llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[42]"]));
        let mut agent = Agent::new("a", "Researcher", "find answers", "a careful researcher", llm.clone());
        let task = Task::new("t1", "What is the answer?");
        let tools = ToolRegistry::new();
        let gate = HumanGate::auto_approve();
        let result = agent.execute_task(&task, "", &[], &tools, &gate, None).await.unwrap();
        assert_eq!(result, "42");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn reasoning_loop_bounds_llm_calls_by_max_iterations() {
        let llm = Arc::new(MockLlmClient::new(vec!["still thinking", "still thinking", "still thinking"]));
        let mut agent = Agent::new("a", "Researcher", "find answers", "a careful researcher", llm.clone());
        agent.limits.max_iterations = 2;
        let task = Task::new("t1", "What is the answer?");
        let tools = ToolRegistry::new();
        let gate = HumanGate::auto_approve();
        let _ = agent.execute_task(&task, "", &[], &tools, &gate, None).await;
        assert_eq!(llm.call_count(), 2);
    }
}
