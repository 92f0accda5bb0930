//! `Crew`: aggregate root owning Agents and Tasks (spec.md §4.1).
//!
//! Keeps the teacher's overall shape (`Crew` holds tasks + agents, `kickoff`
//! dispatches on `Process`, `key()` MD5 hashing, `step_callback`/
//! `task_callback` hooks, the `wire_task_executor`-style role->agent lookup
//! generalized here into `Vec<(String, Arc<Mutex<Agent>>)>`) but the
//! dispatch itself — sync vs async path, dependency-aware scheduling,
//! summary formatting — is written fresh against spec.md §4.1 since the
//! teacher's `kickoff_async` is a direct passthrough to the sync path and
//! its `Process` enum has no parallel variant at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::CrewError;
use crate::executor::{AsyncExecutor, ExecutableTask, ExecutorConfig};
use crate::human::HumanGate;
use crate::process::{best_agent_for_task, ConsensualProcess, HierarchicalProcess, ProcessKind, ProcessStrategy, SequentialProcess};
use crate::task::{DependencySnapshot, StepCallback, Task, TaskStatus};
use crate::tools::ToolRegistry;
use crate::types::{CrewRunSummary, ExecutionResult, PoolStats};

pub use crate::task::TaskCallback;

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub async_mode: bool,
    pub max_concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub verbose: Option<bool>,
}

pub struct Crew {
    pub name: String,
    pub id: Uuid,
    pub process_type: ProcessKind,
    pub verbose: bool,
    pub max_iterations: u32,
    agents: Vec<(String, Arc<AsyncMutex<Agent>>)>,
    tasks: Vec<Arc<AsyncMutex<Task>>>,
    pub tools: Arc<ToolRegistry>,
    pub human_gate: Arc<HumanGate>,
    pub step_callback: Option<StepCallback>,
    pub task_callback: Option<TaskCallback>,
    /// Descriptions mutated by hierarchical delegation, saved so they can be
    /// restored once the run completes.
    delegation_backup: Vec<(String, String)>,
}

impl Crew {
    pub fn new(name: impl Into<String>, process_type: ProcessKind) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
            process_type,
            verbose: false,
            max_iterations: 25,
            agents: Vec::new(),
            tasks: Vec::new(),
            tools: Arc::new(ToolRegistry::new()),
            human_gate: Arc::new(HumanGate::auto_approve()),
            step_callback: None,
            task_callback: None,
            delegation_backup: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_human_gate(mut self, gate: HumanGate) -> Self {
        self.human_gate = Arc::new(gate);
        self
    }

    /// Idempotent on identity: adding an agent whose role is already
    /// registered is a no-op.
    pub fn add_agent(&mut self, agent: Agent) {
        if self.agents.iter().any(|(role, _)| role == &agent.role) {
            return;
        }
        self.agents.push((agent.role.clone(), Arc::new(AsyncMutex::new(agent))));
    }

    /// Idempotent on identity: adding a task whose name is already
    /// registered is a no-op.
    pub fn add_task(&mut self, task: Task) {
        let name = task.name.clone();
        if self.tasks.iter().any(|t| {
            t.try_lock().map(|g| g.name == name).unwrap_or(false)
        }) {
            return;
        }
        self.tasks.push(Arc::new(AsyncMutex::new(task)));
    }

    pub fn get_agent(&self, role: &str) -> Option<Arc<AsyncMutex<Agent>>> {
        self.agents.iter().find(|(r, _)| r == role).map(|(_, a)| a.clone())
    }

    pub fn agent_roles(&self) -> Vec<String> {
        self.agents.iter().map(|(r, _)| r.clone()).collect()
    }

    /// MD5 over agent roles and task names, joined with `|` — mirrors the
    /// teacher's `Crew::key`.
    pub fn key(&self) -> String {
        let mut parts: Vec<String> = self.agents.iter().map(|(r, _)| r.clone()).collect();
        parts.sort();
        let joined = parts.join("|");
        crate::memory::content_hash(&joined)
    }

    async fn find_task(&self, name: &str) -> Option<Arc<AsyncMutex<Task>>> {
        for t in &self.tasks {
            let guard = t.lock().await;
            if guard.name == name {
                return Some(t.clone());
            }
        }
        None
    }

    pub(crate) fn task_names(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|t| t.try_lock().map(|g| g.name.clone()).unwrap_or_default())
            .collect()
    }

    pub(crate) async fn task_dependencies(&self, name: &str) -> Vec<String> {
        match self.find_task(name).await {
            Some(t) => t.lock().await.dependencies.clone(),
            None => Vec::new(),
        }
    }

    pub(crate) async fn task_agent(&self, name: &str) -> Option<String> {
        match self.find_task(name).await {
            Some(t) => t.lock().await.agent.clone(),
            None => None,
        }
    }

    pub(crate) async fn snapshot_dependencies(&self, name: &str) -> Vec<DependencySnapshot> {
        let deps = self.task_dependencies(name).await;
        let mut snapshot = Vec::with_capacity(deps.len());
        for dep_name in deps {
            match self.find_task(&dep_name).await {
                Some(t) => {
                    let guard = t.lock().await;
                    snapshot.push(DependencySnapshot { name: dep_name, status: guard.status, result: guard.result.clone() });
                }
                None => snapshot.push(DependencySnapshot { name: dep_name, status: TaskStatus::Pending, result: None }),
            }
        }
        snapshot
    }

    pub(crate) async fn mark_task_failed(&self, name: &str, message: &str) {
        if let Some(t) = self.find_task(name).await {
            let mut guard = t.lock().await;
            guard.status = TaskStatus::Failed;
            guard.result = Some(message.to_string());
            guard.end_time = Some(chrono::Utc::now());
        }
    }

    pub(crate) async fn run_task(
        &self,
        name: &str,
        deps: &[DependencySnapshot],
        agent: Arc<AsyncMutex<Agent>>,
    ) -> Result<String, crate::error::TaskError> {
        let Some(t) = self.find_task(name).await else {
            return Err(crate::error::TaskError::Failed { message: format!("unknown task '{name}'") });
        };
        let mut guard = t.lock().await;
        guard
            .execute(deps, agent, self.tools.clone(), self.human_gate.clone(), self.step_callback.clone())
            .await
    }

    pub(crate) async fn with_task(&self, name: &str, f: impl FnOnce(&Task)) {
        if let Some(t) = self.find_task(name).await {
            let guard = t.lock().await;
            f(&guard);
        }
    }

    pub(crate) async fn execution_result_for(&self, name: &str, phase_index: usize, elapsed: Duration) -> ExecutionResult {
        match self.find_task(name).await {
            Some(t) => {
                let guard = t.lock().await;
                let error = match guard.status {
                    TaskStatus::Failed | TaskStatus::Cancelled => guard.result.clone(),
                    _ => None,
                };
                ExecutionResult {
                    task_name: guard.name.clone(),
                    status: guard.status,
                    result: guard.result.clone().unwrap_or_default(),
                    agent: guard.agent.clone(),
                    phase_index,
                    elapsed,
                    error,
                    retry_count: guard.retry_count,
                    priority: crate::process::Priority::Normal,
                }
            }
            None => ExecutionResult {
                task_name: name.to_string(),
                status: TaskStatus::Failed,
                result: String::new(),
                agent: None,
                phase_index,
                elapsed,
                error: Some(format!("unknown task '{name}'")),
                retry_count: 0,
                priority: crate::process::Priority::Normal,
            },
        }
    }

    /// Synthesizes a default manager agent if no agent is already marked as
    /// manager and none has `allow_delegation` set. Borrows an existing
    /// agent's LLM client for the synthesized manager (there is no
    /// crew-level default `LLMClient` in this scope).
    pub(crate) async fn ensure_manager(&mut self) {
        for (_, agent) in &self.agents {
            if agent.lock().await.is_manager {
                return;
            }
        }
        let Some((_, template)) = self.agents.first() else { return };
        let llm = template.lock().await.llm.clone();
        let subordinates = self.agents.iter().map(|(r, _)| r.clone()).collect();
        let manager = Agent::new(
            "crew_manager",
            "Crew Manager",
            "Coordinate the crew to complete all tasks efficiently and accurately",
            "An experienced manager skilled at delegating work to the right specialist",
            llm,
        )
        .as_manager(subordinates);
        self.agents.push((manager.role.clone(), Arc::new(AsyncMutex::new(manager))));
    }

    /// Assigns every task with no agent to the best-scoring non-manager
    /// candidate by keyword overlap.
    pub(crate) async fn assign_unassigned_tasks(&mut self) {
        let mut candidates = Vec::new();
        for (role, agent) in &self.agents {
            let guard = agent.lock().await;
            if guard.is_manager {
                continue;
            }
            candidates.push((role.clone(), guard.goal.clone(), guard.backstory.clone(), !guard.tools.is_empty()));
        }
        let candidate_refs: Vec<(&str, &str, &str, bool)> =
            candidates.iter().map(|(r, g, b, t)| (r.as_str(), g.as_str(), b.as_str(), *t)).collect();

        for t in &self.tasks {
            let mut guard = t.lock().await;
            if guard.agent.is_none() {
                if let Some(role) = best_agent_for_task(&guard.description, &candidate_refs) {
                    guard.agent = Some(role);
                }
            }
        }
    }

    /// Runs the manager's one-shot delegation chat per task, appending the
    /// resulting instructions to the task description. Descriptions are
    /// saved for `revert_delegation_augmentation`.
    pub(crate) async fn delegate_all(&mut self) {
        if self.agents.is_empty() {
            return;
        }
        let mut manager = None;
        for (_, agent) in &self.agents {
            if agent.lock().await.is_manager {
                manager = Some(agent.clone());
                break;
            }
        }
        let Some(manager) = manager else { return };

        self.delegation_backup.clear();
        for t in &self.tasks {
            let (task_name, target_role, original_description) = {
                let guard = t.lock().await;
                let Some(target_role) = guard.agent.clone() else { continue };
                (guard.name.clone(), target_role, guard.description.clone())
            };

            let Some(target_agent) = self.get_agent(&target_role) else { continue };
            let (target_goal, target_tools) = {
                let guard = target_agent.lock().await;
                (guard.goal.clone(), guard.tools.clone())
            };

            let delegation_result = {
                let manager_guard = manager.lock().await;
                let task_snapshot = t.lock().await;
                manager_guard.delegate_task(&task_snapshot, &target_role, &target_goal, &target_tools).await
            };

            if let Ok(instructions) = delegation_result {
                let mut guard = t.lock().await;
                guard.description = format!("{}\n\nManager's instructions: {}", guard.description, instructions);
                self.delegation_backup.push((task_name, original_description));
            }
        }
    }

    pub(crate) async fn revert_delegation_augmentation(&mut self) {
        for (task_name, original) in self.delegation_backup.drain(..) {
            if let Some(t) = self.tasks.iter().find(|t| {
                t.try_lock().map(|g| g.name == task_name).unwrap_or(false)
            }) {
                t.lock().await.description = original;
            }
        }
    }

    async fn build_executables(&self) -> Vec<ExecutableTask> {
        let mut out = Vec::with_capacity(self.tasks.len());
        for t in &self.tasks {
            let agent_role = t.lock().await.agent.clone();
            let agent = agent_role.and_then(|role| self.get_agent(&role));
            out.push(ExecutableTask { task: t.clone(), agent });
        }
        out
    }

    pub async fn execute(&mut self, opts: ExecuteOptions) -> Result<CrewRunSummary, CrewError> {
        if let Some(v) = opts.verbose {
            self.verbose = v;
        }
        if self.tasks.is_empty() {
            return Ok(CrewRunSummary::empty(self.name.clone(), self.process_type));
        }

        let (results, pool_stats) = if opts.async_mode {
            if self.process_type == ProcessKind::Hierarchical {
                self.ensure_manager().await;
                self.assign_unassigned_tasks().await;
                self.delegate_all().await;
            }

            let config = ExecutorConfig {
                max_concurrency: opts.max_concurrency.unwrap_or_else(default_concurrency),
                timeout: opts.timeout.unwrap_or(Duration::from_secs(300)),
            };
            let executor = AsyncExecutor::new(config);
            let executables = self.build_executables().await;
            let summary = executor.run(&executables, self.tools.clone(), self.human_gate.clone(), self.step_callback.clone()).await;
            if summary.aborted {
                log::warn!("crew '{}': async execution aborted a later phase due to excessive failures", self.name);
            }

            if self.process_type == ProcessKind::Hierarchical {
                self.revert_delegation_augmentation().await;
            }

            let mut results = Vec::with_capacity(summary.results.len());
            for phase_result in &summary.results {
                results.push(self.execution_result_for(&phase_result.name, phase_result.phase_index, phase_result.elapsed).await);
            }
            (results, Some(summary.pool_stats))
        } else {
            let strategy: Box<dyn ProcessStrategy> = match self.process_type {
                ProcessKind::Sequential => Box::new(SequentialProcess),
                ProcessKind::Hierarchical => Box::new(HierarchicalProcess),
                ProcessKind::Consensual => Box::new(ConsensualProcess),
            };
            (strategy.execute(self).await?, None)
        };

        Ok(self.summarize(results, pool_stats))
    }

    fn summarize(&self, results: Vec<ExecutionResult>, pool_stats: Option<PoolStats>) -> CrewRunSummary {
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut timed_out = 0usize;
        let mut cancelled = 0usize;

        for r in &results {
            let is_timeout = r.status == TaskStatus::Failed && r.result.contains("timed out");
            match r.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed if is_timeout => timed_out += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Cancelled => cancelled += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }

        let total = self.tasks.len();
        let pending = total.saturating_sub(results.len());
        let success_rate = if total == 0 { 0.0 } else { ((completed as f64 / total as f64) * 1000.0).round() / 10.0 };

        CrewRunSummary {
            crew_name: self.name.clone(),
            process: self.process_type,
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: failed,
            timed_out_tasks: timed_out,
            cancelled_tasks: cancelled,
            pending_tasks: pending,
            success_rate,
            results,
            pool_stats,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl std::fmt::Display for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Crew(id={}, process={}, agents={}, tasks={})",
            self.id,
            self.process_type,
            self.agents.len(),
            self.tasks.len()
        )
    }
}
