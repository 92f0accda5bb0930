//! `AsyncExecutor`: phase-based bounded worker pool (spec.md §4.7).
//!
//! The teacher has no equivalent — `Crew::kickoff_async` just calls the sync
//! `kickoff`, and `Agent::execute_with_timeout` is a literal no-op. Grounded
//! instead on `other_examples/.../dag_executor.rs`'s `execute_wave`:
//! `Arc<Semaphore>` sized to `max_concurrency`, a permit acquired with
//! `acquire_owned().await` and held inside the spawned task
//! (`let _permit = permit;`), results collected after the whole phase has
//! been submitted, `tokio::time::timeout` wrapping each task's own work.
//! Decoupled from `Crew` so it only needs `Task`/`Agent`/`ToolRegistry`/
//! `HumanGate` handles, matching the "independent component" framing spec.md
//! gives `AsyncExecutor` in its component table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::agent::Agent;
use crate::human::HumanGate;
use crate::process::topological_phases;
use crate::task::{DependencySnapshot, StepCallback, Task, TaskStatus};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrency: usize,
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct TaskPhaseResult {
    pub name: String,
    pub phase_index: usize,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub max_concurrency: usize,
    pub peak_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutorSummary {
    pub results: Vec<TaskPhaseResult>,
    pub pool_stats: PoolStats,
    pub aborted: bool,
    pub had_cycle: bool,
}

/// A task plus the (possibly absent) agent it is bound to, handed in by the
/// caller (`Crew`) which owns the name -> agent lookup.
#[derive(Clone)]
pub struct ExecutableTask {
    pub task: Arc<AsyncMutex<Task>>,
    pub agent: Option<Arc<AsyncMutex<Agent>>>,
}

pub struct AsyncExecutor {
    config: ExecutorConfig,
}

impl AsyncExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        tasks: &[ExecutableTask],
        tools: Arc<ToolRegistry>,
        human_gate: Arc<HumanGate>,
        step_callback: Option<StepCallback>,
    ) -> ExecutorSummary {
        let mut names = Vec::with_capacity(tasks.len());
        let mut deps_map: HashMap<String, Vec<String>> = HashMap::new();
        let mut by_name: HashMap<String, ExecutableTask> = HashMap::new();

        for et in tasks {
            let (name, deps) = {
                let t = et.task.lock().await;
                (t.name.clone(), t.dependencies.clone())
            };
            names.push(name.clone());
            deps_map.insert(name.clone(), deps);
            by_name.insert(name, et.clone());
        }

        let (phases, had_cycle) = topological_phases(&names, &deps_map);
        if had_cycle {
            log::warn!("AsyncExecutor: cyclic dependency detected; remaining tasks scheduled as a single terminal phase");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let mut results: Vec<TaskPhaseResult> = Vec::new();
        let mut aborted = false;

        for (phase_idx, phase_names) in phases.iter().enumerate() {
            if aborted {
                break;
            }

            let mut handles = Vec::new();
            for name in phase_names {
                let Some(et) = by_name.get(name) else { continue };

                let dep_snapshot = self.build_dependency_snapshot(name, &deps_map, &by_name).await;

                let task_arc = et.task.clone();
                let agent_arc = et.agent.clone();
                let tools = tools.clone();
                let human_gate = human_gate.clone();
                let step_callback = step_callback.clone();
                let sem = semaphore.clone();
                let peak = peak.clone();
                let active = active.clone();
                let timeout_dur = self.config.timeout;
                let name_owned = name.clone();
                let phase_idx_owned = phase_idx;

                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("executor semaphore was closed unexpectedly");
                    let current = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);

                    let start = Instant::now();
                    let outcome = if let Some(agent_arc) = agent_arc {
                        let run = async {
                            let mut t = task_arc.lock().await;
                            t.execute(&dep_snapshot, agent_arc, tools, human_gate, step_callback).await
                        };
                        match tokio::time::timeout(timeout_dur, run).await {
                            Ok(Ok(_)) => TaskOutcome::Completed,
                            Ok(Err(_)) => TaskOutcome::Failed,
                            Err(_) => {
                                let mut t = task_arc.lock().await;
                                t.status = TaskStatus::Failed;
                                t.result = Some("task timed out".to_string());
                                t.end_time = Some(chrono::Utc::now());
                                TaskOutcome::Timeout
                            }
                        }
                    } else {
                        let mut t = task_arc.lock().await;
                        t.status = TaskStatus::Failed;
                        t.result = Some(format!("Task '{}' has no agent assigned", t.name));
                        TaskOutcome::Failed
                    };

                    active.fetch_sub(1, Ordering::SeqCst);
                    TaskPhaseResult { name: name_owned, phase_index: phase_idx_owned, outcome, elapsed: start.elapsed() }
                });
                handles.push(handle);
            }

            let phase_results: Vec<TaskPhaseResult> =
                futures::future::join_all(handles).await.into_iter().filter_map(Result::ok).collect();

            if !phase_results.is_empty() {
                let failures = phase_results.iter().filter(|r| r.outcome != TaskOutcome::Completed).count();
                if failures as f64 / phase_results.len() as f64 > 0.5 {
                    aborted = true;
                }
            }

            results.extend(phase_results);
        }

        ExecutorSummary {
            results,
            pool_stats: PoolStats { max_concurrency: self.config.max_concurrency, peak_concurrency: peak.load(Ordering::SeqCst) },
            aborted,
            had_cycle,
        }
    }

    async fn build_dependency_snapshot(
        &self,
        name: &str,
        deps_map: &HashMap<String, Vec<String>>,
        by_name: &HashMap<String, ExecutableTask>,
    ) -> Vec<DependencySnapshot> {
        let mut snapshot = Vec::new();
        for dep_name in deps_map.get(name).cloned().unwrap_or_default() {
            if let Some(dep_et) = by_name.get(&dep_name) {
                let dep_task = dep_et.task.lock().await;
                snapshot.push(DependencySnapshot { name: dep_name, status: dep_task.status, result: dep_task.result.clone() });
            } else {
                snapshot.push(DependencySnapshot { name: dep_name, status: TaskStatus::Pending, result: None });
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_ratio_triggers_above_half() {
        let results = vec![
            TaskPhaseResult { name: "a".into(), phase_index: 0, outcome: TaskOutcome::Failed, elapsed: Duration::ZERO },
            TaskPhaseResult { name: "b".into(), phase_index: 0, outcome: TaskOutcome::Timeout, elapsed: Duration::ZERO },
            TaskPhaseResult { name: "c".into(), phase_index: 0, outcome: TaskOutcome::Completed, elapsed: Duration::ZERO },
        ];
        let failures = results.iter().filter(|r| r.outcome != TaskOutcome::Completed).count();
        assert!(failures as f64 / results.len() as f64 > 0.5);
    }
}
