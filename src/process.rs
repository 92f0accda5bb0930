//! `Process`: strategy for how the Crew traverses tasks (spec.md §4.2-4.4).
//!
//! The teacher's `process.rs` is a bare 32-line enum with no Parallel
//! variant and a commented-out `// TODO: Consensual` — it never implements
//! any of the three processes' actual scheduling logic (that lives, only
//! partially, inside `Crew::run_sequential_process`/`run_hierarchical_process`).
//! This module keeps the enum shape but builds the phase-decomposition,
//! assignment, and abort-threshold logic fresh per spec.md, informed by
//! `other_examples`' cleaner `ProcessConfig` style for the enum itself.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;

use crate::crew::Crew;
use crate::error::CrewError;
use crate::task::TaskStatus;
use crate::types::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Sequential,
    Hierarchical,
    /// Degenerate in this scope: behaves exactly like `Sequential`. A
    /// genuine consensus/voting mechanism across multiple agents is a
    /// stated extension point, not part of this crate (see DESIGN.md).
    Consensual,
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessKind::Sequential => "sequential",
            ProcessKind::Hierarchical => "hierarchical",
            ProcessKind::Consensual => "consensual",
        };
        write!(f, "{s}")
    }
}

impl Default for ProcessKind {
    fn default() -> Self {
        ProcessKind::Sequential
    }
}

/// Groups `names` into topological layers using `deps` (name -> prerequisite
/// names). Repeatedly peels off all tasks whose prerequisites are already
/// placed in an earlier layer. If a peel yields nothing while tasks remain,
/// the remainder is dumped into one final phase (cycle fallback) and `true`
/// is returned as the second element, rather than failing the run.
pub fn topological_phases(names: &[String], deps: &HashMap<String, Vec<String>>) -> (Vec<Vec<String>>, bool) {
    let mut remaining: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut phases = Vec::new();
    let mut had_cycle = false;

    while !remaining.is_empty() {
        let ready: Vec<&str> = names
            .iter()
            .map(|s| s.as_str())
            .filter(|n| remaining.contains(n))
            .filter(|n| deps.get(*n).map(|d| d.iter().all(|p| done.contains(p.as_str()))).unwrap_or(true))
            .collect();

        if ready.is_empty() {
            log::warn!("cyclic dependency detected; scheduling remaining {} task(s) as a single terminal phase", remaining.len());
            let rest: Vec<String> = names.iter().filter(|n| remaining.contains(n.as_str())).cloned().collect();
            phases.push(rest);
            had_cycle = true;
            break;
        }

        for n in &ready {
            remaining.remove(n);
            done.insert(n);
        }
        phases.push(ready.into_iter().map(String::from).collect());
    }

    (phases, had_cycle)
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "is", "are", "be", "this", "that",
    "it", "as", "by", "from", "at",
];

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Picks the best-scoring non-manager candidate for an unassigned task by
/// keyword overlap between the task description and the agent's role+goal,
/// with a small bonus for agents that carry any tools at all.
pub fn best_agent_for_task(description: &str, candidates: &[(&str, &str, &str, bool)]) -> Option<String> {
    let task_kw = keywords(description);
    let mut best: Option<(String, f64)> = None;
    for (role, goal, _backstory, has_tools) in candidates {
        let agent_kw = keywords(&format!("{role} {goal}"));
        let mut score = task_kw.intersection(&agent_kw).count() as f64;
        if *has_tools {
            score += 0.5;
        }
        let better = best.as_ref().map(|(_, b)| score > *b).unwrap_or(true);
        if better {
            best = Some((role.to_string(), score));
        }
    }
    best.map(|(role, _)| role)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// A task is High priority if some other task in the crew depends on it
/// (blocking work), Low if it itself depends on more than two prerequisites,
/// Normal otherwise.
pub fn priority_for(task_name: &str, all: &[(String, Vec<String>)]) -> Priority {
    let is_prerequisite_of_other = all.iter().any(|(name, deps)| name != task_name && deps.iter().any(|d| d == task_name));
    if is_prerequisite_of_other {
        return Priority::High;
    }
    let own_deps = all.iter().find(|(name, _)| name == task_name).map(|(_, d)| d.len()).unwrap_or(0);
    if own_deps > 2 { Priority::Low } else { Priority::Normal }
}

/// Returns true once a Hierarchical phase's failures exceed the abort
/// threshold. Only an early-phase heuristic is implemented: phase <= 2
/// (1-based) with more than one failure. A true critical-task-weighted ratio
/// was considered (see DESIGN.md) but dropped as unneeded complexity for a
/// crate without a notion of "critical" tasks.
pub fn hierarchical_should_abort(phase_number_one_based: usize, phase_results: &[ExecutionResult]) -> bool {
    let failures: Vec<&ExecutionResult> = phase_results.iter().filter(|r| r.status == TaskStatus::Failed).collect();
    if failures.is_empty() {
        return false;
    }
    if phase_number_one_based <= 2 && failures.len() > 1 {
        return true;
    }
    false
}

#[async_trait]
pub trait ProcessStrategy: Send + Sync {
    async fn execute(&self, crew: &mut Crew) -> Result<Vec<ExecutionResult>, CrewError>;
}

pub struct SequentialProcess;

#[async_trait]
impl ProcessStrategy for SequentialProcess {
    /// No reordering based on dependencies — relies on the caller's
    /// insertion order. Continues through failures (does not abort).
    async fn execute(&self, crew: &mut Crew) -> Result<Vec<ExecutionResult>, CrewError> {
        let mut results = Vec::new();
        let task_names: Vec<String> = crew.task_names();

        for name in &task_names {
            let start = Instant::now();
            let deps = crew.snapshot_dependencies(name).await;
            let agent_name = crew.task_agent(name).await;

            let Some(agent_name) = agent_name else {
                crew.mark_task_failed(name, "no agent assigned").await;
                results.push(crew.execution_result_for(name, 0, start.elapsed()).await);
                continue;
            };
            let Some(agent) = crew.get_agent(&agent_name) else {
                crew.mark_task_failed(name, &format!("agent '{agent_name}' is not registered with this crew")).await;
                results.push(crew.execution_result_for(name, 0, start.elapsed()).await);
                continue;
            };

            let outcome = crew.run_task(name, &deps, agent).await;
            if let Some(cb) = crew.task_callback.clone() {
                crew.with_task(name, |t| cb(t)).await;
            }
            let _ = outcome;
            results.push(crew.execution_result_for(name, 0, start.elapsed()).await);
        }
        Ok(results)
    }
}

pub struct HierarchicalProcess;

#[async_trait]
impl ProcessStrategy for HierarchicalProcess {
    async fn execute(&self, crew: &mut Crew) -> Result<Vec<ExecutionResult>, CrewError> {
        crew.ensure_manager().await;
        crew.assign_unassigned_tasks().await;
        crew.delegate_all().await;

        let names = crew.task_names();
        let deps_map: HashMap<String, Vec<String>> = {
            let mut m = HashMap::new();
            for n in &names {
                m.insert(n.clone(), crew.task_dependencies(n).await);
            }
            m
        };
        let (phases, had_cycle) = topological_phases(&names, &deps_map);
        if had_cycle {
            log::warn!("crew '{}': hierarchical schedule fell back to a terminal phase due to a dependency cycle", crew.name);
        }

        let all_deps: Vec<(String, Vec<String>)> = names.iter().map(|n| (n.clone(), deps_map.get(n).cloned().unwrap_or_default())).collect();

        let mut results = Vec::new();
        let mut aborted = false;

        for (idx, phase) in phases.iter().enumerate() {
            if aborted {
                break;
            }
            let mut phase_results = Vec::new();
            for name in phase {
                let priority = priority_for(name, &all_deps);
                log::debug!("crew '{}': task '{name}' tagged priority {priority:?} in phase {}", crew.name, idx + 1);

                let start = Instant::now();
                let deps = crew.snapshot_dependencies(name).await;
                let agent_name = crew.task_agent(name).await;
                let Some(agent_name) = agent_name else {
                    crew.mark_task_failed(name, "no agent assigned").await;
                    let mut r = crew.execution_result_for(name, idx, start.elapsed()).await;
                    r.priority = priority;
                    phase_results.push(r);
                    continue;
                };
                let Some(agent) = crew.get_agent(&agent_name) else {
                    crew.mark_task_failed(name, &format!("agent '{agent_name}' is not registered with this crew")).await;
                    let mut r = crew.execution_result_for(name, idx, start.elapsed()).await;
                    r.priority = priority;
                    phase_results.push(r);
                    continue;
                };
                let _ = crew.run_task(name, &deps, agent).await;
                if let Some(cb) = crew.task_callback.clone() {
                    crew.with_task(name, |t| cb(t)).await;
                }
                let mut r = crew.execution_result_for(name, idx, start.elapsed()).await;
                r.priority = priority;
                phase_results.push(r);
            }

            if hierarchical_should_abort(idx + 1, &phase_results) {
                log::warn!("crew '{}': aborting after phase {} due to excessive failures", crew.name, idx + 1);
                aborted = true;
            }
            results.extend(phase_results);
        }

        crew.revert_delegation_augmentation().await;
        Ok(results)
    }
}

/// Degenerate form of `Sequential` per spec.md §4.4 — a real
/// consensus/voting mechanism across multiple agents is an extension point
/// this crate does not build (see DESIGN.md).
pub struct ConsensualProcess;

#[async_trait]
impl ProcessStrategy for ConsensualProcess {
    async fn execute(&self, crew: &mut Crew) -> Result<Vec<ExecutionResult>, CrewError> {
        SequentialProcess.execute(crew).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topological_phases_orders_by_dependency() {
        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let mut deps = HashMap::new();
        deps.insert("A".to_string(), vec![]);
        deps.insert("B".to_string(), vec!["A".to_string()]);
        deps.insert("C".to_string(), vec!["B".to_string()]);
        let (phases, had_cycle) = topological_phases(&names, &deps);
        assert!(!had_cycle);
        assert_eq!(phases, vec![vec!["A".to_string()], vec!["B".to_string()], vec!["C".to_string()]]);
    }

    #[test]
    fn diamond_dependency_groups_into_three_phases() {
        let names = vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()];
        let mut deps = HashMap::new();
        deps.insert("A".to_string(), vec![]);
        deps.insert("B".to_string(), vec!["A".to_string()]);
        deps.insert("C".to_string(), vec!["A".to_string()]);
        deps.insert("D".to_string(), vec!["B".to_string(), "C".to_string()]);
        let (phases, _) = topological_phases(&names, &deps);
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[1].len(), 2);
    }

    #[test]
    fn cyclic_dependency_falls_back_to_one_phase() {
        let names = vec!["A".to_string(), "B".to_string()];
        let mut deps = HashMap::new();
        deps.insert("A".to_string(), vec!["B".to_string()]);
        deps.insert("B".to_string(), vec!["A".to_string()]);
        let (phases, had_cycle) = topological_phases(&names, &deps);
        assert!(had_cycle);
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].len(), 2);
    }
}
