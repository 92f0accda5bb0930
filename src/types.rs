//! Crew-level result types (spec.md §3 Data Model).

use std::time::Duration;

use crate::process::{Priority, ProcessKind};
use crate::task::TaskStatus;

pub use crate::executor::PoolStats;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task_name: String,
    pub status: TaskStatus,
    pub result: String,
    pub agent: Option<String>,
    pub phase_index: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub retry_count: u32,
    /// High/Normal/Low per spec.md §4.3 step 3. Only `HierarchicalProcess`
    /// tags phases; other processes leave this at `Priority::Normal`.
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct CrewRunSummary {
    pub crew_name: String,
    pub process: ProcessKind,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub timed_out_tasks: usize,
    pub cancelled_tasks: usize,
    pub pending_tasks: usize,
    pub success_rate: f64,
    pub results: Vec<ExecutionResult>,
    pub pool_stats: Option<PoolStats>,
}

impl CrewRunSummary {
    pub fn empty(crew_name: String, process: ProcessKind) -> Self {
        Self {
            crew_name,
            process,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            timed_out_tasks: 0,
            cancelled_tasks: 0,
            pending_tasks: 0,
            success_rate: 0.0,
            results: Vec::new(),
            pool_stats: None,
        }
    }
}
