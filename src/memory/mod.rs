//! Per-agent memory of past executions and tool uses (spec.md §4.8).
//!
//! The teacher's `memory/memory.rs` wraps a pluggable, embedding-backed
//! `Storage` trait — a much wider abstraction than this spec needs. This
//! module is written fresh against the concrete bounded-FIFO contract
//! spec.md actually specifies (fixed caps, deterministic keyword-based
//! similarity, no pluggable backend), while keeping the teacher's plain
//! struct-with-impl-block organization.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

const SHORT_TERM_CAP: usize = 100;
const LONG_TERM_CAP_PER_TYPE: usize = 10;
const TOOL_USAGE_CAP: usize = 50;
const SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Research,
    Analysis,
    Writing,
    Coding,
    Planning,
    General,
}

impl TaskType {
    /// Classifies a task description by keyword bucket. First bucket whose
    /// keyword appears wins; falls back to `General`.
    pub fn classify(description: &str) -> TaskType {
        let lower = description.to_lowercase();
        const BUCKETS: &[(TaskType, &[&str])] = &[
            (TaskType::Research, &["research", "investigate", "study", "explore", "gather", "search"]),
            (TaskType::Analysis, &["analyze", "analysis", "evaluate", "assess", "examine", "compare"]),
            (TaskType::Writing, &["write", "draft", "compose", "author", "document", "report"]),
            (TaskType::Coding, &["code", "implement", "program", "develop", "build", "debug", "refactor"]),
            (TaskType::Planning, &["plan", "schedule", "organize", "strategy", "roadmap"]),
        ];
        for (kind, keywords) in BUCKETS {
            if keywords.iter().any(|k| lower.contains(k)) {
                return *kind;
            }
        }
        TaskType::General
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub task_name: String,
    pub description: String,
    pub task_type: TaskType,
    pub result: String,
    pub success: bool,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct ToolUsageRecord {
    pub tool_name: String,
    pub params: String,
    pub result: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Exact-match hash used by `Memory`'s similarity scoring. MD5 over the raw
/// description text, mirroring the teacher's `Task::key`/`Crew::key` idiom.
pub fn content_hash(text: &str) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn keywords(text: &str) -> HashSet<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "is", "are",
        "be", "this", "that", "it", "as", "by", "from", "at",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Deterministic, non-semantic similarity score in `[0, 1]`. An exact
/// content-hash match always scores `1.0`; otherwise keyword Jaccard plus a
/// `0.2` bonus when both descriptions classify to the same `TaskType`,
/// clamped to `1.0`. Comparing a description against itself always hits the
/// hash branch, so self-similarity is always `1.0` (>= the 0.8 invariant).
pub fn similarity(query: &str, candidate: &ExecutionRecord) -> f64 {
    if content_hash(query) == candidate.content_hash {
        return 1.0;
    }
    let query_kw = keywords(query);
    let candidate_kw = keywords(&candidate.description);
    let mut score = jaccard(&query_kw, &candidate_kw);
    if TaskType::classify(query) == candidate.task_type {
        score += 0.2;
    }
    score.min(1.0)
}

#[derive(Debug, Default)]
pub struct Memory {
    short_term: VecDeque<ExecutionRecord>,
    long_term: HashMap<TaskType, Vec<ExecutionRecord>>,
    tool_usage: VecDeque<ToolUsageRecord>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an execution outcome. Always pushed onto the short-term FIFO
    /// (capped at 100, oldest evicted). Successful executions are also
    /// folded into `long_term[task_type]`, keeping only the 10 fastest.
    pub fn add_execution(&mut self, task_name: &str, description: &str, result: &str, elapsed: Duration, success: bool) {
        let record = ExecutionRecord {
            task_name: task_name.to_string(),
            description: description.to_string(),
            task_type: TaskType::classify(description),
            result: result.to_string(),
            success,
            elapsed,
            timestamp: Utc::now(),
            content_hash: content_hash(description),
        };

        if self.short_term.len() >= SHORT_TERM_CAP {
            self.short_term.pop_front();
        }
        self.short_term.push_back(record.clone());

        if success {
            let bucket = self.long_term.entry(record.task_type).or_default();
            bucket.push(record);
            bucket.sort_by(|a, b| a.elapsed.cmp(&b.elapsed));
            bucket.truncate(LONG_TERM_CAP_PER_TYPE);
        }
    }

    pub fn add_tool_usage(&mut self, tool_name: &str, params: &str, result: &str) {
        let success = !result.to_lowercase().contains("error") && !result.to_lowercase().contains("fail");
        if self.tool_usage.len() >= TOOL_USAGE_CAP {
            self.tool_usage.pop_front();
        }
        self.tool_usage.push_back(ToolUsageRecord {
            tool_name: tool_name.to_string(),
            params: params.to_string(),
            result: result.to_string(),
            success,
            timestamp: Utc::now(),
        });
    }

    /// Formats the `limit` most relevant past executions (short-term pool)
    /// above the similarity threshold, sorted by similarity then success, as
    /// a block of context text suitable for inclusion in a reasoning prompt.
    /// Returns `None` when nothing clears the threshold.
    pub fn relevant_executions(&self, task_description: &str, limit: usize) -> Option<String> {
        let mut scored: Vec<(f64, &ExecutionRecord)> = self
            .short_term
            .iter()
            .map(|r| (similarity(task_description, r), r))
            .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
            .collect();

        if scored.is_empty() {
            return None;
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.success.cmp(&a.1.success))
        });
        scored.truncate(limit);

        Some(
            scored
                .iter()
                .map(|(score, r)| {
                    format!(
                        "- ({:.2}) task '{}': {} -> {}",
                        score,
                        r.task_name,
                        if r.success { "succeeded" } else { "failed" },
                        truncate_for_context(&r.result)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    pub fn long_term_len(&self, task_type: TaskType) -> usize {
        self.long_term.get(&task_type).map(|v| v.len()).unwrap_or(0)
    }

    pub fn tool_usage_len(&self) -> usize {
        self.tool_usage.len()
    }
}

fn truncate_for_context(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        format!("{}...", &text[..MAX])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_similarity_is_always_high() {
        let mut mem = Memory::new();
        mem.add_execution("t1", "Research the competitor landscape", "done", Duration::from_secs(1), true);
        let record = mem.short_term.front().unwrap().clone();
        let score = similarity("Research the competitor landscape", &record);
        assert!(score >= 0.8, "expected self-similarity >= 0.8, got {score}");
    }

    #[test]
    fn disjoint_same_type_scores_low() {
        let mut mem = Memory::new();
        mem.add_execution("t1", "Research alpha beta gamma topics", "done", Duration::from_secs(1), true);
        let record = mem.short_term.front().unwrap().clone();
        let score = similarity("Research zzz yyy xxx matters", &record);
        assert!(score <= 0.2 + 1e-9, "expected disjoint same-type score near 0.2, got {score}");
    }

    #[test]
    fn short_term_is_capped() {
        let mut mem = Memory::new();
        for i in 0..150 {
            mem.add_execution(&format!("t{i}"), "write a report about foo", "ok", Duration::from_millis(1), true);
        }
        assert_eq!(mem.short_term_len(), SHORT_TERM_CAP);
    }

    #[test]
    fn long_term_keeps_only_fastest_ten() {
        let mut mem = Memory::new();
        for i in 0..20 {
            mem.add_execution(
                &format!("t{i}"),
                "write a report about foo",
                "ok",
                Duration::from_millis(20 - i),
                true,
            );
        }
        assert_eq!(mem.long_term_len(TaskType::Writing), LONG_TERM_CAP_PER_TYPE);
    }

    #[test]
    fn tool_usage_failure_detection() {
        let mut mem = Memory::new();
        mem.add_tool_usage("search", "q=foo", "Error: timed out");
        mem.add_tool_usage("search", "q=bar", "3 results found");
        assert_eq!(mem.tool_usage.front().unwrap().success, false);
        assert_eq!(mem.tool_usage.back().unwrap().success, true);
    }
}
