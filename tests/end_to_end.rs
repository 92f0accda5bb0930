//! End-to-end scenarios, one per spec.md §8 "Concrete end-to-end scenarios".

use std::sync::Arc;
use std::time::Duration;

use crewforge::error::LlmError;
use crewforge::human::HumanGate;
use crewforge::llm::{ChatMessage, ChatOptions, ChatResponse, FinishReason, LLMClient, MockLlmClient, Usage};
use crewforge::process::ProcessKind;
use crewforge::task::TaskStatus;
use crewforge::{Agent, Crew, ExecuteOptions, Task};

fn init_logging() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = env_logger::try_init();
    });
}

fn agent_with(role: &str, llm: Arc<dyn LLMClient>) -> Agent {
    Agent::new(role, role, format!("complete tasks assigned to {role}"), "a capable worker", llm)
}

/// Captures the messages handed to `chat`, useful for asserting on prompt
/// contents without a live provider.
#[derive(Debug)]
struct CapturingLlmClient {
    response: String,
    captured: parking_lot::Mutex<Vec<ChatMessage>>,
}

impl CapturingLlmClient {
    fn new(response: &str) -> Self {
        Self { response: response.to_string(), captured: parking_lot::Mutex::new(Vec::new()) }
    }

    fn last_user_content(&self) -> String {
        self.captured.lock().iter().rev().find(|m| m.role == "user").map(|m| m.content.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LLMClient for CapturingLlmClient {
    async fn chat(&self, messages: Vec<ChatMessage>, _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        *self.captured.lock() = messages;
        Ok(ChatResponse {
            content: self.response.clone(),
            role: "assistant".into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: "capturing".into(),
            provider: "test".into(),
        })
    }
}

/// Sleeps before answering, used to observe real concurrency in the async
/// executor.
#[derive(Debug)]
struct SlowLlmClient {
    delay: Duration,
    response: String,
}

#[async_trait::async_trait]
impl LLMClient for SlowLlmClient {
    async fn chat(&self, _messages: Vec<ChatMessage>, _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        tokio::time::sleep(self.delay).await;
        Ok(ChatResponse {
            content: self.response.clone(),
            role: "assistant".into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: "slow".into(),
            provider: "test".into(),
        })
    }
}

/// Scenario 1: A -> B, Sequential. B's prompt must see A's result in context.
#[tokio::test]
async fn linear_dependency_serial() {
    init_logging();

    let a_llm = Arc::new(CapturingLlmClient::new("FINAL_ANSWER[rA]"));
    let b_llm = Arc::new(CapturingLlmClient::new("FINAL_ANSWER[rB]"));

    let mut crew = Crew::new("linear", ProcessKind::Sequential);
    crew.add_agent(agent_with("writer_a", a_llm.clone()));
    crew.add_agent(agent_with("writer_b", b_llm.clone()));
    crew.add_task(Task::new("A", "produce A").with_agent("writer_a"));
    crew.add_task(Task::new("B", "produce B").with_agent("writer_b").with_dependency("A"));

    let summary = crew.execute(ExecuteOptions::default()).await.unwrap();

    assert_eq!(summary.total_tasks, 2);
    assert_eq!(summary.completed_tasks, 2);
    assert_eq!(summary.success_rate, 100.0);
    assert!(b_llm.last_user_content().contains("rA"), "context was: {}", b_llm.last_user_content());
}

/// Scenario 2: B depends on A and an unregistered task C.
#[tokio::test]
async fn missing_dependency_fails_task() {
    init_logging();

    let a_llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[rA]"]));
    let b_llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[rB]"]));

    let mut crew = Crew::new("missing-dep", ProcessKind::Sequential);
    crew.add_agent(agent_with("writer_a", a_llm));
    crew.add_agent(agent_with("writer_b", b_llm));
    crew.add_task(Task::new("A", "produce A").with_agent("writer_a"));
    crew.add_task(Task::new("B", "produce B").with_agent("writer_b").with_dependency("A").with_dependency("C"));

    let summary = crew.execute(ExecuteOptions::default()).await.unwrap();

    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(summary.failed_tasks, 1);
    let b_result = summary.results.iter().find(|r| r.task_name == "B").unwrap();
    assert_eq!(b_result.status, TaskStatus::Failed);
    assert!(b_result.result.contains("Dependencies not met: C"), "got: {}", b_result.result);
    assert_eq!(b_result.retry_count, 0);
}

/// Scenario 3: diamond {A}, {B,C depend on A}, {D depends on B,C}, max_concurrency=2.
/// Non-strict check: total wall-clock is well under the fully-serial bound.
#[tokio::test]
async fn async_diamond_runs_concurrently() {
    init_logging();

    let delay = Duration::from_millis(150);
    let mk = || Arc::new(SlowLlmClient { delay, response: "FINAL_ANSWER[ok]".to_string() }) as Arc<dyn LLMClient>;

    let mut crew = Crew::new("diamond", ProcessKind::Sequential);
    crew.add_agent(agent_with("a", mk()));
    crew.add_agent(agent_with("b", mk()));
    crew.add_agent(agent_with("c", mk()));
    crew.add_agent(agent_with("d", mk()));
    crew.add_task(Task::new("A", "root").with_agent("a"));
    crew.add_task(Task::new("B", "left").with_agent("b").with_dependency("A"));
    crew.add_task(Task::new("C", "right").with_agent("c").with_dependency("A"));
    crew.add_task(Task::new("D", "join").with_agent("d").with_dependency("B").with_dependency("C"));

    let started = std::time::Instant::now();
    let summary = crew
        .execute(ExecuteOptions { async_mode: true, max_concurrency: Some(2), ..Default::default() })
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.completed_tasks, 4);
    // Fully serial would take ~4*150ms = 600ms; B and C overlapping in phase 2
    // should keep this well under that bound.
    assert!(elapsed < Duration::from_millis(550), "expected overlap, took {elapsed:?}");
}

/// Scenario 4: the agent's LLM errors once, succeeds on retry.
#[tokio::test(start_paused = true)]
async fn retry_with_transient_failure_then_success() {
    init_logging();

    let llm = Arc::new(MockLlmClient::scripted(vec![Err(LlmError::Server("boom".into())), Ok("FINAL_ANSWER[ok]")]));

    let mut crew = Crew::new("retry", ProcessKind::Sequential);
    crew.add_agent(agent_with("worker", llm.clone()));
    crew.add_task(Task::new("T", "do the thing").with_agent("worker").with_max_retries(2));

    let summary = crew.execute(ExecuteOptions::default()).await.unwrap();

    let result = &summary.results[0];
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.retry_count, 1);
    assert_eq!(result.result, "ok");
    assert_eq!(llm.call_count(), 2);
}

/// Scenario 5: four tasks in Hierarchical phase 2, three fail -> abort,
/// later phases stay pending.
#[tokio::test(start_paused = true)]
async fn hierarchical_abort_threshold_stops_later_phases() {
    init_logging();

    let manager_llm = Arc::new(MockLlmClient::new(vec!["delegating"]));
    let root_llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[root-ok]"]));
    let t1_llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[t1-ok]"]));
    let failing = || {
        Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Server("down".into())),
            Err(LlmError::Server("down".into())),
            Err(LlmError::Server("down".into())),
        ]))
    };

    let mut crew = Crew::new("abort-threshold", ProcessKind::Hierarchical);
    crew.add_agent(Agent::new("mgr", "Crew Manager", "coordinate", "an experienced manager", manager_llm).as_manager(vec![
        "root".into(),
        "t1".into(),
        "t2".into(),
        "t3".into(),
        "t4".into(),
        "leaf".into(),
    ]));
    crew.add_agent(agent_with("root", root_llm));
    crew.add_agent(agent_with("t1", t1_llm));
    crew.add_agent(agent_with("t2", failing()));
    crew.add_agent(agent_with("t3", failing()));
    crew.add_agent(agent_with("t4", failing()));
    crew.add_agent(agent_with("leaf", Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[leaf-ok]"]))));

    crew.add_task(Task::new("root", "phase one").with_agent("root"));
    crew.add_task(Task::new("t1", "phase two a").with_agent("t1").with_dependency("root"));
    crew.add_task(Task::new("t2", "phase two b").with_agent("t2").with_dependency("root"));
    crew.add_task(Task::new("t3", "phase two c").with_agent("t3").with_dependency("root"));
    crew.add_task(Task::new("t4", "phase two d").with_agent("t4").with_dependency("root"));
    crew.add_task(Task::new("leaf", "phase three").with_agent("leaf").with_dependency("t1"));

    let summary = crew.execute(ExecuteOptions::default()).await.unwrap();

    assert_eq!(summary.completed_tasks, 2); // root, t1
    assert_eq!(summary.failed_tasks, 3); // t2, t3, t4
    assert_eq!(summary.pending_tasks, 1); // leaf never reached
    assert!(summary.results.iter().all(|r| r.task_name != "leaf"));
}

/// Scenario 6: human confirmation auto-rejected; the agent is never invoked.
#[tokio::test]
async fn human_rejection_cancels_task() {
    init_logging();

    let llm = Arc::new(MockLlmClient::new(vec!["FINAL_ANSWER[should-not-run]"]));

    let mut task = Task::new("T", "do something risky").with_agent("worker");
    task.require_human_confirmation = true;

    let mut crew = Crew::new("human-gate", ProcessKind::Sequential).with_human_gate(HumanGate::with_fixed_response("no"));
    crew.add_agent(agent_with("worker", llm.clone()));
    crew.add_task(task);

    let summary = crew.execute(ExecuteOptions::default()).await.unwrap();

    let result = &summary.results[0];
    assert_eq!(result.status, TaskStatus::Cancelled);
    assert!(result.result.contains("cancelled by human"), "got: {}", result.result);
    assert_eq!(result.retry_count, 0);
    assert_eq!(llm.call_count(), 0);
}
