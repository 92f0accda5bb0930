//! Core multi-agent orchestration engine: crew scheduling, agent reasoning
//! loop, and an async task executor.
//!
//! A `Crew` owns `Agent`s and `Task`s and runs them under one of three
//! `Process` strategies, synchronously (dependency-ordered, no concurrency)
//! or asynchronously (phase-based, bounded by `AsyncExecutor`). See
//! `DESIGN.md` for the module-by-module grounding.

pub mod agent;
pub mod config;
pub mod crew;
pub mod error;
pub mod executor;
pub mod human;
pub mod llm;
pub mod memory;
pub mod process;
pub mod task;
pub mod tools;
pub mod types;
pub mod utilities;

pub use agent::Agent;
pub use crew::{Crew, ExecuteOptions};
pub use error::CrewError;
pub use human::HumanGate;
pub use llm::LLMClient;
pub use memory::Memory;
pub use process::ProcessKind;
pub use task::Task;
pub use tools::{Tool, ToolRegistry};
pub use types::CrewRunSummary;
