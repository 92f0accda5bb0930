//! Tool contract and registry (spec.md §6 and §4.5 `use_tool`).
//!
//! Trimmed relative to the teacher's `BaseTool` (usage-count limiting,
//! caching hints, and structured-tool conversion for native function-calling
//! are all out of this spec's scope) but keeps the same
//! `#[async_trait] pub trait ...: Send + Sync` shape seen across
//! `base_tool.rs` and `llms/base_llm.rs` in the teacher.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// A named capability an Agent can invoke through `USE_TOOL[name](...)`.
/// `name()` is expected to be lowercase, matching the sentinel grammar.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, params: HashMap<String, String>) -> Result<String, ToolError>;
}

/// Checks that every name in `required` is present in `params` and that no
/// key in `params` falls outside `required` ∪ `optional`.
pub fn validate_params(
    tool_name: &str,
    params: &HashMap<String, String>,
    required: &[&str],
    optional: &[&str],
) -> Result<(), ToolError> {
    for key in required {
        if !params.contains_key(*key) {
            return Err(ToolError::InvalidParams {
                name: tool_name.to_string(),
                message: format!("missing required parameter '{key}'"),
            });
        }
    }
    for key in params.keys() {
        if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
            return Err(ToolError::InvalidParams {
                name: tool_name.to_string(),
                message: format!("unknown parameter '{key}'"),
            });
        }
    }
    Ok(())
}

/// Registry of tools an Agent (or a Crew, for tools shared across all
/// agents) may resolve by name. Resolution is exact-name first, then
/// case-insensitive, matching spec.md §4.5's "resolves by exact name or
/// case-insensitive type name" — in this crate a tool's identity is its
/// (already-lowercase-by-convention) `name()`, so "type name" collapses to
/// a case-insensitive compare against that name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if let Some(tool) = self.tools.get(name) {
            return Some(tool.clone());
        }
        let lower = name.to_lowercase();
        self.tools
            .values()
            .find(|t| t.name().to_lowercase() == lower)
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn describe_all(&self) -> String {
        let mut names: Vec<_> = self.tools.values().collect();
        names.sort_by_key(|t| t.name().to_string());
        names
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input back"
        }
        async fn execute(&self, params: HashMap<String, String>) -> Result<String, ToolError> {
            Ok(params.get("text").cloned().unwrap_or_default())
        }
    }

    #[test]
    fn resolves_case_insensitively() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.resolve("echo").is_some());
        assert!(reg.resolve("ECHO").is_some());
        assert!(reg.resolve("EcHo").is_some());
        assert!(reg.resolve("missing").is_none());
    }

    #[test]
    fn validate_params_rejects_missing_and_unknown() {
        let mut params = HashMap::new();
        params.insert("a".to_string(), "1".to_string());
        assert!(validate_params("t", &params, &["a", "b"], &[]).is_err());
        params.insert("b".to_string(), "2".to_string());
        assert!(validate_params("t", &params, &["a", "b"], &[]).is_ok());
        params.insert("c".to_string(), "3".to_string());
        assert!(validate_params("t", &params, &["a", "b"], &[]).is_err());
        assert!(validate_params("t", &params, &["a", "b"], &["c"]).is_ok());
    }
}
