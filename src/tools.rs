//! Tool trait, execution context, and registry
//!
//! Tools are stateless singletons; all per-call context arrives via
//! `ToolContext`. The registry owns every registered tool for the process
//! lifetime and is the single lookup point for dispatch.

pub mod media;
pub mod search;
pub mod skills;
pub mod social;

use crate::llm::ToolDefinition;
use crate::store::RecordStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

/// All context needed for a tool invocation.
///
/// Created fresh for each inbound event and discarded after.
#[derive(Clone)]
pub struct ToolContext {
    /// The conversation this tool is executing within
    pub conversation_id: String,

    /// Durable record store handle
    pub store: RecordStore,

    /// Shared HTTP client for tools that call external services
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(conversation_id: impl Into<String>, store: RecordStore) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            store,
            http: reqwest::Client::new(),
        }
    }
}

/// Trait for tools the agent can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Whether execution must be deferred pending explicit user approval
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Execute the tool. Ordinary failures are reported via
    /// `ToolOutput::error`, never by panicking.
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// A registered tool: definition plus executor plus confirmation flag
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool.name().to_string(),
            description: self.tool.description(),
            input_schema: self.tool.input_schema(),
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.tool.requires_confirmation()
    }
}

/// Collection of tools available to conversations.
///
/// Registration is keyed by tool name; registering the same name twice
/// silently replaces the prior entry (last registration wins).
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    initialized: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            initialized: false,
        }
    }

    /// Create a registry populated with the standard tool set
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.install_default_tools();
        registry
    }

    /// Register the default tool set. Idempotent: repeated calls after the
    /// first are no-ops.
    pub fn install_default_tools(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.register(Arc::new(search::WebSearchTool));
        self.register(Arc::new(search::FetchUrlTool));
        self.register(Arc::new(media::SendMediaTool));
        self.register(Arc::new(media::GenerateImageTool));
        self.register(Arc::new(social::PostUpdateTool));
        self.register(Arc::new(social::ReadTimelineTool));
        self.register(Arc::new(skills::ListSkillsTool));
    }

    /// Register a tool, replacing any prior registration of the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools
            .insert(tool.name().to_string(), RegisteredTool { tool });
    }

    /// Look up a tool by name
    pub fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Get all tool definitions for advertisement to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(RegisteredTool::definition).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;

    struct StaticTool {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> String {
            format!("Static {}", self.name)
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn run(&self, _input: Value, _ctx: ToolContext) -> ToolOutput {
            ToolOutput::success(self.reply)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("conv-1", RecordStore::open_in_memory().unwrap())
    }

    #[test]
    fn standard_registry_has_core_tools() {
        let registry = ToolRegistry::standard();
        for name in ["web_search", "fetch_url", "send_media", "list_skills"] {
            assert!(registry.lookup(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn lookup_unknown_returns_none() {
        let registry = ToolRegistry::standard();
        assert!(registry.lookup("no_such_tool").is_none());
    }

    #[tokio::test]
    async fn second_registration_wins() {
        // Pins the documented last-wins behavior for duplicate names.
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool {
            name: "x",
            reply: "first",
        }));
        registry.register(Arc::new(StaticTool {
            name: "x",
            reply: "second",
        }));

        let registered = registry.lookup("x").unwrap().clone();
        let output = registered.tool.run(Value::Null, ctx()).await;
        assert_eq!(output.output, "second");
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn install_default_tools_is_idempotent() {
        let mut registry = ToolRegistry::standard();
        let count = registry.definitions().len();
        registry.install_default_tools();
        assert_eq!(registry.definitions().len(), count);
    }

    #[test]
    fn gated_flags_are_set() {
        let registry = ToolRegistry::standard();
        assert!(registry.lookup("post_update").unwrap().requires_confirmation());
        assert!(registry.lookup("generate_image").unwrap().requires_confirmation());
        assert!(!registry.lookup("web_search").unwrap().requires_confirmation());
    }
}
