//! Mock implementations for testing
//!
//! These mocks enable loop and turn tests without real I/O.

use crate::dispatch::{DispatchResult, ToolExecutor};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::tools::{ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock model client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    requests: Mutex<Vec<LlmRequest>>,
    /// Simulated request latency (advances paused tokio time)
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with predefined outputs. Unknown names produce the
/// same error result as the real dispatcher.
pub struct MockToolExecutor {
    outputs: HashMap<String, ToolOutput>,
    gated: HashMap<String, bool>,
    /// Record of tool executions
    executions: Mutex<Vec<(String, Value)>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            gated: HashMap::new(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool with a predefined output
    pub fn with_tool(mut self, name: impl Into<String>, output: ToolOutput) -> Self {
        self.outputs.insert(name.into(), output);
        self
    }

    /// Add a tool whose dispatch reports a deferred, gated request
    #[allow(dead_code)] // Used by turn tests
    pub fn with_gated_tool(mut self, name: impl Into<String>, output: ToolOutput) -> Self {
        let name = name.into();
        self.gated.insert(name.clone(), true);
        self.outputs.insert(name, output);
        self
    }

    /// Get recorded executions
    #[allow(dead_code)] // Used by turn tests
    pub fn recorded_executions(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, name: &str, input: Value, _ctx: ToolContext) -> DispatchResult {
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), input));
        match self.outputs.get(name) {
            Some(output) => DispatchResult {
                output: output.clone(),
                gated: self.gated.get(name).copied().unwrap_or(false),
            },
            None => DispatchResult {
                output: ToolOutput::error(format!("Unknown tool: {name}")),
                gated: false,
            },
        }
    }
}
