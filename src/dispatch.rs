//! Tool dispatch
//!
//! Routes each tool-invocation request from the model through the registry
//! and the confirmation gate. Dispatch is total: unknown names and store
//! faults become error results, never panics, so one tool's fault cannot
//! abort the turn.

use crate::gate::ConfirmationGate;
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Result of dispatching one tool request
pub struct DispatchResult {
    pub output: ToolOutput,
    /// True when execution was deferred behind the confirmation gate
    pub gated: bool,
}

/// Executor callback consumed by the orchestration loop
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> DispatchResult;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> DispatchResult {
        (**self).execute(name, input, ctx).await
    }
}

/// Production dispatcher over the registry and gate
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    gate: Arc<ConfirmationGate>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, gate: Arc<ConfirmationGate>) -> Self {
        Self { registry, gate }
    }
}

#[async_trait]
impl ToolExecutor for ToolDispatcher {
    async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> DispatchResult {
        let Some(registered) = self.registry.lookup(name) else {
            return DispatchResult {
                output: ToolOutput::error(format!("Unknown tool: {name}")),
                gated: false,
            };
        };

        if registered.requires_confirmation() {
            let output = match self.gate.propose(&ctx.conversation_id, name, input) {
                Ok(prompt) => ToolOutput::success(prompt),
                Err(e) => {
                    tracing::error!(tool = name, error = %e, "Failed to persist pending action");
                    ToolOutput::error(format!("Could not defer '{name}' for confirmation: {e}"))
                }
            };
            return DispatchResult {
                output,
                gated: true,
            };
        }

        DispatchResult {
            output: registered.tool.run(input, ctx).await,
            gated: false,
        }
    }
}
