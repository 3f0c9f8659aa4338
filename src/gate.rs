//! Confirmation gate for side-effecting tools
//!
//! A gated tool request is never executed directly. It becomes a persisted
//! `PendingAction` (an explicit two-phase commit: propose, then commit or
//! abort), and the executor only runs when the user approves. Approve and
//! reject always target the most recently created pending action for the
//! conversation; with several outstanding, older ones stay pending until
//! claimed in turn or expired.
//!
//! Per-action state machine: NONE -> PENDING -> {EXECUTED, REJECTED, EXPIRED}.
//! The store's delete-before-execute claim guarantees a pending action's tool
//! runs at most once.

use crate::store::{PendingAction, RecordStore, StoreResult};
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};
use chrono::Utc;
use std::time::Duration;

/// Outcome of an approve command
pub enum ApproveOutcome {
    /// The claimed action was executed; result may still be a tool error
    Executed {
        tool_name: String,
        output: ToolOutput,
    },
    /// No live pending action for this conversation
    NothingPending,
}

/// Outcome of a reject command
pub enum RejectOutcome {
    Rejected { tool_name: String },
    NothingPending,
}

pub struct ConfirmationGate {
    store: RecordStore,
    ttl: Duration,
}

impl ConfirmationGate {
    pub fn new(store: RecordStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record a gated tool request without running it. Returns the result
    /// text handed back to the model in place of the tool's own output.
    pub fn propose(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> StoreResult<String> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));
        let action = PendingAction {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            tool_name: tool_name.to_string(),
            input,
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.insert_pending_action(&action)?;

        tracing::info!(
            conversation_id,
            tool = tool_name,
            pending_id = %action.id,
            "Gated tool request deferred pending approval"
        );

        Ok(format!(
            "This action requires confirmation. Ask the user to approve or reject it. \
             (pending action {}: {})",
            action.id, tool_name
        ))
    }

    /// Approve the most recent pending action: claim it (delete first), then
    /// run its executor directly, bypassing the gate. Executor failures come
    /// back as ordinary tool-error results, not faults.
    pub async fn approve(
        &self,
        conversation_id: &str,
        registry: &ToolRegistry,
        ctx: ToolContext,
    ) -> StoreResult<ApproveOutcome> {
        let Some(action) = self.store.take_latest_pending(conversation_id)? else {
            return Ok(ApproveOutcome::NothingPending);
        };

        let output = match registry.lookup(&action.tool_name) {
            Some(registered) => registered.tool.run(action.input.clone(), ctx).await,
            None => ToolOutput::error(format!(
                "Tool '{}' is no longer registered",
                action.tool_name
            )),
        };

        tracing::info!(
            conversation_id,
            tool = %action.tool_name,
            pending_id = %action.id,
            is_error = output.is_error,
            "Approved pending action executed"
        );

        Ok(ApproveOutcome::Executed {
            tool_name: action.tool_name,
            output,
        })
    }

    /// Reject the most recent pending action: delete without executing.
    pub fn reject(&self, conversation_id: &str) -> StoreResult<RejectOutcome> {
        let Some(action) = self.store.take_latest_pending(conversation_id)? else {
            return Ok(RejectOutcome::NothingPending);
        };

        tracing::info!(
            conversation_id,
            tool = %action.tool_name,
            pending_id = %action.id,
            "Pending action rejected"
        );

        Ok(RejectOutcome::Rejected {
            tool_name: action.tool_name,
        })
    }
}
