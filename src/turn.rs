//! Per-event turn processing
//!
//! Composes the whole pipeline for one inbound event: delivery dedup, the
//! per-conversation lease, model tier routing, relevance filtering, then the
//! orchestration loop. The conversation lock is held for the duration of the
//! turn and released on every exit path by the guard's drop.

use crate::agent::{AgentLoop, LoopBounds, LoopRequest, ToolCallRecord};
use crate::config::BotConfig;
use crate::dispatch::ToolDispatcher;
use crate::gate::{ApproveOutcome, ConfirmationGate, RejectOutcome};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmService, RetrySchedule, RetryingClient, Usage,
};
use crate::relevance;
use crate::router::{self, ModelTier};
use crate::store::{LockAcquire, RecordStore, StoreError};
use crate::tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use thiserror::Error;

/// An inbound message from the chat transport.
///
/// `event_id` must be stable across redeliveries of the same message.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub event_id: String,
    pub conversation_id: String,
    pub text: String,
    /// Background/scheduled turns tolerate longer rate-limit backoff
    pub background: bool,
}

/// A completed turn's reply
#[derive(Debug)]
pub struct TurnReply {
    pub text: String,
    pub records: Vec<ToolCallRecord>,
    pub usage: Usage,
    /// True when at least one requested action awaits user approval
    pub pending_confirmation: bool,
}

/// Result of offering an inbound event to the processor
#[derive(Debug)]
pub enum TurnResult {
    Reply(TurnReply),
    /// The event id was already processed; nothing was done
    DuplicateDelivery,
    /// Another turn holds the conversation lease; nothing was done
    Busy,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Event carries no text")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Model service error: {0}")]
    Llm(#[from] LlmError),
}

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant reachable through a chat platform. You can use \
the tools offered to you; some actions require the user's explicit approval \
and will be deferred until they approve. Keep replies concise and \
conversational.";

/// Drives one turn per inbound event over shared collaborators
pub struct TurnProcessor {
    config: BotConfig,
    store: RecordStore,
    registry: Arc<ToolRegistry>,
    gate: Arc<ConfirmationGate>,
    light: Arc<dyn LlmService>,
    standard: Arc<dyn LlmService>,
}

impl TurnProcessor {
    pub fn new(
        config: BotConfig,
        store: RecordStore,
        registry: Arc<ToolRegistry>,
        light: Arc<dyn LlmService>,
        standard: Arc<dyn LlmService>,
    ) -> Self {
        let gate = Arc::new(ConfirmationGate::new(
            store.clone(),
            config.pending_action_ttl,
        ));
        Self {
            config,
            store,
            registry,
            gate,
            light,
            standard,
        }
    }

    /// Process one inbound event against the supplied conversation history.
    ///
    /// The caller owns the history and persists it afterwards; the core only
    /// extends an in-memory copy for the duration of the turn.
    pub async fn process(
        &self,
        event: &InboundEvent,
        history: Vec<LlmMessage>,
    ) -> Result<TurnResult, TurnError> {
        if event.text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        // Dedup before any mutating work
        if !self.store.try_create_dedup_marker(&event.event_id)? {
            tracing::debug!(
                event_id = %event.event_id,
                "Duplicate delivery, skipping"
            );
            return Ok(TurnResult::DuplicateDelivery);
        }

        let _guard = match self
            .store
            .acquire_lock(&event.conversation_id, self.config.lock_ttl)?
        {
            LockAcquire::Acquired(guard) => guard,
            LockAcquire::Busy => {
                tracing::info!(
                    conversation_id = %event.conversation_id,
                    "Conversation busy, skipping turn"
                );
                return Ok(TurnResult::Busy);
            }
        };

        let tier = router::select_tier(&event.text);
        let service = match tier {
            ModelTier::Light => self.light.clone(),
            ModelTier::Standard => self.standard.clone(),
        };
        let schedule = if event.background {
            RetrySchedule::background()
        } else {
            RetrySchedule::interactive()
        };
        let client = RetryingClient::new(service, schedule);

        let used_tools = previously_used_tools(&history);
        let tools = relevance::select(&self.registry, &event.text, &used_tools);

        tracing::info!(
            conversation_id = %event.conversation_id,
            tier = ?tier,
            tool_count = tools.len(),
            "Starting turn"
        );

        let mut messages = history;
        messages.push(LlmMessage::user_text(&event.text));

        let dispatcher = ToolDispatcher::new(self.registry.clone(), self.gate.clone());
        let agent = AgentLoop::new(
            client,
            Some(dispatcher),
            LoopBounds {
                max_iterations: self.config.max_iterations,
                deadline: self.config.turn_deadline,
                pacing_delay: self.config.pacing_delay,
            },
        );

        let ctx = ToolContext::new(event.conversation_id.clone(), self.store.clone());
        let outcome = agent
            .run(
                &ctx,
                LoopRequest {
                    system_prompt: SYSTEM_PROMPT.to_string(),
                    messages,
                    tools,
                    max_tokens: Some(4096),
                },
            )
            .await?;

        tracing::info!(
            conversation_id = %event.conversation_id,
            iterations = outcome.iterations,
            tool_calls = outcome.records.len(),
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            exhausted = outcome.exhausted,
            "Turn complete"
        );

        let mut text = outcome.text;
        if outcome.exhausted {
            if text.is_empty() {
                text = "I ran out of time before I could finish working on that.".to_string();
            } else {
                text.push_str("\n\n(I ran out of time - this is my best answer so far.)");
            }
        }

        let pending_confirmation = outcome
            .records
            .iter()
            .any(|record| record.was_confirmation_gated);

        Ok(TurnResult::Reply(TurnReply {
            text,
            records: outcome.records,
            usage: outcome.usage,
            pending_confirmation,
        }))
    }

    /// Approve the most recent pending action for a conversation.
    /// Idempotent: a second invocation reports nothing to approve.
    pub async fn approve(&self, conversation_id: &str) -> Result<String, TurnError> {
        let ctx = ToolContext::new(conversation_id.to_string(), self.store.clone());
        match self.gate.approve(conversation_id, &self.registry, ctx).await? {
            ApproveOutcome::Executed { tool_name, output } => {
                if output.is_error {
                    Ok(format!("Ran {tool_name}, but it failed: {}", output.output))
                } else {
                    Ok(format!("Done - {tool_name}: {}", output.output))
                }
            }
            ApproveOutcome::NothingPending => Ok("Nothing to approve.".to_string()),
        }
    }

    /// Reject the most recent pending action for a conversation. Idempotent.
    pub fn reject(&self, conversation_id: &str) -> Result<String, TurnError> {
        match self.gate.reject(conversation_id)? {
            RejectOutcome::Rejected { tool_name } => {
                Ok(format!("Cancelled the pending {tool_name} action."))
            }
            RejectOutcome::NothingPending => Ok("Nothing to reject.".to_string()),
        }
    }
}

/// Tool names the model has already invoked in this conversation
fn previously_used_tools(history: &[LlmMessage]) -> Vec<String> {
    let mut names = Vec::new();
    for message in history {
        for block in &message.content {
            if let ContentBlock::ToolUse { name, .. } = block {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, StopReason};
    use crate::testing::MockLlmClient;
    use crate::tools::{Tool, ToolContext, ToolOutput};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingTool {
        calls: Arc<AtomicU32>,
        gated: bool,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &'static str {
            "web_search"
        }

        fn description(&self) -> String {
            "Counting stand-in".to_string()
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        fn requires_confirmation(&self) -> bool {
            self.gated
        }

        async fn run(&self, _input: Value, _ctx: ToolContext) -> ToolOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ToolOutput::success("result")
        }
    }

    struct Harness {
        processor: TurnProcessor,
        llm: Arc<MockLlmClient>,
        store: RecordStore,
        calls: Arc<AtomicU32>,
    }

    fn harness(gated: bool) -> Harness {
        let store = RecordStore::open_in_memory().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool {
            calls: calls.clone(),
            gated,
        }));
        let processor = TurnProcessor::new(
            BotConfig {
                pacing_delay: Duration::from_millis(0),
                ..BotConfig::default()
            },
            store.clone(),
            Arc::new(registry),
            llm.clone() as Arc<dyn LlmService>,
            llm.clone() as Arc<dyn LlmService>,
        );
        Harness {
            processor,
            llm,
            store,
            calls,
        }
    }

    fn event(id: &str) -> InboundEvent {
        InboundEvent {
            event_id: id.to_string(),
            conversation_id: "conv-1".to_string(),
            text: "search for rust news".to_string(),
            background: false,
        }
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    fn tool_use_response(name: &str) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::tool_use("t1", name, json!({}))],
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_delivery_is_processed_once() {
        let h = harness(false);
        h.llm.queue_response(text_response("hello"));

        let first = h.processor.process(&event("evt-1"), vec![]).await.unwrap();
        assert!(matches!(first, TurnResult::Reply(_)));

        let second = h.processor.process(&event("evt-1"), vec![]).await.unwrap();
        assert!(matches!(second, TurnResult::DuplicateDelivery));

        // Only the first delivery reached the model
        assert_eq!(h.llm.recorded_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_conversation_is_skipped() {
        let h = harness(false);
        h.store.write_lock_at("conv-1", Utc::now()).unwrap();

        let result = h.processor.process(&event("evt-1"), vec![]).await.unwrap();
        assert!(matches!(result, TurnResult::Busy));
        assert!(h.llm.recorded_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_released_after_turn() {
        let h = harness(false);
        h.llm.queue_response(text_response("one"));
        h.llm.queue_response(text_response("two"));

        h.processor.process(&event("evt-1"), vec![]).await.unwrap();
        // A fresh event for the same conversation can proceed immediately
        let result = h.processor.process(&event("evt-2"), vec![]).await.unwrap();
        assert!(matches!(result, TurnResult::Reply(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_released_when_model_errors() {
        let h = harness(false);
        h.llm.queue_error(LlmError::auth("bad key"));

        let err = h.processor.process(&event("evt-1"), vec![]).await.unwrap_err();
        assert!(matches!(err, TurnError::Llm(_)));

        h.llm.queue_response(text_response("recovered"));
        let result = h.processor.process(&event("evt-2"), vec![]).await.unwrap();
        assert!(matches!(result, TurnResult::Reply(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_is_rejected_before_the_core() {
        let h = harness(false);
        let mut ev = event("evt-1");
        ev.text = "   ".to_string();

        let err = h.processor.process(&ev, vec![]).await.unwrap_err();
        assert!(matches!(err, TurnError::EmptyMessage));
        // Not even the dedup marker was written
        assert!(h.store.try_create_dedup_marker("evt-1").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn gated_tool_round_trip_through_approve() {
        let h = harness(true);
        h.llm.queue_response(tool_use_response("web_search"));
        h.llm.queue_response(text_response("waiting for your approval"));

        let result = h.processor.process(&event("evt-1"), vec![]).await.unwrap();
        let TurnResult::Reply(reply) = result else {
            panic!("expected a reply");
        };
        assert!(reply.pending_confirmation);
        // Gate deferred the executor
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.count_pending("conv-1").unwrap(), 1);

        let message = h.processor.approve("conv-1").await.unwrap();
        assert!(message.contains("web_search"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);

        // Idempotent against double invocation
        let again = h.processor.approve("conv-1").await.unwrap();
        assert_eq!(again, "Nothing to approve.");
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_is_idempotent_and_never_executes() {
        let h = harness(true);
        h.llm.queue_response(tool_use_response("web_search"));
        h.llm.queue_response(text_response("ok"));
        h.processor.process(&event("evt-1"), vec![]).await.unwrap();

        let message = h.processor.reject("conv-1").unwrap();
        assert!(message.contains("Cancelled"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let again = h.processor.reject("conv-1").unwrap();
        assert_eq!(again, "Nothing to reject.");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_turn_carries_a_marker() {
        let h = harness(false);
        let processor = TurnProcessor::new(
            BotConfig {
                max_iterations: 1,
                pacing_delay: Duration::from_millis(0),
                ..BotConfig::default()
            },
            h.store.clone(),
            Arc::new(ToolRegistry::standard()),
            h.llm.clone() as Arc<dyn LlmService>,
            h.llm.clone() as Arc<dyn LlmService>,
        );

        h.llm.queue_response(tool_use_response("list_skills"));

        let result = processor.process(&event("evt-9"), vec![]).await.unwrap();
        let TurnResult::Reply(reply) = result else {
            panic!("expected a reply");
        };
        assert!(reply.text.contains("ran out of time"));
    }

    #[test]
    fn previously_used_tools_derives_from_assistant_turns() {
        let history = vec![
            LlmMessage::user_text("tweet something"),
            LlmMessage::assistant(vec![
                ContentBlock::text("on it"),
                ContentBlock::tool_use("t1", "post_update", json!({})),
            ]),
            LlmMessage::user(vec![ContentBlock::tool_result("t1", "ok", false)]),
        ];
        assert_eq!(previously_used_tools(&history), vec!["post_update"]);
    }
}
