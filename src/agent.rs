//! Agentic orchestration loop
//!
//! Drives the model through zero or more tool invocations to a final answer.
//! Each iteration sends the conversation plus the exposed tool definitions to
//! the model service; tool requests are executed sequentially in request
//! order and their results appended as a single synthetic user turn. The
//! loop stops on a non-tool-use stop reason, or when the iteration cap or
//! wall-clock deadline is reached - exhaustion is a normal, reportable
//! outcome, never an error. Deadline checks happen only at iteration
//! boundaries; an in-flight model request or tool call is never interrupted.

use crate::dispatch::ToolExecutor;
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmService, StopReason, SystemContent,
    ToolDefinition, Usage,
};
use crate::tools::ToolContext;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Audit entry produced once per tool invocation inside a turn
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: Value,
    pub result: String,
    pub is_error: bool,
    pub duration: Duration,
    pub was_confirmation_gated: bool,
}

/// One turn's worth of input for the loop
pub struct LoopRequest {
    pub system_prompt: String,
    pub messages: Vec<LlmMessage>,
    /// Tool definitions to expose; empty means no tools this turn
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Result of running a turn to completion or exhaustion
#[derive(Debug)]
pub struct TurnOutcome {
    /// Best accumulated answer text
    pub text: String,
    pub records: Vec<ToolCallRecord>,
    pub usage: Usage,
    /// Model-service calls made this turn
    pub iterations: u32,
    /// True when the iteration cap or deadline ended the turn
    pub exhausted: bool,
}

/// Bounds for a single turn
#[derive(Debug, Clone, Copy)]
pub struct LoopBounds {
    pub max_iterations: u32,
    pub deadline: Duration,
    /// Pacing delay before every iteration after the first
    pub pacing_delay: Duration,
}

type IterationHook = Box<dyn Fn(u32) + Send + Sync>;

/// The orchestration loop over a model client and a tool executor
pub struct AgentLoop<L, E> {
    llm: L,
    /// None disables tool execution entirely; the first response terminates
    executor: Option<E>,
    bounds: LoopBounds,
    /// Called after each completed iteration, to refresh upstream liveness
    /// indicators (typing notifications and the like)
    iteration_hook: Option<IterationHook>,
}

impl<L, E> AgentLoop<L, E>
where
    L: LlmService,
    E: ToolExecutor,
{
    pub fn new(llm: L, executor: Option<E>, bounds: LoopBounds) -> Self {
        Self {
            llm,
            executor,
            bounds,
            iteration_hook: None,
        }
    }

    pub fn with_iteration_hook(mut self, hook: IterationHook) -> Self {
        self.iteration_hook = Some(hook);
        self
    }

    /// Run one turn. Model-service errors escalate and end the turn; tool
    /// faults never do.
    pub async fn run(&self, ctx: &ToolContext, request: LoopRequest) -> Result<TurnOutcome, LlmError> {
        let started = Instant::now();
        let mut messages = request.messages;
        let mut usage = Usage::default();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut latest_text = String::new();
        let mut iterations: u32 = 0;

        loop {
            if iterations >= self.bounds.max_iterations {
                tracing::info!(iterations, "Iteration cap reached, returning best answer");
                return Ok(self.exhausted_outcome(latest_text, records, usage, iterations));
            }
            if started.elapsed() >= self.bounds.deadline {
                tracing::info!(
                    elapsed_ms = %started.elapsed().as_millis(),
                    "Turn deadline reached, returning best answer"
                );
                return Ok(self.exhausted_outcome(latest_text, records, usage, iterations));
            }

            if iterations > 0 {
                // Steady-state pacing, independent of retry backoff
                tokio::time::sleep(self.bounds.pacing_delay).await;
            }

            let llm_request = LlmRequest {
                system: vec![SystemContent::cached(&request.system_prompt)],
                messages: messages.clone(),
                tools: request.tools.clone(),
                max_tokens: request.max_tokens,
            };

            let response = self.llm.complete(&llm_request).await?;
            iterations += 1;
            usage.accumulate(&response.usage);

            let text = response.text();
            if !text.is_empty() {
                latest_text = text;
            }

            let tool_uses: Vec<(String, String, Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            let Some(executor) = &self.executor else {
                return Ok(self.final_outcome(latest_text, records, usage, iterations));
            };
            if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
                return Ok(self.final_outcome(latest_text, records, usage, iterations));
            }

            // The model's full response becomes the assistant turn, tool-use
            // blocks included, so request->result correspondence is preserved.
            messages.push(LlmMessage::assistant(response.content));

            let mut results: Vec<ContentBlock> = Vec::with_capacity(tool_uses.len());
            for (tool_use_id, name, input) in tool_uses {
                let call_started = Instant::now();
                let dispatch = executor.execute(&name, input.clone(), ctx.clone()).await;
                let duration = call_started.elapsed();

                tracing::info!(
                    tool = %name,
                    is_error = dispatch.output.is_error,
                    gated = dispatch.gated,
                    duration_ms = %duration.as_millis(),
                    "Tool invocation completed"
                );

                results.push(ContentBlock::tool_result(
                    &tool_use_id,
                    &dispatch.output.output,
                    dispatch.output.is_error,
                ));
                records.push(ToolCallRecord {
                    tool_name: name,
                    input,
                    result: dispatch.output.output,
                    is_error: dispatch.output.is_error,
                    duration,
                    was_confirmation_gated: dispatch.gated,
                });
            }

            // One synthetic results turn per iteration, one result per request
            messages.push(LlmMessage::user(results));

            if let Some(hook) = &self.iteration_hook {
                hook(iterations);
            }
        }
    }

    fn final_outcome(
        &self,
        text: String,
        records: Vec<ToolCallRecord>,
        usage: Usage,
        iterations: u32,
    ) -> TurnOutcome {
        TurnOutcome {
            text,
            records,
            usage,
            iterations,
            exhausted: false,
        }
    }

    fn exhausted_outcome(
        &self,
        text: String,
        records: Vec<ToolCallRecord>,
        usage: Usage,
        iterations: u32,
    ) -> TurnOutcome {
        TurnOutcome {
            text,
            records,
            usage,
            iterations,
            exhausted: true,
        }
    }
}
