//! Social platform tools
//!
//! `post_update` is the canonical gated tool: it publishes externally, so it
//! never runs without explicit approval.

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Post an update to the configured social platform. Gated.
pub struct PostUpdateTool;

#[derive(Debug, Deserialize)]
struct PostUpdateInput {
    text: String,
}

const MAX_POST_CHARS: usize = 280;

#[async_trait]
impl Tool for PostUpdateTool {
    fn name(&self) -> &'static str {
        "post_update"
    }

    fn description(&self) -> String {
        "Publish a post to the connected social account. Requires user approval before running.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The post text (280 characters max)"
                }
            }
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: PostUpdateInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        if input.text.chars().count() > MAX_POST_CHARS {
            return ToolOutput::error(format!("Post exceeds {MAX_POST_CHARS} characters"));
        }

        let endpoint = match std::env::var("RELAYBOT_SOCIAL_URL") {
            Ok(url) => url,
            Err(_) => return ToolOutput::error("Social platform not configured"),
        };

        let response = ctx
            .http
            .post(format!("{endpoint}/posts"))
            .json(&json!({ "text": input.text }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => ToolOutput::success("Posted"),
            Ok(resp) => ToolOutput::error(format!("Post failed: HTTP {}", resp.status())),
            Err(e) => ToolOutput::error(format!("Post request failed: {e}")),
        }
    }
}

/// Read recent posts from the connected account's timeline. Read-only.
pub struct ReadTimelineTool;

#[derive(Debug, Deserialize)]
struct ReadTimelineInput {
    #[serde(default = "default_count")]
    count: u32,
}

fn default_count() -> u32 {
    10
}

#[async_trait]
impl Tool for ReadTimelineTool {
    fn name(&self) -> &'static str {
        "read_timeline"
    }

    fn description(&self) -> String {
        "Read recent posts from the connected social account's timeline.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "description": "Number of posts to return (default 10)"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: ReadTimelineInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let endpoint = match std::env::var("RELAYBOT_SOCIAL_URL") {
            Ok(url) => url,
            Err(_) => return ToolOutput::error("Social platform not configured"),
        };

        let response = ctx
            .http
            .get(format!("{endpoint}/timeline"))
            .query(&[("count", input.count)])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => ToolOutput::success(body),
                Err(e) => ToolOutput::error(format!("Failed to read timeline: {e}")),
            },
            Ok(resp) => ToolOutput::error(format!("Timeline read failed: HTTP {}", resp.status())),
            Err(e) => ToolOutput::error(format!("Timeline request failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;

    fn test_context() -> ToolContext {
        ToolContext::new("test-conv", RecordStore::open_in_memory().unwrap())
    }

    #[test]
    fn post_update_is_gated() {
        assert!(PostUpdateTool.requires_confirmation());
        assert!(!ReadTimelineTool.requires_confirmation());
    }

    #[tokio::test]
    async fn post_update_rejects_over_length() {
        let text = "x".repeat(MAX_POST_CHARS + 1);
        let result = PostUpdateTool
            .run(json!({"text": text}), test_context())
            .await;
        assert!(result.is_error);
    }
}
