//! Media tools: sending stored media and image generation

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Queue a stored media object for delivery to the chat transport
pub struct SendMediaTool;

#[derive(Debug, Deserialize)]
struct SendMediaInput {
    media_key: String,
    #[serde(default)]
    caption: Option<String>,
}

#[async_trait]
impl Tool for SendMediaTool {
    fn name(&self) -> &'static str {
        "send_media"
    }

    fn description(&self) -> String {
        "Send a previously stored media object (image or video) to the user, optionally with a caption.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["media_key"],
            "properties": {
                "media_key": {
                    "type": "string",
                    "description": "Storage key of the media object to send"
                },
                "caption": {
                    "type": "string",
                    "description": "Optional caption"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: SendMediaInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        // Delivery itself is the transport layer's job; the tool records the
        // request so the caller can attach the media to the outgoing reply.
        tracing::info!(
            conversation_id = %ctx.conversation_id,
            media_key = %input.media_key,
            "Media send requested"
        );
        let caption = input.caption.unwrap_or_default();
        ToolOutput::success(format!(
            "Queued media '{}' for delivery{}",
            input.media_key,
            if caption.is_empty() {
                String::new()
            } else {
                format!(" with caption: {caption}")
            }
        ))
    }
}

/// Generate an image through the configured image service. Gated: generation
/// is billed per call, so it requires explicit user approval.
pub struct GenerateImageTool;

#[derive(Debug, Deserialize)]
struct GenerateImageInput {
    prompt: String,
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> String {
        "Generate an image from a text prompt. Requires user approval before running.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["prompt"],
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Text description of the image to generate"
                }
            }
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: GenerateImageInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let endpoint = match std::env::var("RELAYBOT_IMAGE_URL") {
            Ok(url) => url,
            Err(_) => return ToolOutput::error("Image service not configured"),
        };

        let response = ctx
            .http
            .post(&endpoint)
            .json(&json!({ "prompt": input.prompt }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => ToolOutput::success(body),
                Err(e) => ToolOutput::error(format!("Failed to read image response: {e}")),
            },
            Ok(resp) => ToolOutput::error(format!("Image generation failed: HTTP {}", resp.status())),
            Err(e) => ToolOutput::error(format!("Image request failed: {e}")),
        }
    }
}
