//! Search and fetch tools (core category)
//!
//! Thin request/response wrappers; the orchestration core treats their
//! internals as external collaborators.

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Web search via the configured search endpoint
pub struct WebSearchTool;

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> String {
        "Search the web and return a short list of result titles, URLs, and snippets.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: WebSearchInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let endpoint = match std::env::var("RELAYBOT_SEARCH_URL") {
            Ok(url) => url,
            Err(_) => return ToolOutput::error("Search endpoint not configured"),
        };

        let response = ctx
            .http
            .get(&endpoint)
            .query(&[("q", input.query.as_str())])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => ToolOutput::success(body),
                Err(e) => ToolOutput::error(format!("Failed to read search response: {e}")),
            },
            Ok(resp) => ToolOutput::error(format!("Search failed: HTTP {}", resp.status())),
            Err(e) => ToolOutput::error(format!("Search request failed: {e}")),
        }
    }
}

/// Fetch a URL and return its body text
pub struct FetchUrlTool;

#[derive(Debug, Deserialize)]
struct FetchUrlInput {
    url: String,
}

/// Bodies larger than this are truncated before being shown to the model
const MAX_BODY_CHARS: usize = 20_000;

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn description(&self) -> String {
        "Fetch the contents of a URL. Large bodies are truncated.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: FetchUrlInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
            return ToolOutput::error("Only http(s) URLs are supported");
        }

        match ctx.http.get(&input.url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(mut body) => {
                    if body.chars().count() > MAX_BODY_CHARS {
                        body = body.chars().take(MAX_BODY_CHARS).collect();
                        body.push_str("\n[truncated]");
                    }
                    ToolOutput::success(body)
                }
                Err(e) => ToolOutput::error(format!("Failed to read body: {e}")),
            },
            Ok(resp) => ToolOutput::error(format!("Fetch failed: HTTP {}", resp.status())),
            Err(e) => ToolOutput::error(format!("Fetch request failed: {e}")),
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

    #[tokio::test]
    async fn web_search_rejects_bad_input() {
        let result = WebSearchTool.run(json!({}), test_context()).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn fetch_url_rejects_non_http_schemes() {
        let result = FetchUrlTool
            .run(json!({"url": "file:///etc/passwd"}), test_context())
            .await;
        assert!(result.is_error);
    }
}
