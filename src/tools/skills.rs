//! Skill listing tool (core category)

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Advertised skill: a name plus a one-line summary of what asking for it does
const SKILLS: &[(&str, &str)] = &[
    ("search", "Look things up on the web and summarize the results"),
    ("media", "Generate images and send stored media"),
    ("social", "Read the timeline and draft posts (posting needs approval)"),
    ("chat", "General conversation and question answering"),
];

/// List the capabilities this agent can offer
pub struct ListSkillsTool;

#[async_trait]
impl Tool for ListSkillsTool {
    fn name(&self) -> &'static str {
        "list_skills"
    }

    fn description(&self) -> String {
        "List the skills this agent offers, for answering questions about what it can do.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, _input: Value, _ctx: ToolContext) -> ToolOutput {
        let listing = SKILLS
            .iter()
            .map(|(name, summary)| format!("- {name}: {summary}"))
            .collect::<Vec<_>>()
            .join("\n");
        ToolOutput::success(listing)
    }
}
