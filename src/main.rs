//! relaybot - a conversational agent with confirmation-gated tools
//!
//! Binary entry point. Wires the record store, tool registry, model
//! services, and turn processor together, then drives turns from a
//! line-oriented stdin transport. Each line is one inbound event;
//! `/approve` and `/reject` act on the newest pending action.

mod agent;
mod config;
mod dispatch;
mod gate;
mod llm;
mod relevance;
mod router;
mod store;
#[cfg(test)]
mod testing;
mod tools;
mod turn;

use config::BotConfig;
use llm::{AnthropicModel, AnthropicService, LlmConfig, LlmMessage, LlmService, LoggingService};
use std::path::PathBuf;
use std::sync::Arc;
use store::RecordStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turn::{InboundEvent, TurnProcessor, TurnResult};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaybot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env();
    let llm_config = LlmConfig::from_env();

    let Some(api_key) = llm_config.anthropic_api_key.clone() else {
        return Err("ANTHROPIC_API_KEY is not set".into());
    };

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = RecordStore::open(&config.db_path)?;
    tracing::info!(db_path = %config.db_path, "Record store opened");

    let registry = Arc::new(ToolRegistry::standard());
    tracing::info!(tool_count = registry.definitions().len(), "Tool registry ready");

    let light = model_service(
        api_key.clone(),
        AnthropicModel::Claude45Haiku,
        llm_config.base_url.as_deref(),
    )?;
    let standard = model_service(
        api_key,
        AnthropicModel::Claude45Sonnet,
        llm_config.base_url.as_deref(),
    )?;

    let processor = TurnProcessor::new(config, store, registry, light, standard);

    run_stdin_transport(&processor).await
}

fn model_service(
    api_key: String,
    model: AnthropicModel,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, Box<dyn std::error::Error>> {
    let service = AnthropicService::new(api_key, model, base_url)?;
    Ok(Arc::new(LoggingService::new(Arc::new(service))))
}

/// Line-oriented local transport. One conversation, one event per line.
async fn run_stdin_transport(
    processor: &TurnProcessor,
) -> Result<(), Box<dyn std::error::Error>> {
    const CONVERSATION_ID: &str = "local";

    println!("relaybot ready. /approve and /reject act on pending actions; /quit exits.");

    let mut history: Vec<LlmMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" => break,
            "/approve" => {
                let message = processor.approve(CONVERSATION_ID).await?;
                println!("{message}");
            }
            "/reject" => {
                let message = processor.reject(CONVERSATION_ID)?;
                println!("{message}");
            }
            text => {
                let event = InboundEvent {
                    event_id: uuid::Uuid::new_v4().to_string(),
                    conversation_id: CONVERSATION_ID.to_string(),
                    text: text.to_string(),
                    background: false,
                };
                match processor.process(&event, history.clone()).await {
                    Ok(TurnResult::Reply(reply)) => {
                        history.push(LlmMessage::user_text(text));
                        if !reply.text.is_empty() {
                            history.push(LlmMessage::assistant(vec![llm::ContentBlock::text(
                                reply.text.clone(),
                            )]));
                            println!("{}", reply.text);
                        }
                        if reply.pending_confirmation {
                            println!("(an action is awaiting /approve or /reject)");
                        }
                    }
                    Ok(TurnResult::DuplicateDelivery | TurnResult::Busy) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Turn failed");
                        println!("Something went wrong: {e}");
                    }
                }
            }
        }
    }

    Ok(())
}
