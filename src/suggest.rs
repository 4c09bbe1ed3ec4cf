//! `ambient suggest`: push one draft through the engine and print the card.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::engine::ContextEngine;
use crate::types::{ContextMode, ContextRequest};

pub async fn run_suggest(
    config: &Config,
    draft: &str,
    recipient: &str,
    mode: ContextMode,
    channel: Option<String>,
) -> Result<()> {
    let engine = ContextEngine::from_config(config)?;
    if !engine.directory().is_known_recipient(recipient) {
        bail!("Invalid recipientId: {}", recipient);
    }

    let response = engine
        .suggest(ContextRequest {
            draft_text: draft.to_string(),
            recipient_id: recipient.to_string(),
            mode,
            channel_id: channel,
            client_key: "cli".to_string(),
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
