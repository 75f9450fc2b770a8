//! One-shot session inspection: `cockpit timeline`, `checkpoints`, `respond`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;

use cockpit::client::{CockpitApi, HttpClient};
use cockpit::config::CockpitConfig;
use cockpit::session::{ControllerSettings, SessionController, ViewState};
use cockpit::ui;
use cockpit::ui::icons::CHECK;

use super::parse_response;

pub async fn cmd_timeline(config: &CockpitConfig, session_id: &str, json: bool) -> Result<()> {
    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let mut controller =
        SessionController::new(Arc::new(client), session_id, ControllerSettings::from(config));
    controller.refresh().await;

    match controller.view_state() {
        ViewState::Loading => {
            let reason = controller.banner().unwrap_or("no response");
            bail!("Failed to load session {}: {}", session_id, reason);
        }
        ViewState::WaitingForData => {
            println!(
                "Session {} has not logged anything yet. Try again shortly.",
                session_id
            );
        }
        ViewState::Ready => {
            let Some(view) = controller.view() else {
                return Ok(());
            };
            if json {
                let out = serde_json::to_string_pretty(&view.groups)
                    .context("Failed to serialize timeline")?;
                println!("{}", out);
                return Ok(());
            }

            println!();
            println!("{} {}", style("Session").bold(), session_id);
            println!();
            print!("{}", ui::render_timeline(view));

            let ghosts = controller.reducer().ghosts();
            if !ghosts.is_empty() {
                println!();
                println!("{}", style("Latest activity:").dim());
                print!("{}", ui::render_ghosts(ghosts));
            }
            if let Some(cp) = controller.pending_checkpoint() {
                println!();
                println!(
                    "Checkpoint {} is waiting for a response: cockpit respond {} --response <json>",
                    style(&cp.id).bold(),
                    cp.id
                );
            }
            println!();
        }
    }
    Ok(())
}

pub async fn cmd_checkpoints(config: &CockpitConfig, session_id: &str) -> Result<()> {
    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let checkpoints = client
        .checkpoints(session_id)
        .await
        .with_context(|| format!("Failed to fetch checkpoints for {}", session_id))?;
    print!("{}", ui::render_checkpoints(&checkpoints));
    Ok(())
}

pub async fn cmd_respond(config: &CockpitConfig, checkpoint_id: &str, raw: &str) -> Result<()> {
    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let response = parse_response(raw);
    client
        .respond_to_checkpoint(checkpoint_id, &response)
        .await
        .with_context(|| format!("Failed to respond to checkpoint {}", checkpoint_id))?;
    println!("{}Responded to checkpoint {}", CHECK, checkpoint_id);
    Ok(())
}
