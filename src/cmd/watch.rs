//! Live session follow: `cockpit watch`.

use std::sync::Arc;

use anyhow::{Context, Result};

use cockpit::client::HttpClient;
use cockpit::config::CockpitConfig;
use cockpit::live::OrchestrationStatus;
use cockpit::session::{ControllerSettings, SessionController};
use cockpit::ui::{WatchUI, render_status_line};

pub async fn cmd_watch(config: &CockpitConfig, session_id: &str) -> Result<()> {
    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let mut controller =
        SessionController::new(Arc::new(client), session_id, ControllerSettings::from(config));
    let ui = WatchUI::new(session_id);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let mut last_status = OrchestrationStatus::Idle;
    let mut last_phase: Option<String> = None;
    controller
        .run(shutdown, |c| {
            let state = c.reducer().state();
            if state.current_phase != last_phase {
                if let Some(phase) = &state.current_phase {
                    ui.println(format!("phase: {}", phase));
                }
                last_phase = state.current_phase.clone();
            }
            if state.status != last_status {
                if state.status == OrchestrationStatus::WaitingHuman {
                    ui.println(
                        "Waiting for a human response. Use `cockpit checkpoints` and `cockpit respond`.",
                    );
                }
                last_status = state.status;
            }
            ui.update(c.view_state(), state, c.reducer().ghosts(), c.banner());
        })
        .await;

    ui.finish(&render_status_line(controller.reducer().state()));
    Ok(())
}
