//! Research-session lineage: `cockpit sessions`, `cockpit branch`.

use anyhow::{Context, Result};
use console::style;

use cockpit::client::{CockpitApi, HttpClient};
use cockpit::config::CockpitConfig;
use cockpit::lineage::LineageTree;
use cockpit::lineage::branch;
use cockpit::ui;
use cockpit::ui::icons::{BRANCH, WARN};

use super::parse_response;

pub async fn cmd_sessions(config: &CockpitConfig, limit: Option<usize>) -> Result<()> {
    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let limit = limit.unwrap_or(config.server.research_session_limit);
    let sessions = client
        .research_sessions(limit)
        .await
        .context("Failed to fetch research sessions")?;

    let tree = LineageTree::from_sessions(sessions);
    if let Err(e) = tree.validate() {
        eprintln!("{}{}", WARN, style(e).yellow());
    }
    print!("{}", ui::render_lineage(&tree));
    Ok(())
}

pub async fn cmd_branch(
    config: &CockpitConfig,
    research_session_id: &str,
    checkpoint_index: usize,
    raw_response: &str,
    yes: bool,
) -> Result<()> {
    use dialoguer::Confirm;

    let client = HttpClient::from_config(config).context("Failed to build HTTP client")?;
    let lineage = client
        .research_session(research_session_id)
        .await
        .with_context(|| format!("Failed to fetch research session {}", research_session_id))?;
    let new_response = parse_response(raw_response);

    // Validate before asking, so a bad index never reaches the prompt.
    branch::prepare_branch(&lineage, checkpoint_index, new_response.clone())?;

    if !yes {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Branch {} from checkpoint {} with a new response?",
                research_session_id, checkpoint_index
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let descriptor = branch::branch(&client, &lineage, checkpoint_index, new_response).await?;
    println!(
        "{}Created session {} (from {} @ checkpoint {})",
        BRANCH,
        style(&descriptor.new_session_id).bold(),
        descriptor.parent_research_session_id,
        descriptor.branch_checkpoint_index
    );
    println!("Follow it with: cockpit watch {}", descriptor.new_session_id);
    Ok(())
}
