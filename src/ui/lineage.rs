//! Rendering of checkpoints and research-session trees.

use std::fmt::Write as _;

use console::style;

use crate::lineage::{Checkpoint, CheckpointStatus, LineageTree, ResearchSession};
use crate::ui::icons::{BRANCH, CHECK, CHECKPOINT, WAITING};

const SUMMARY_WIDTH: usize = 72;

pub fn render_checkpoints(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return format!("{}\n", style("No checkpoints").dim());
    }
    let mut out = String::new();
    for (index, cp) in checkpoints.iter().enumerate() {
        let icon = match cp.status {
            CheckpointStatus::Responded => &CHECK,
            CheckpointStatus::Pending => &WAITING,
            CheckpointStatus::Other => &CHECKPOINT,
        };
        let phase = cp.phase_name.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{:>3}. {}{} {} {}",
            index,
            icon,
            style(&cp.id).bold(),
            style(format!("[{}]", phase)).dim(),
            cp.status.as_str()
        );
        if !cp.summary.trim().is_empty() {
            let options = textwrap::Options::new(SUMMARY_WIDTH)
                .initial_indent("     ")
                .subsequent_indent("     ");
            let summary = textwrap::fill(cp.summary.trim(), options);
            let _ = writeln!(out, "{}", summary);
        }
        if let Some(response) = &cp.response {
            let _ = writeln!(out, "     {} {}", style("response:").dim(), response);
        }
    }
    out
}

fn session_line(session: &ResearchSession) -> String {
    let title = if session.title.is_empty() {
        session.original_session_id.as_str()
    } else {
        session.title.as_str()
    };
    let fork = session
        .branch_checkpoint_index
        .map(|i| format!(" @cp{}", i))
        .unwrap_or_default();
    format!(
        "{} {}{} {} ${:.4} {} turns",
        style(&session.id).bold(),
        title,
        style(fork).dim(),
        session.status.as_str(),
        session.total_cost,
        session.total_turns
    )
}

/// Depth-first tree of sessions, children indented under their parent.
pub fn render_lineage(tree: &LineageTree) -> String {
    if tree.is_empty() {
        return format!("{}\n", style("No research sessions").dim());
    }
    let mut out = String::new();
    for (depth, session) in tree.walk() {
        if depth == 0 {
            let _ = writeln!(out, "{}", session_line(session));
        } else {
            let _ = writeln!(
                out,
                "{}{}{}",
                "   ".repeat(depth - 1),
                BRANCH,
                session_line(session)
            );
        }
    }
    out
}
