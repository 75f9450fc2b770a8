//! Live status line, ghost activity, and the `watch` spinner.

use std::fmt::Write as _;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::live::{GhostBuffer, GhostKind, OrchestrationState, OrchestrationStatus};
use crate::session::ViewState;
use crate::ui::icons::{IDLE, THINKING, TOOL, WAITING, WARN};

const GHOST_PREVIEW: usize = 60;

pub fn status_icon(status: OrchestrationStatus) -> String {
    match status {
        OrchestrationStatus::Idle => &IDLE,
        OrchestrationStatus::Thinking => &THINKING,
        OrchestrationStatus::ToolRunning => &TOOL,
        OrchestrationStatus::WaitingHuman => &WAITING,
    }
    .to_string()
}

/// One-line summary: status, phase, model, cost and turns.
pub fn render_status_line(state: &OrchestrationState) -> String {
    let mut line = format!(
        "{}{}",
        status_icon(state.status),
        style(state.status.as_str()).bold()
    );
    if let Some(phase) = &state.current_phase {
        let _ = write!(line, " · {}", phase);
    }
    if let Some(model) = &state.current_model {
        let _ = write!(line, " · {}", style(model).dim());
    }
    let _ = write!(
        line,
        " · ${:.4} · turn {}",
        state.total_cost, state.turn_count
    );
    if state.status == OrchestrationStatus::ToolRunning
        && let Some(call) = &state.last_tool_call
    {
        let _ = write!(line, " · {}", style(&call.tool_name).cyan());
    }
    line
}

/// In-flight activity, exiting ghosts dimmed.
pub fn render_ghosts(ghosts: &GhostBuffer) -> String {
    let mut out = String::new();
    for ghost in ghosts.iter() {
        let label = match ghost.kind {
            GhostKind::ToolCall => format!(
                "→ {}",
                ghost.tool_name.as_deref().unwrap_or("tool")
            ),
            GhostKind::ToolResult => format!(
                "← {}",
                ghost.tool_name.as_deref().unwrap_or("result")
            ),
            GhostKind::Thinking => "…".to_string(),
        };
        let content = match &ghost.content {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let preview = truncate(content.trim(), GHOST_PREVIEW);
        let line = format!("  {} {}", label, preview);
        let line = if ghost.exiting {
            style(line).dim().to_string()
        } else {
            line
        };
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

/// Spinner shown by `cockpit watch`, updated with the status line.
pub struct WatchUI {
    bar: ProgressBar,
}

impl WatchUI {
    pub fn new(session_id: &str) -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_prefix(session_id.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Redraw for the current view state, live state and banner.
    pub fn update(
        &self,
        view_state: ViewState,
        state: &OrchestrationState,
        ghosts: &GhostBuffer,
        banner: Option<&str>,
    ) {
        let mut msg = match view_state {
            ViewState::Loading => "loading…".to_string(),
            ViewState::WaitingForData => "waiting for data…".to_string(),
            ViewState::Ready => render_status_line(state),
        };
        if let Some(banner) = banner {
            let _ = write!(msg, "  {}{}", WARN, style(banner).yellow());
        }
        let ghost_lines = render_ghosts(ghosts);
        if !ghost_lines.is_empty() {
            msg.push('\n');
            msg.push_str(ghost_lines.trim_end());
        }
        self.bar.set_message(msg);
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    pub fn finish(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }
}
