//! Text rendering of a reconstructed timeline.
//!
//! Every function returns a `String`; callers decide where it goes.

use std::fmt::Write as _;

use console::style;

use crate::model::{Entry, ReforgeBlock, SoundingsBlock};
use crate::session::TimelineView;
use crate::timeline::PhaseGroup;
use crate::timeline::cost::CostSummary;
use crate::ui::icons::{COST, PHASE, REFORGE, SOUNDINGS, WINNER};

/// Preview width for message content.
const PREVIEW_WIDTH: usize = 96;
const PREVIEW_LINES: usize = 2;

pub fn render_timeline(view: &TimelineView) -> String {
    let mut out = String::new();
    for group in &view.groups {
        out.push_str(&render_group(group));
    }
    out.push_str(&render_cost_summary(&view.cost));
    out
}

pub fn render_group(group: &PhaseGroup) -> String {
    let mut out = String::new();
    let indent = if group.is_unknown() {
        ""
    } else {
        let mut header = format!("{}{}", PHASE, style(&group.phase_name).bold());
        if group.has_soundings {
            let _ = write!(header, " {}", SOUNDINGS);
        }
        if group.has_reforge {
            let _ = write!(header, " {}", REFORGE);
        }
        let _ = writeln!(
            out,
            "{}  {}",
            header,
            style(format!(
                "${:.4} · {} in / {} out · {} msgs",
                group.aggregated_cost,
                group.aggregated_tokens,
                group.aggregated_tokens_out,
                group.message_count
            ))
            .dim()
        );
        "  "
    };

    for entry in &group.messages {
        out.push_str(&render_entry(entry, indent));
    }
    if let Some(block) = &group.soundings {
        out.push_str(&render_soundings(block, indent));
    }
    if let Some(block) = &group.reforge {
        out.push_str(&render_reforge(block, indent));
    }
    out
}

fn render_entry(entry: &Entry, indent: &str) -> String {
    let mut out = String::new();
    let role = if entry.role.is_empty() {
        entry.node_type.as_str()
    } else {
        entry.role.as_str()
    };
    let mut label = format!("{}{}", indent, style(format!("[{}]", role)).cyan());
    if entry.has_cost() {
        let _ = write!(label, " {}", style(format!("${:.4}", entry.cost)).yellow());
    }
    let _ = writeln!(out, "{}", label);

    let text = entry.content_text();
    if !text.trim().is_empty() {
        let pad = format!("{}    ", indent);
        let options = textwrap::Options::new(PREVIEW_WIDTH)
            .initial_indent(&pad)
            .subsequent_indent(&pad);
        let lines = textwrap::wrap(text.trim(), options);
        for line in lines.iter().take(PREVIEW_LINES) {
            let _ = writeln!(out, "{}", line);
        }
        if lines.len() > PREVIEW_LINES {
            let _ = writeln!(out, "{}…", pad);
        }
    }
    out
}

fn render_soundings(block: &SoundingsBlock, indent: &str) -> String {
    let mut out = String::new();
    let winner = block.winner().map(|s| s.index);
    let _ = writeln!(
        out,
        "{}{}{} attempts",
        indent,
        SOUNDINGS,
        block.soundings.len()
    );
    for sounding in &block.soundings {
        let cost: f64 = sounding.messages.iter().map(|e| e.cost).sum();
        let mark = if Some(sounding.index) == winner {
            WINNER.to_string()
        } else {
            "  ".to_string()
        };
        let _ = writeln!(
            out,
            "{}  {}#{} {} msgs ${:.4}",
            indent,
            mark,
            sounding.index,
            sounding.messages.len(),
            cost
        );
    }
    if let Some(evaluator) = &block.evaluator {
        let _ = writeln!(out, "{}  evaluator ${:.4}", indent, evaluator.cost);
    }
    out
}

fn render_reforge(block: &ReforgeBlock, indent: &str) -> String {
    let mut out = String::new();
    let winner = block.winner().map(|s| s.step);
    let _ = writeln!(
        out,
        "{}{}{} refinements",
        indent,
        REFORGE,
        block.reforge_steps.len()
    );
    for step in &block.reforge_steps {
        let cost: f64 = step.messages.iter().map(|e| e.cost).sum();
        let mark = if Some(step.step) == winner {
            WINNER.to_string()
        } else {
            "  ".to_string()
        };
        let _ = writeln!(
            out,
            "{}  {}step {} {} msgs ${:.4}",
            indent,
            mark,
            step.step,
            step.messages.len(),
            cost
        );
    }
    out
}

pub fn render_cost_summary(summary: &CostSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}{} across {} messages ({} with cost, avg ${:.4})",
        COST,
        style(format!("${:.4}", summary.total_cost)).bold(),
        summary.total_messages,
        summary.messages_with_cost,
        summary.average_cost()
    );
    let _ = writeln!(
        out,
        "   tokens: {} in / {} out",
        summary.total_tokens_in, summary.total_tokens_out
    );
    if let Some(top) = summary.most_expensive {
        let _ = writeln!(
            out,
            "   most expensive: message #{} (${:.4}, {} tokens in)",
            top.index, top.cost, top.tokens_in
        );
    }
    out
}
