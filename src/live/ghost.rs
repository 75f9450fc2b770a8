//! Ephemeral "ghost" activity: in-flight tool calls and thinking shown
//! before the authoritative log catches up.
//!
//! Ghosts expire in two steps. After `lifetime_ms` a ghost is marked
//! `exiting`; `exit_ms` later it is removed. Both steps happen in [`GhostBuffer::tick`],
//! driven by the caller's clock, so rendering is a pure read of the buffer.
//!
//! Times are milliseconds on any monotonic scale the caller chooses.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_LIFETIME_MS: i64 = 8_000;
pub const DEFAULT_EXIT_MS: i64 = 400;

/// Oldest ghosts are dropped past this many.
pub const DEFAULT_MAX_GHOSTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostKind {
    ToolCall,
    ToolResult,
    Thinking,
}

impl GhostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Thinking => "thinking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GhostMessage {
    pub id: u64,
    pub kind: GhostKind,
    pub tool_name: Option<String>,
    /// Arguments for tool calls, the result for tool results, text for thinking.
    pub content: Value,
    pub created_at: i64,
    pub exiting: bool,
    pub exit_started_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhostSettings {
    pub lifetime_ms: i64,
    pub exit_ms: i64,
    pub max_ghosts: usize,
}

impl Default for GhostSettings {
    fn default() -> Self {
        Self {
            lifetime_ms: DEFAULT_LIFETIME_MS,
            exit_ms: DEFAULT_EXIT_MS,
            max_ghosts: DEFAULT_MAX_GHOSTS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GhostBuffer {
    settings: GhostSettings,
    ghosts: VecDeque<GhostMessage>,
    next_id: u64,
}

impl GhostBuffer {
    pub fn new(settings: GhostSettings) -> Self {
        Self {
            settings,
            ghosts: VecDeque::new(),
            next_id: 0,
        }
    }

    pub fn settings(&self) -> GhostSettings {
        self.settings
    }

    /// Add a ghost and return its id.
    pub fn push(
        &mut self,
        kind: GhostKind,
        tool_name: Option<String>,
        content: Value,
        now: i64,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.settings.max_ghosts > 0 && self.ghosts.len() >= self.settings.max_ghosts {
            self.ghosts.pop_front();
        }
        self.ghosts.push_back(GhostMessage {
            id,
            kind,
            tool_name,
            content,
            created_at: now,
            exiting: false,
            exit_started_at: None,
        });
        id
    }

    /// Drop every ghost at once (round boundary).
    pub fn clear(&mut self) {
        self.ghosts.clear();
    }

    /// Advance expiry to `now`. Returns true if anything changed.
    ///
    /// The exit window starts at the scheduled end of the visible lifetime,
    /// not at the tick that noticed it, so sparse ticks still remove ghosts on time.
    pub fn tick(&mut self, now: i64) -> bool {
        let GhostSettings {
            lifetime_ms,
            exit_ms,
            ..
        } = self.settings;
        let mut changed = false;

        for ghost in self.ghosts.iter_mut().filter(|g| !g.exiting) {
            let exit_at = ghost.created_at + lifetime_ms;
            if now >= exit_at {
                ghost.exiting = true;
                ghost.exit_started_at = Some(exit_at);
                changed = true;
            }
        }

        let before = self.ghosts.len();
        self.ghosts
            .retain(|g| g.exit_started_at.is_none_or(|started| now < started + exit_ms));
        changed || self.ghosts.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &GhostMessage> {
        self.ghosts.iter()
    }

    pub fn get(&self, id: u64) -> Option<&GhostMessage> {
        self.ghosts.iter().find(|g| g.id == id)
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }
}
