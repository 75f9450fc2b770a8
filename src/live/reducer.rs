//! The live event reducer.
//!
//! Owns everything the stream is allowed to touch: orchestration status, the
//! ghost buffer, and the events of the current round. Authoritative data is
//! never written from events; milestone events only ask the caller for a
//! snapshot refetch via [`Applied::refetch`].
//!
//! Status machine:
//!
//! | State           | Entered on                                                        |
//! |-----------------|-------------------------------------------------------------------|
//! | `Idle`          | initial, `cascade_complete`, `cascade_error`                      |
//! | `Thinking`      | `cascade_start`, `phase_start`, `turn_start`, `llm_request`,      |
//! |                 | `checkpoint_responded`, `tool_result`/`tool_complete`, user reply |
//! | `ToolRunning`   | `tool_call`                                                       |
//! | `WaitingHuman`  | `checkpoint_created`, `checkpoint_waiting`                        |

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::event::{EventKind, LiveEvent};
use super::ghost::{GhostBuffer, GhostKind, GhostSettings};
use crate::model::{Entry, MessageFlow, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    #[default]
    Idle,
    Thinking,
    ToolRunning,
    WaitingHuman,
}

impl OrchestrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::ToolRunning => "tool_running",
            Self::WaitingHuman => "waiting_human",
        }
    }

    /// The session is doing something or waiting on us.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallInfo {
    pub tool_name: String,
    pub arguments: Value,
    pub at: Option<Timestamp>,
}

/// Client-local view of what the orchestrator is doing. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestrationState {
    pub status: OrchestrationStatus,
    pub current_phase: Option<String>,
    pub current_model: Option<String>,
    pub total_cost: f64,
    pub turn_count: u32,
    pub phase_history: Vec<String>,
    pub last_tool_call: Option<ToolCallInfo>,
}

/// Outcome of feeding one event to the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    /// The event targeted this session and was not ignored.
    pub accepted: bool,
    /// `(from, to)` when the status changed.
    pub transition: Option<(OrchestrationStatus, OrchestrationStatus)>,
    /// Durable state changed server-side; fetch a fresh snapshot.
    pub refetch: bool,
}

#[derive(Debug, Clone)]
pub struct Reducer {
    session_id: String,
    state: OrchestrationState,
    ghosts: GhostBuffer,
    round: Vec<LiveEvent>,
    last_round: Vec<LiveEvent>,
}

const TOOL_NAME_KEYS: &[&str] = &["tool_name", "tool", "name"];

/// Log rows that mark a human answering a checkpoint.
const CHECKPOINT_RESPONSE_MARKERS: &[&str] = &["checkpoint_response", "checkpoint_resumed"];

impl Reducer {
    pub fn new(session_id: impl Into<String>, ghost_settings: GhostSettings) -> Self {
        Self {
            session_id: session_id.into(),
            state: OrchestrationState::default(),
            ghosts: GhostBuffer::new(ghost_settings),
            round: Vec::new(),
            last_round: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &OrchestrationState {
        &self.state
    }

    pub fn status(&self) -> OrchestrationStatus {
        self.state.status
    }

    pub fn ghosts(&self) -> &GhostBuffer {
        &self.ghosts
    }

    /// Events received since the current round began.
    pub fn round_events(&self) -> &[LiveEvent] {
        &self.round
    }

    /// Events of the round the most recent checkpoint closed.
    pub fn last_round(&self) -> &[LiveEvent] {
        &self.last_round
    }

    /// Apply one stream event at time `now` (milliseconds).
    ///
    /// Events for other sessions are discarded before anything else happens.
    pub fn apply(&mut self, event: &LiveEvent, now: i64) -> Applied {
        if !event.is_for(&self.session_id) {
            trace!(kind = event.kind.as_str(), "Ignoring event for another session");
            return Applied::default();
        }

        let before = self.state.status;
        match &event.kind {
            EventKind::Heartbeat | EventKind::Unknown(_) => return Applied::default(),
            EventKind::CascadeStart => {
                self.start_round();
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::PhaseStart => {
                if let Some(phase) = event.data_str(&["phase_name", "phase"]) {
                    self.enter_phase(phase);
                }
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::TurnStart => {
                self.state.turn_count = match event.data_u32(&["turn_number", "turn"]) {
                    Some(turn) => self.state.turn_count.max(turn + 1),
                    None => self.state.turn_count + 1,
                };
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::LlmRequest => {
                if let Some(model) = event.data_str(&["model"]) {
                    self.state.current_model = Some(model.to_string());
                }
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::LlmResponse => {
                if let Some(model) = event.data_str(&["model"]) {
                    self.state.current_model = Some(model.to_string());
                }
            }
            EventKind::ToolCall => {
                let tool_name = event.data_str(TOOL_NAME_KEYS).unwrap_or("tool").to_string();
                let arguments = event
                    .data_value(&["arguments", "args", "input"])
                    .cloned()
                    .unwrap_or(Value::Null);
                self.ghosts.push(
                    GhostKind::ToolCall,
                    Some(tool_name.clone()),
                    arguments.clone(),
                    now,
                );
                self.state.last_tool_call = Some(ToolCallInfo {
                    tool_name,
                    arguments,
                    at: event.timestamp,
                });
                self.state.status = OrchestrationStatus::ToolRunning;
            }
            EventKind::ToolResult | EventKind::ToolComplete => {
                if event.kind == EventKind::ToolResult {
                    let result = event
                        .data_value(&["result", "output", "content"])
                        .cloned()
                        .unwrap_or(Value::Null);
                    let tool_name = event.data_str(TOOL_NAME_KEYS).map(ToString::to_string);
                    self.ghosts.push(GhostKind::ToolResult, tool_name, result, now);
                }
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::CheckpointCreated | EventKind::CheckpointWaiting => {
                self.state.status = OrchestrationStatus::WaitingHuman;
            }
            EventKind::CheckpointResponded => {
                self.start_round();
                self.state.status = OrchestrationStatus::Thinking;
            }
            EventKind::CascadeComplete | EventKind::CascadeError => {
                self.state.status = OrchestrationStatus::Idle;
            }
        }

        if event.kind.closes_round() {
            self.close_round(event);
        } else {
            self.round.push(event.clone());
        }

        let after = self.state.status;
        let transition = (before != after).then_some((before, after));
        if let Some((from, to)) = transition {
            debug!(
                session = %self.session_id,
                event = event.kind.as_str(),
                from = from.as_str(),
                to = to.as_str(),
                "Orchestration status changed"
            );
        }

        Applied {
            accepted: true,
            transition,
            refetch: event.kind.is_milestone(),
        }
    }

    /// Advance ghost expiry. Returns true if the ghost buffer changed.
    pub fn tick(&mut self, now: i64) -> bool {
        self.ghosts.tick(now)
    }

    /// The user submitted a checkpoint response.
    pub fn user_responded(&mut self) {
        self.start_round();
        self.state.status = OrchestrationStatus::Thinking;
    }

    /// Copy authoritative totals from a fresh snapshot.
    pub fn reconcile(&mut self, snapshot: &MessageFlow) {
        let summary_total = snapshot.cost_summary.total_cost;
        self.state.total_cost = if summary_total > 0.0 {
            summary_total
        } else {
            snapshot.log().iter().map(|e| e.cost).sum()
        };
        self.state.turn_count = self.state.turn_count.max(snapshot.turn_count());
        if self.state.current_phase.is_none()
            && let Some(phase) = snapshot.log().last().and_then(|e| e.phase_name.as_deref())
        {
            self.enter_phase(phase);
        }
    }

    /// Rebuild ghosts for a session with no live stream (e.g. a finished one).
    ///
    /// Scans the log backwards from the end to the most recent checkpoint
    /// response marker; everything after that marker is the activity of the
    /// current round. Returns the number of ghosts created.
    pub fn replay_from_snapshot(&mut self, entries: &[Entry], now: i64) -> usize {
        self.ghosts.clear();
        let round_start = entries
            .iter()
            .rposition(is_checkpoint_response)
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut created = 0;
        for entry in entries[round_start..].iter().filter(|e| !e.is_internal) {
            if let Some((kind, tool_name, content)) = ghost_from_entry(entry) {
                self.ghosts.push(kind, tool_name, content, now);
                created += 1;
            }
        }
        debug!(session = %self.session_id, created, "Replayed ghosts from snapshot");
        created
    }

    fn enter_phase(&mut self, phase: &str) {
        self.state.current_phase = Some(phase.to_string());
        if self.state.phase_history.last().map(String::as_str) != Some(phase) {
            self.state.phase_history.push(phase.to_string());
        }
    }

    fn start_round(&mut self) {
        self.ghosts.clear();
        self.round.clear();
    }

    fn close_round(&mut self, boundary: &LiveEvent) {
        self.ghosts.clear();
        self.round.push(boundary.clone());
        self.last_round = std::mem::take(&mut self.round);
    }
}

fn is_checkpoint_response(entry: &Entry) -> bool {
    CHECKPOINT_RESPONSE_MARKERS.contains(&entry.node_type.as_str())
        || CHECKPOINT_RESPONSE_MARKERS.contains(&entry.category.as_str())
}

fn ghost_from_entry(entry: &Entry) -> Option<(GhostKind, Option<String>, Value)> {
    let tool_name = || {
        entry
            .content
            .get("tool_name")
            .or_else(|| entry.content.get("tool"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
    };
    match (entry.node_type.as_str(), entry.role.as_str()) {
        ("tool_call", _) | (_, "tool_call") => Some((
            GhostKind::ToolCall,
            tool_name(),
            entry
                .content
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| entry.content.clone()),
        )),
        ("tool_result", _) | (_, "tool") => Some((
            GhostKind::ToolResult,
            tool_name(),
            entry
                .content
                .get("result")
                .cloned()
                .unwrap_or_else(|| entry.content.clone()),
        )),
        (_, "assistant") => {
            let text = entry.content_text();
            (!text.trim().is_empty()).then(|| (GhostKind::Thinking, None, Value::String(text)))
        }
        _ => None,
    }
}
