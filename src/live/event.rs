use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventError;
use crate::model::Timestamp;

/// Event types carried by the `/events/stream` feed.
///
/// Unknown types are kept as `Unknown` so newer backends never break the
/// reducer; they are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    CascadeStart,
    PhaseStart,
    TurnStart,
    LlmRequest,
    LlmResponse,
    ToolCall,
    ToolResult,
    ToolComplete,
    CheckpointCreated,
    CheckpointWaiting,
    CheckpointResponded,
    CascadeComplete,
    CascadeError,
    Heartbeat,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CascadeStart => "cascade_start",
            Self::PhaseStart => "phase_start",
            Self::TurnStart => "turn_start",
            Self::LlmRequest => "llm_request",
            Self::LlmResponse => "llm_response",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ToolComplete => "tool_complete",
            Self::CheckpointCreated => "checkpoint_created",
            Self::CheckpointWaiting => "checkpoint_waiting",
            Self::CheckpointResponded => "checkpoint_responded",
            Self::CascadeComplete => "cascade_complete",
            Self::CascadeError => "cascade_error",
            Self::Heartbeat => "heartbeat",
            Self::Unknown(raw) => raw,
        }
    }

    /// Events implying that durable state (cost, phase, turn counts) changed.
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::PhaseStart
                | Self::TurnStart
                | Self::LlmResponse
                | Self::ToolResult
                | Self::ToolComplete
                | Self::CheckpointCreated
                | Self::CheckpointWaiting
                | Self::CheckpointResponded
                | Self::CascadeComplete
                | Self::CascadeError
        )
    }

    /// A checkpoint ends the current round of autonomous activity.
    pub fn closes_round(&self) -> bool {
        matches!(self, Self::CheckpointCreated | Self::CheckpointWaiting)
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "cascade_start" => Self::CascadeStart,
            "phase_start" => Self::PhaseStart,
            "turn_start" => Self::TurnStart,
            "llm_request" => Self::LlmRequest,
            "llm_response" => Self::LlmResponse,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "tool_complete" => Self::ToolComplete,
            "checkpoint_created" => Self::CheckpointCreated,
            "checkpoint_waiting" => Self::CheckpointWaiting,
            "checkpoint_responded" => Self::CheckpointResponded,
            "cascade_complete" => Self::CascadeComplete,
            "cascade_error" => Self::CascadeError,
            "heartbeat" => Self::Heartbeat,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One message of the live event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl LiveEvent {
    pub fn new(kind: EventKind, session_id: &str, data: Value) -> Self {
        Self {
            kind,
            session_id: Some(session_id.to_string()),
            data,
            timestamp: None,
        }
    }

    /// Decode one stream message.
    pub fn parse(raw: &str) -> Result<Self, EventError> {
        serde_json::from_str(raw).map_err(|source| EventError::MalformedEvent {
            preview: preview(raw, 80),
            source,
        })
    }

    pub fn is_for(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// First string field of `data` among `keys`.
    pub fn data_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.data.get(*k).and_then(|v| v.as_str()))
    }

    /// First field of `data` among `keys`, as raw JSON.
    pub fn data_value(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .find_map(|k| self.data.get(*k).filter(|v| !v.is_null()))
    }

    pub fn data_u32(&self, keys: &[&str]) -> Option<u32> {
        keys.iter().find_map(|k| {
            self.data
                .get(*k)
                .and_then(|v| v.as_u64())
                .and_then(|n| u32::try_from(n).ok())
        })
    }
}

fn preview(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
