use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blocks::{ReforgeBlock, SoundingsBlock};
use super::entry::{Entry, null_as_default};
use crate::timeline::cost::CostSummary;
use crate::timeline::{PhaseGroup, reconstruct};

/// Authoritative snapshot of one session, as served by `GET /message-flow/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageFlow {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub all_messages: Vec<Entry>,
    #[serde(default)]
    pub main_flow: Vec<Entry>,
    /// Flat soundings rows; the grouped form in `soundings_by_phase` is what we render.
    #[serde(default)]
    pub soundings: Vec<Value>,
    #[serde(default)]
    pub soundings_by_phase: Vec<SoundingsBlock>,
    #[serde(default)]
    pub reforge_steps: Vec<Value>,
    #[serde(default)]
    pub reforge_by_phase: Vec<ReforgeBlock>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost_summary: CostSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_messages: usize,
}

impl MessageFlow {
    /// Reconstruct the grouped timeline for this snapshot.
    pub fn phase_groups(&self) -> Vec<PhaseGroup> {
        reconstruct(
            &self.main_flow,
            &self.soundings_by_phase,
            &self.reforge_by_phase,
        )
    }

    /// Highest turn number observed in the log.
    pub fn turn_count(&self) -> u32 {
        self.all_messages
            .iter()
            .chain(self.main_flow.iter())
            .filter_map(|e| e.turn_number)
            .max()
            .map(|t| t + 1)
            .unwrap_or(0)
    }

    /// Entries to scan when deriving state: the full log if the backend sent
    /// one, otherwise the main flow.
    pub fn log(&self) -> &[Entry] {
        if self.all_messages.is_empty() {
            &self.main_flow
        } else {
            &self.all_messages
        }
    }
}
