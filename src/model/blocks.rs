//! Side-channel block collections: soundings (parallel attempts at a phase)
//! and reforge (sequential refinements of a phase).
//!
//! A phase has at most one block of each kind. Blocks may be observed while
//! the phase is still running, so no helper here assumes a winner exists.

use serde::{Deserialize, Serialize};

use super::entry::{Entry, Timestamp, null_as_default};

/// One of N parallel attempts at a phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sounding {
    pub index: u32,
    #[serde(default)]
    pub messages: Vec<Entry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_winner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundingsBlock {
    pub phase_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_timestamp: Timestamp,
    #[serde(default)]
    pub soundings: Vec<Sounding>,
    /// The LLM call that judged the attempts, if it has run.
    #[serde(default)]
    pub evaluator: Option<Entry>,
    #[serde(default)]
    pub winner_index: Option<u32>,
}

impl SoundingsBlock {
    /// The winning attempt, if one has been chosen.
    pub fn winner(&self) -> Option<&Sounding> {
        match self.winner_index {
            Some(index) => self.soundings.iter().find(|s| s.index == index),
            None => self.soundings.iter().find(|s| s.is_winner),
        }
    }

    /// Every entry owned by this block: attempt messages, then the evaluator.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.soundings
            .iter()
            .flat_map(|s| s.messages.iter())
            .chain(self.evaluator.iter())
    }
}

/// One sequential refinement attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReforgeStep {
    pub step: u32,
    #[serde(default)]
    pub messages: Vec<Entry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_winner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReforgeBlock {
    pub phase_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_timestamp: Timestamp,
    #[serde(default)]
    pub reforge_steps: Vec<ReforgeStep>,
    #[serde(default)]
    pub winner_step: Option<u32>,
}

impl ReforgeBlock {
    pub fn winner(&self) -> Option<&ReforgeStep> {
        match self.winner_step {
            Some(step) => self.reforge_steps.iter().find(|s| s.step == step),
            None => self.reforge_steps.iter().find(|s| s.is_winner),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.reforge_steps.iter().flat_map(|s| s.messages.iter())
    }
}
