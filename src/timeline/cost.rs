//! Cost and token rollups.
//!
//! [`GroupRollup`] is computed once per phase group when the group is
//! finalized. [`CostSummary`] is the session-wide statistic over the flat
//! entry list; [`CostSummaryCache`] recomputes it only when the list length
//! changes.

use serde::{Deserialize, Serialize};

use crate::model::entry::null_as_default;
use crate::model::{Entry, ReforgeBlock, SoundingsBlock};

/// Totals for one phase group and the blocks attached to it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupRollup {
    pub cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub entries: usize,
}

impl GroupRollup {
    fn add(&mut self, entry: &Entry) {
        self.cost += entry.cost;
        self.tokens_in += entry.tokens_in;
        self.tokens_out += entry.tokens_out;
        self.entries += 1;
    }
}

/// Sum the rendered main-flow entries of a group plus every entry of the
/// blocks attached to it (sounding attempts, evaluator, reforge steps).
pub fn rollup(
    messages: &[Entry],
    soundings: Option<&SoundingsBlock>,
    reforge: Option<&ReforgeBlock>,
) -> GroupRollup {
    let mut totals = GroupRollup::default();
    let block_entries = soundings
        .into_iter()
        .flat_map(|b| b.entries())
        .chain(reforge.into_iter().flat_map(|b| b.entries()));
    for entry in messages.iter().chain(block_entries) {
        totals.add(entry);
    }
    totals
}

/// The single most expensive entry of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MostExpensive {
    pub index: usize,
    pub cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_in: u64,
}

/// Session-wide cost statistics over the flat entry list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens_in: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens_out: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages_with_cost: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_messages: usize,
    #[serde(default)]
    pub most_expensive: Option<MostExpensive>,
}

impl CostSummary {
    /// Compute the summary in one pass.
    ///
    /// `most_expensive` is the arg-max by cost; on ties the earliest index
    /// wins because only a strictly greater cost replaces the current pick.
    /// Entries with zero cost are never picked.
    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut summary = Self {
            total_messages: entries.len(),
            ..Default::default()
        };
        for (index, entry) in entries.iter().enumerate() {
            summary.total_cost += entry.cost;
            summary.total_tokens_in += entry.tokens_in;
            summary.total_tokens_out += entry.tokens_out;
            if entry.has_cost() {
                summary.messages_with_cost += 1;
            }
            let current = summary.most_expensive.map(|m| m.cost).unwrap_or(0.0);
            if entry.cost > current {
                summary.most_expensive = Some(MostExpensive {
                    index,
                    cost: entry.cost,
                    tokens_in: entry.tokens_in,
                });
            }
        }
        summary
    }

    pub fn average_cost(&self) -> f64 {
        if self.messages_with_cost == 0 {
            return 0.0;
        }
        self.total_cost / self.messages_with_cost as f64
    }
}

/// Memoized [`CostSummary`], invalidated when the entry count changes.
///
/// The log is append-only, so a length change is the only way its totals move.
#[derive(Debug, Default)]
pub struct CostSummaryCache {
    len: Option<usize>,
    summary: CostSummary,
}

impl CostSummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, entries: &[Entry]) -> &CostSummary {
        if self.len != Some(entries.len()) {
            self.summary = CostSummary::from_entries(entries);
            self.len = Some(entries.len());
        }
        &self.summary
    }

    pub fn invalidate(&mut self) {
        self.len = None;
        self.summary = CostSummary::default();
    }
}
