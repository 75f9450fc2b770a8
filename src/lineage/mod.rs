//! Checkpoint lineage model.
//!
//! A research session pauses at checkpoints; any responded checkpoint can be
//! the fork point of a child session. Sessions form a strict tree through
//! `parent_session_id`. The client only observes this tree: every mutation
//! happens server-side and is picked up on refetch.

pub mod branch;

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::LineageError;
use crate::model::Timestamp;
use crate::model::entry::null_as_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Responded,
    /// Any status this client does not know about (timed out, cancelled, ...).
    #[serde(other)]
    Other,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Other => "other",
        }
    }
}

/// A pause point where the agent waited for human input.
///
/// Transitions `pending -> responded` exactly once and is immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub phase_name: Option<String>,
    pub status: CheckpointStatus,
    /// Opaque description of the input the agent asked for.
    #[serde(default)]
    pub ui_spec: Value,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl Checkpoint {
    pub fn is_pending(&self) -> bool {
        self.status == CheckpointStatus::Pending
    }

    pub fn is_responded(&self) -> bool {
        self.status == CheckpointStatus::Responded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

/// A persisted session with its ordered checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    /// The live orchestration session this record was saved from.
    pub original_session_id: String,
    #[serde(default)]
    pub parent_session_id: Option<String>,
    /// Checkpoint index of the parent this session was forked from.
    #[serde(default)]
    pub branch_checkpoint_index: Option<usize>,
    pub status: SessionStatus,
    #[serde(rename = "checkpoints_data", alias = "checkpoints", default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_turns: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

impl ResearchSession {
    pub fn is_root(&self) -> bool {
        self.parent_session_id.is_none()
    }

    pub fn checkpoint(&self, index: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(index)
    }

    /// Checkpoints that can serve as branch points.
    pub fn branchable_checkpoints(&self) -> impl Iterator<Item = (usize, &Checkpoint)> {
        self.checkpoints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_responded())
    }

    /// Whether this record was saved from the given live session.
    pub fn tracks(&self, live_session_id: &str) -> bool {
        self.original_session_id == live_session_id || self.id == live_session_id
    }
}

/// Read-only view over a set of research sessions as a parent/child tree.
#[derive(Debug, Default)]
pub struct LineageTree {
    sessions: HashMap<String, ResearchSession>,
    children: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl LineageTree {
    /// Build the tree. Input order is kept for roots and siblings.
    pub fn from_sessions(sessions: Vec<ResearchSession>) -> Self {
        let mut tree = Self::default();
        for session in sessions {
            if tree.sessions.contains_key(&session.id) {
                continue;
            }
            if let Some(parent) = &session.parent_session_id {
                tree.children
                    .entry(parent.clone())
                    .or_default()
                    .push(session.id.clone());
            }
            tree.order.push(session.id.clone());
            tree.sessions.insert(session.id.clone(), session);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResearchSession> {
        self.sessions.get(id)
    }

    /// Sessions with no parent, or whose parent is not part of this set.
    pub fn roots(&self) -> Vec<&ResearchSession> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter(|s| {
                s.parent_session_id
                    .as_ref()
                    .is_none_or(|p| !self.sessions.contains_key(p))
            })
            .collect()
    }

    pub fn children(&self, id: &str) -> Vec<&ResearchSession> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.sessions.get(c)).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first. Stops at the first missing or repeated id.
    pub fn ancestors(&self, id: &str) -> Vec<&ResearchSession> {
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut out = Vec::new();
        let mut current = self.sessions.get(id);
        while let Some(parent_id) = current.and_then(|s| s.parent_session_id.as_deref()) {
            if !seen.insert(parent_id) {
                break;
            }
            match self.sessions.get(parent_id) {
                Some(parent) => {
                    out.push(parent);
                    current = Some(parent);
                }
                None => break,
            }
        }
        out
    }

    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }

    /// Check that the set is a strict tree: no cycles and no dangling parents.
    pub fn validate(&self) -> Result<(), LineageError> {
        for id in &self.order {
            let mut seen = HashSet::new();
            let mut current = id.as_str();
            loop {
                if !seen.insert(current) {
                    return Err(LineageError::Cycle {
                        session_id: id.clone(),
                    });
                }
                let Some(session) = self.sessions.get(current) else {
                    break;
                };
                let Some(parent) = session.parent_session_id.as_deref() else {
                    break;
                };
                if !self.sessions.contains_key(parent) {
                    return Err(LineageError::UnknownParent {
                        session_id: current.to_string(),
                        parent_id: parent.to_string(),
                    });
                }
                current = parent;
            }
        }
        Ok(())
    }

    /// Depth-first walk from the roots: `(depth, session)` pairs for display.
    pub fn walk(&self) -> Vec<(usize, &ResearchSession)> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(usize, &ResearchSession)> =
            self.roots().into_iter().rev().map(|s| (0, s)).collect();
        while let Some((depth, session)) = stack.pop() {
            if !visited.insert(session.id.as_str()) {
                continue;
            }
            out.push((depth, session));
            for child in self.children(&session.id).into_iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}
