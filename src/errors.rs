//! Typed error hierarchy for the cockpit core.
//!
//! Four enums cover the subsystems:
//! - `ClientError`: backend HTTP and stream failures
//! - `BranchError`: branch precondition and submission failures
//! - `EventError`: stream messages that cannot be decoded
//! - `LineageError`: research-session trees that are not strict trees
//!
//! None of these is fatal to the process. The controller keeps its last good
//! view and heals on the next successful poll.

use thiserror::Error;

/// Errors from talking to the orchestration backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 404 with "No data found" for a session that has not logged anything yet.
    #[error("Waiting for data for session {session_id}")]
    WaitingForData { session_id: String },

    #[error("Backend returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// True when the error is the `waiting_for_data` condition rather than a failure.
    pub fn is_waiting_for_data(&self) -> bool {
        matches!(self, Self::WaitingForData { .. })
    }

    /// True when the next poll tick is expected to fix things on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::WaitingForData { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Errors from the branch operation.
///
/// Precondition failures are raised before any network call is made.
#[derive(Debug, Error)]
pub enum BranchError {
    #[error("Cannot branch from checkpoint {index}: {reason}")]
    InvalidBranchPoint { index: usize, reason: String },

    #[error("Session {session_id} has not been saved yet; retry once it auto-saves")]
    SessionNotPersisted { session_id: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Errors from decoding live stream messages.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event '{preview}': {source}")]
    MalformedEvent {
        preview: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from validating a research-session lineage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineageError {
    #[error("Research session {session_id} is its own ancestor")]
    Cycle { session_id: String },

    #[error("Research session {session_id} references unknown parent {parent_id}")]
    UnknownParent {
        session_id: String,
        parent_id: String,
    },
}
