//! Forking a new session from a past checkpoint.
//!
//! The client never simulates the replay. It validates the branch point,
//! sends one unambiguous request, and hands back the id of the session the
//! backend created. Preconditions are checked before any network call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::ResearchSession;
use crate::client::CockpitApi;
use crate::errors::BranchError;

/// Body of `POST /research-sessions/branch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRequest {
    pub parent_research_session_id: String,
    pub branch_checkpoint_index: usize,
    pub new_response: Value,
}

/// The session the backend created for a branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSessionDescriptor {
    pub new_session_id: String,
    pub parent_research_session_id: String,
    pub branch_checkpoint_index: usize,
}

/// Validate a branch point and build the request for it.
///
/// Fails with `InvalidBranchPoint` when the index is out of range or the
/// checkpoint there has not been responded to. Because a branch can only
/// start from a responded checkpoint of an existing session, the new session
/// is always a fresh leaf and the lineage stays a tree.
pub fn prepare_branch(
    lineage: &ResearchSession,
    checkpoint_index: usize,
    new_response: Value,
) -> Result<BranchRequest, BranchError> {
    let checkpoint =
        lineage
            .checkpoint(checkpoint_index)
            .ok_or_else(|| BranchError::InvalidBranchPoint {
                index: checkpoint_index,
                reason: format!(
                    "session {} has only {} checkpoints",
                    lineage.id,
                    lineage.checkpoints.len()
                ),
            })?;

    if !checkpoint.is_responded() {
        return Err(BranchError::InvalidBranchPoint {
            index: checkpoint_index,
            reason: format!(
                "checkpoint {} is {}, only responded checkpoints can be branched from",
                checkpoint.id,
                checkpoint.status.as_str()
            ),
        });
    }

    Ok(BranchRequest {
        parent_research_session_id: lineage.id.clone(),
        branch_checkpoint_index: checkpoint_index,
        new_response,
    })
}

/// Validate and submit a branch.
pub async fn branch<A>(
    api: &A,
    lineage: &ResearchSession,
    checkpoint_index: usize,
    new_response: Value,
) -> Result<NewSessionDescriptor, BranchError>
where
    A: CockpitApi + ?Sized,
{
    let request = prepare_branch(lineage, checkpoint_index, new_response)?;
    let new_session_id = api.create_branch(&request).await?;
    info!(
        parent = %request.parent_research_session_id,
        checkpoint = request.branch_checkpoint_index,
        new_session = %new_session_id,
        "Created branch"
    );
    Ok(NewSessionDescriptor {
        new_session_id,
        parent_research_session_id: request.parent_research_session_id,
        branch_checkpoint_index: request.branch_checkpoint_index,
    })
}

/// Find the persisted record for a live session.
///
/// A live session that has not been auto-saved yet has no record and cannot
/// be branched from; the caller should retry after the next save.
pub async fn resolve_lineage<A>(
    api: &A,
    live_session_id: &str,
    limit: usize,
) -> Result<ResearchSession, BranchError>
where
    A: CockpitApi + ?Sized,
{
    let sessions = api.research_sessions(limit).await?;
    let candidate = sessions.into_iter().find(|s| s.tracks(live_session_id));
    let Some(summary) = candidate else {
        debug!(session = %live_session_id, "No research session saved yet");
        return Err(BranchError::SessionNotPersisted {
            session_id: live_session_id.to_string(),
        });
    };
    // The list endpoint may omit checkpoints; fetch the full record.
    Ok(api.research_session(&summary.id).await?)
}
