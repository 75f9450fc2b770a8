//! In-memory [`CockpitApi`] for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::{CockpitApi, EventStream};
use crate::errors::ClientError;
use crate::lineage::branch::BranchRequest;
use crate::lineage::{Checkpoint, CheckpointStatus, ResearchSession};
use crate::live::LiveEvent;
use crate::model::MessageFlow;

#[derive(Default)]
pub(crate) struct MockApi {
    flows: Mutex<HashMap<String, MessageFlow>>,
    waiting: Mutex<HashSet<String>>,
    failing: AtomicBool,
    checkpoints: Mutex<Vec<Checkpoint>>,
    research_sessions: Mutex<Vec<ResearchSession>>,
    branch_result: Mutex<Option<String>>,
    events: Mutex<Vec<LiveEvent>>,
    stream_failures: AtomicUsize,
    stream_opens: AtomicUsize,
    calls: AtomicUsize,
    flow_fetches: AtomicUsize,
    branch_requests: Mutex<Vec<BranchRequest>>,
    responses: Mutex<Vec<(String, Value)>>,
}

fn unavailable(endpoint: &str) -> ClientError {
    ClientError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

impl MockApi {
    pub fn with_flow(self, flow: MessageFlow) -> Self {
        self.set_flow(flow);
        self
    }

    /// `message_flow` for this session reports `WaitingForData`.
    pub fn with_waiting(self, session_id: &str) -> Self {
        self.waiting.lock().unwrap().insert(session_id.to_string());
        self
    }

    /// Every REST call fails with a 503.
    pub fn with_failure(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn with_checkpoints(self, checkpoints: Vec<Checkpoint>) -> Self {
        *self.checkpoints.lock().unwrap() = checkpoints;
        self
    }

    pub fn with_research_sessions(self, sessions: Vec<ResearchSession>) -> Self {
        *self.research_sessions.lock().unwrap() = sessions;
        self
    }

    pub fn with_branch_result(self, new_session_id: &str) -> Self {
        *self.branch_result.lock().unwrap() = Some(new_session_id.to_string());
        self
    }

    /// Events served by every stream opened; the stream then stays open.
    pub fn with_events(self, events: Vec<LiveEvent>) -> Self {
        *self.events.lock().unwrap() = events;
        self
    }

    /// The first `n` attempts to open the stream fail.
    pub fn with_stream_failures(self, n: usize) -> Self {
        self.stream_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_flow(&self, flow: MessageFlow) {
        self.waiting.lock().unwrap().remove(&flow.session_id);
        self.flows
            .lock()
            .unwrap()
            .insert(flow.session_id.clone(), flow);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of REST calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn flow_fetches(&self) -> usize {
        self.flow_fetches.load(Ordering::SeqCst)
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    pub fn branch_requests(&self) -> Vec<BranchRequest> {
        self.branch_requests.lock().unwrap().clone()
    }

    pub fn responses(&self) -> Vec<(String, Value)> {
        self.responses.lock().unwrap().clone()
    }

    fn enter(&self, endpoint: &str) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable(endpoint));
        }
        Ok(())
    }
}

fn not_found(endpoint: &str) -> ClientError {
    ClientError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
        body: "not found".to_string(),
    }
}

#[async_trait]
impl CockpitApi for MockApi {
    async fn message_flow(&self, session_id: &str) -> Result<MessageFlow, ClientError> {
        self.flow_fetches.fetch_add(1, Ordering::SeqCst);
        self.enter("message-flow")?;
        if self.waiting.lock().unwrap().contains(session_id) {
            return Err(ClientError::WaitingForData {
                session_id: session_id.to_string(),
            });
        }
        self.flows
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found("message-flow"))
    }

    async fn checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, ClientError> {
        self.enter("checkpoints")?;
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn respond_to_checkpoint(
        &self,
        checkpoint_id: &str,
        response: &Value,
    ) -> Result<(), ClientError> {
        self.enter("checkpoints/respond")?;
        let mut checkpoints = self.checkpoints.lock().unwrap();
        if let Some(cp) = checkpoints.iter_mut().find(|c| c.id == checkpoint_id) {
            cp.status = CheckpointStatus::Responded;
            cp.response = Some(response.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .push((checkpoint_id.to_string(), response.clone()));
        Ok(())
    }

    async fn research_sessions(&self, limit: usize) -> Result<Vec<ResearchSession>, ClientError> {
        self.enter("research-sessions")?;
        Ok(self
            .research_sessions
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn research_session(&self, id: &str) -> Result<ResearchSession, ClientError> {
        self.enter("research-sessions/id")?;
        self.research_sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("research-sessions/id"))
    }

    async fn create_branch(&self, request: &BranchRequest) -> Result<String, ClientError> {
        self.enter("research-sessions/branch")?;
        self.branch_requests.lock().unwrap().push(request.clone());
        self.branch_result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("research-sessions/branch"))
    }

    async fn open_event_stream(&self) -> Result<EventStream, ClientError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let remaining = self.stream_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.stream_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable("events/stream"));
        }
        let events = self.events.lock().unwrap().clone();
        Ok(Box::pin(
            futures::stream::iter(events).chain(futures::stream::pending()),
        ))
    }
}
