//! Backend access for the orchestration API.
//!
//! [`CockpitApi`] is the seam the controller and the branch operation talk
//! to; [`HttpClient`] implements it over `reqwest`. All endpoints are JSON
//! over HTTP relative to the configured base URL:
//!
//! - `GET  /message-flow/{session_id}`
//! - `GET  /checkpoints?session_id=..&include_all=true`
//! - `POST /checkpoints/{id}/respond`
//! - `GET  /research-sessions?limit=N`, `GET /research-sessions/{id}`
//! - `POST /research-sessions/branch`
//! - `GET  /events/stream` (server-sent events)

pub mod sse;
pub mod subscription;
#[cfg(test)]
pub(crate) mod testing;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::CockpitConfig;
use crate::errors::ClientError;
use crate::lineage::branch::BranchRequest;
use crate::lineage::{Checkpoint, ResearchSession};
use crate::live::LiveEvent;
use crate::model::MessageFlow;

pub use subscription::EventSubscription;

/// Decoded live events, malformed messages already dropped.
pub type EventStream = Pin<Box<dyn Stream<Item = LiveEvent> + Send>>;

/// Body marker the backend uses for a session that has not logged anything yet.
const NO_DATA_MARKER: &str = "No data found";

#[async_trait]
pub trait CockpitApi: Send + Sync {
    /// The authoritative snapshot of one session.
    async fn message_flow(&self, session_id: &str) -> Result<MessageFlow, ClientError>;

    /// Every checkpoint of a session, responded ones included.
    async fn checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, ClientError>;

    async fn respond_to_checkpoint(
        &self,
        checkpoint_id: &str,
        response: &Value,
    ) -> Result<(), ClientError>;

    async fn research_sessions(&self, limit: usize) -> Result<Vec<ResearchSession>, ClientError>;

    async fn research_session(&self, id: &str) -> Result<ResearchSession, ClientError>;

    /// Ask the backend to fork a session. Returns the new live session id.
    async fn create_branch(&self, request: &BranchRequest) -> Result<String, ClientError>;

    /// Open the global event feed. The stream ends when the connection drops.
    async fn open_event_stream(&self) -> Result<EventStream, ClientError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CheckpointsResponse {
    Wrapped { checkpoints: Vec<Checkpoint> },
    Bare(Vec<Checkpoint>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionsResponse {
    Wrapped { sessions: Vec<ResearchSession> },
    Bare(Vec<ResearchSession>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionResponse {
    Wrapped { session: ResearchSession },
    Bare(ResearchSession),
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    new_session_id: String,
}

/// `reqwest` implementation of [`CockpitApi`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &CockpitConfig) -> Result<Self, ClientError> {
        Self::new(&config.server.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a REST request and return the body of a successful response.
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<String, ClientError> {
        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(endpoint, status = status.as_u16(), "Backend returned error status");
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let body = self.send(endpoint, request).await?;
        decode(endpoint, &body)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl CockpitApi for HttpClient {
    async fn message_flow(&self, session_id: &str) -> Result<MessageFlow, ClientError> {
        let endpoint = format!("message-flow/{}", session_id);
        let request = self.http.get(self.url(&endpoint));
        match self.get_json(&endpoint, request).await {
            Err(ClientError::Status { status, body, .. })
                if status == StatusCode::NOT_FOUND.as_u16() && body.contains(NO_DATA_MARKER) =>
            {
                Err(ClientError::WaitingForData {
                    session_id: session_id.to_string(),
                })
            }
            other => other,
        }
    }

    async fn checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, ClientError> {
        let request = self
            .http
            .get(self.url("checkpoints"))
            .query(&[("session_id", session_id), ("include_all", "true")]);
        let response: CheckpointsResponse = self.get_json("checkpoints", request).await?;
        Ok(match response {
            CheckpointsResponse::Wrapped { checkpoints } | CheckpointsResponse::Bare(checkpoints) => {
                checkpoints
            }
        })
    }

    async fn respond_to_checkpoint(
        &self,
        checkpoint_id: &str,
        response: &Value,
    ) -> Result<(), ClientError> {
        let endpoint = format!("checkpoints/{}/respond", checkpoint_id);
        let request = self
            .http
            .post(self.url(&endpoint))
            .json(&json!({ "response": response }));
        self.send(&endpoint, request).await?;
        Ok(())
    }

    async fn research_sessions(&self, limit: usize) -> Result<Vec<ResearchSession>, ClientError> {
        let request = self
            .http
            .get(self.url("research-sessions"))
            .query(&[("limit", limit)]);
        let response: SessionsResponse = self.get_json("research-sessions", request).await?;
        Ok(match response {
            SessionsResponse::Wrapped { sessions } | SessionsResponse::Bare(sessions) => sessions,
        })
    }

    async fn research_session(&self, id: &str) -> Result<ResearchSession, ClientError> {
        let endpoint = format!("research-sessions/{}", id);
        let request = self.http.get(self.url(&endpoint));
        let response: SessionResponse = self.get_json(&endpoint, request).await?;
        Ok(match response {
            SessionResponse::Wrapped { session } | SessionResponse::Bare(session) => session,
        })
    }

    async fn create_branch(&self, request: &BranchRequest) -> Result<String, ClientError> {
        let endpoint = "research-sessions/branch";
        let builder = self.http.post(self.url(endpoint)).json(request);
        let response: BranchResponse = self.get_json(endpoint, builder).await?;
        Ok(response.new_session_id)
    }

    async fn open_event_stream(&self) -> Result<EventStream, ClientError> {
        let endpoint = "events/stream";
        // No request timeout: the stream is long-lived.
        let response = self
            .http
            .get(self.url(endpoint))
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let events = sse::sse_messages(Box::pin(response.bytes_stream())).filter_map(|raw| async move {
            match LiveEvent::parse(&raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed event");
                    None
                }
            }
        });
        Ok(Box::pin(events))
    }
}
