//! In-process stub of the orchestration backend, served by axum on
//! `127.0.0.1:0` from a dedicated thread so both the CLI binary and async
//! tests can talk to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Default)]
pub struct Recorded {
    pub responses: Vec<(String, Value)>,
    pub branch_requests: Vec<Value>,
}

pub type Shared = Arc<Mutex<Recorded>>;

pub struct StubBackend {
    pub addr: SocketAddr,
    pub recorded: Shared,
}

impl StubBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

pub fn flow_fixture(session_id: &str) -> Value {
    json!({
        "session_id": session_id,
        "all_messages": [
            {"timestamp": 1.0, "phase_name": "research", "role": "assistant", "content": "Gathering sources", "cost": 0.02, "tokens_in": 100, "turn_number": 0},
            {"timestamp": 2.0, "phase_name": "research", "role": "tool", "content": {"result": "3 hits"}, "turn_number": 1},
            {"timestamp": 5.0, "phase_name": "review", "role": "assistant", "content": "Looks good", "cost": 0.01, "tokens_in": 50, "turn_number": 2}
        ],
        "main_flow": [
            {"timestamp": 1.0, "phase_name": "research", "role": "assistant", "content": "Gathering sources", "cost": 0.02, "tokens_in": 100, "turn_number": 0},
            {"timestamp": 2.0, "phase_name": "research", "role": "tool", "content": {"result": "3 hits"}, "turn_number": 1},
            {"timestamp": 5.0, "phase_name": "review", "role": "assistant", "content": "Looks good", "cost": 0.01, "tokens_in": 50, "turn_number": 2}
        ],
        "soundings": [],
        "soundings_by_phase": [
            {
                "phase_name": "evaluate",
                "first_timestamp": 3.0,
                "soundings": [
                    {"index": 0, "messages": [{"timestamp": 3.0, "phase_name": "evaluate", "role": "assistant", "sounding_index": 0, "cost": 0.05}], "is_winner": false},
                    {"index": 1, "messages": [{"timestamp": 3.1, "phase_name": "evaluate", "role": "assistant", "sounding_index": 1, "cost": 0.04}], "is_winner": true}
                ],
                "evaluator": {"timestamp": 3.5, "phase_name": "evaluate", "role": "assistant", "cost": 0.01},
                "winner_index": 1
            }
        ],
        "reforge_steps": [],
        "reforge_by_phase": [],
        "cost_summary": null,
        "total_messages": 3
    })
}

fn research_sessions() -> Value {
    json!([
        {
            "id": "rs-1",
            "original_session_id": "s1",
            "parent_session_id": null,
            "status": "completed",
            "checkpoints_data": [
                {"id": "cp-1", "session_id": "s1", "phase_name": "review", "status": "responded",
                 "summary": "Approve the findings?", "response": {"approve": true}},
                {"id": "cp-2", "session_id": "s1", "phase_name": "review", "status": "pending"}
            ],
            "total_cost": 0.13,
            "total_turns": 3,
            "title": "Market research"
        },
        {
            "id": "rs-2",
            "original_session_id": "s1-branch",
            "parent_session_id": "rs-1",
            "branch_checkpoint_index": 0,
            "status": "active",
            "checkpoints_data": [],
            "total_cost": 0.02,
            "total_turns": 1,
            "title": "Market research (alt)"
        }
    ])
}

async fn message_flow(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "s1" | "s1-branch" => (StatusCode::OK, Json(flow_fixture(&id))).into_response(),
        "fresh" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("No data found for session {}", id)})),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "Unknown session"}))).into_response(),
    }
}

#[derive(Deserialize)]
struct CheckpointQuery {
    session_id: String,
}

async fn checkpoints(Query(q): Query<CheckpointQuery>) -> Json<Value> {
    let list = research_sessions()[0]["checkpoints_data"].clone();
    let filtered: Vec<Value> = list
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|c| c["session_id"] == q.session_id.as_str())
        .collect();
    Json(json!({ "checkpoints": filtered }))
}

async fn respond(
    State(recorded): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorded
        .lock()
        .unwrap()
        .responses
        .push((id.clone(), body["response"].clone()));
    Json(json!({"id": id, "status": "responded"}))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn list_sessions(Query(q): Query<LimitQuery>) -> Json<Value> {
    let all = research_sessions().as_array().cloned().unwrap_or_default();
    let limited: Vec<Value> = all.into_iter().take(q.limit.unwrap_or(50)).collect();
    Json(json!({ "sessions": limited }))
}

async fn get_session(Path(id): Path<String>) -> impl IntoResponse {
    let found = research_sessions()
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .find(|s| s["id"] == id.as_str());
    match found {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
    }
}

async fn create_branch(State(recorded): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    recorded.lock().unwrap().branch_requests.push(body);
    Json(json!({"new_session_id": "s1-branch"}))
}

async fn events() -> impl IntoResponse {
    let body = concat!(
        ": connected\n\n",
        "data: {\"type\":\"cascade_start\",\"session_id\":\"s1\",\"data\":{}}\n\n",
        "data: {\"type\":\"phase_start\",\"session_id\":\"s1\",\"data\":{\"phase_name\":\"review\"}}\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"tool_call\",\"session_id\":\"other\",\"data\":{\"tool_name\":\"x\"}}\n\n",
        "data: {\"type\":\"checkpoint_created\",\"session_id\":\"s1\",\"data\":{\"checkpoint_id\":\"cp-2\"}}\n\n",
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

fn router(recorded: Shared) -> Router {
    Router::new()
        .route("/api/message-flow/{id}", get(message_flow))
        .route("/api/checkpoints", get(checkpoints))
        .route("/api/checkpoints/{id}/respond", post(respond))
        .route("/api/research-sessions", get(list_sessions))
        .route("/api/research-sessions/branch", post(create_branch))
        .route("/api/research-sessions/{id}", get(get_session))
        .route("/api/events/stream", get(events))
        .with_state(recorded)
}

/// Start the stub. Returns `None` when binding a socket is not permitted
/// (sandboxed test environments).
pub fn spawn_stub() -> Option<StubBackend> {
    let recorded: Shared = Arc::new(Mutex::new(Recorded::default()));
    let (tx, rx) = std::sync::mpsc::channel();
    let app = router(recorded.clone());

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            let _ = tx.send(listener.local_addr());
            let _ = axum::serve(listener, app).await;
        });
    });

    match rx.recv() {
        Ok(Ok(addr)) => Some(StubBackend { addr, recorded }),
        Ok(Err(e)) => {
            let msg = format!("{:?}", e);
            if msg.contains("Operation not permitted")
                || msg.contains("Permission denied")
                || msg.contains("os error 1")
            {
                eprintln!("Skipping stub backend test (sandbox): {}", msg);
                return None;
            }
            panic!("Unexpected bind error: {}", msg);
        }
        Err(_) => None,
    }
}
