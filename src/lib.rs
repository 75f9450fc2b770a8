//! Trace reconstruction and session-lineage engine for LLM orchestration
//! dashboards.
//!
//! - [`model`]: the event log and its side-channel blocks
//! - [`timeline`]: grouping the log into renderable phases, with cost rollups
//! - [`lineage`]: checkpoints, research sessions, and branching
//! - [`live`]: the event-driven reducer and ghost activity
//! - [`session`]: the controller reconciling polls, the stream, and user actions

pub mod client;
pub mod config;
pub mod errors;
pub mod lineage;
pub mod live;
pub mod logging;
pub mod model;
pub mod session;
pub mod timeline;
pub mod ui;
