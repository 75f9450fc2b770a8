//! Live session state driven by the event stream.
//!
//! - [`event`]: stream message model
//! - [`ghost`]: transient in-flight activity with timed expiry
//! - [`reducer`]: orchestration status machine and round accumulation

pub mod event;
pub mod ghost;
pub mod reducer;

pub use event::{EventKind, LiveEvent};
pub use ghost::{GhostBuffer, GhostKind, GhostMessage, GhostSettings};
pub use reducer::{Applied, OrchestrationState, OrchestrationStatus, Reducer, ToolCallInfo};
