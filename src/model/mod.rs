//! Canonical representation of one orchestration session's log.
//!
//! - [`Entry`]: one immutable row of the log
//! - [`SoundingsBlock`] / [`ReforgeBlock`]: side-channel collections keyed by phase
//! - [`MessageFlow`]: the authoritative snapshot the backend serves

pub mod blocks;
pub mod entry;
pub mod snapshot;

pub use blocks::{ReforgeBlock, ReforgeStep, Sounding, SoundingsBlock};
pub use entry::{Entry, Timestamp, UNKNOWN_PHASE};
pub use snapshot::MessageFlow;
