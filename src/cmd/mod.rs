//! CLI command implementations.
//!
//! | Module      | Commands handled                                  |
//! |-------------|---------------------------------------------------|
//! | `timeline`  | `Timeline`, `Checkpoints`, `Respond`              |
//! | `sessions`  | `Sessions`, `Branch`                              |
//! | `watch`     | `Watch`                                           |
//! | `config`    | `Config`                                          |

pub mod config;
pub mod sessions;
pub mod timeline;
pub mod watch;

pub use config::cmd_config;
pub use sessions::{cmd_branch, cmd_sessions};
pub use timeline::{cmd_checkpoints, cmd_respond, cmd_timeline};
pub use watch::cmd_watch;

use serde_json::Value;

/// Interpret a response argument: valid JSON is sent as-is, anything else as a string.
pub fn parse_response(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
