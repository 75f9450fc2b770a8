//! Layered configuration for cockpit.
//!
//! Settings are merged from, in increasing priority:
//! 1. `cockpit.toml` (`--config`, else `./.cockpit/cockpit.toml`, else the user config dir)
//! 2. Environment variables (`.env` is loaded first)
//! 3. CLI arguments

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::live::ghost::{DEFAULT_EXIT_MS, DEFAULT_LIFETIME_MS, DEFAULT_MAX_GHOSTS, GhostSettings};

pub const CONFIG_FILE_NAME: &str = "cockpit.toml";
pub const PROJECT_CONFIG_DIR: &str = ".cockpit";

pub const ENV_BASE_URL: &str = "COCKPIT_BASE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "COCKPIT_POLL_INTERVAL_MS";
pub const ENV_LOG_JSON: &str = "COCKPIT_LOG_JSON";

const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Base URL of the orchestration API, including any `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How many research sessions to scan when resolving a session's lineage.
    #[serde(default = "default_research_session_limit")]
    pub research_session_limit: usize,
}

fn default_base_url() -> String {
    "http://localhost:5001/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_research_session_limit() -> usize {
    50
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            research_session_limit: default_research_session_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    2_000
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostsSection {
    #[serde(default = "default_ghost_lifetime")]
    pub lifetime_ms: i64,
    #[serde(default = "default_ghost_exit")]
    pub exit_ms: i64,
    #[serde(default = "default_max_ghosts")]
    pub max_ghosts: usize,
}

fn default_ghost_lifetime() -> i64 {
    DEFAULT_LIFETIME_MS
}

fn default_ghost_exit() -> i64 {
    DEFAULT_EXIT_MS
}

fn default_max_ghosts() -> usize {
    DEFAULT_MAX_GHOSTS
}

impl Default for GhostsSection {
    fn default() -> Self {
        Self {
            lifetime_ms: default_ghost_lifetime(),
            exit_ms: default_ghost_exit(),
            max_ghosts: default_max_ghosts(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolled log files here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<PathBuf>,
}

/// The complete cockpit.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CockpitConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub ghosts: GhostsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// CLI flags that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
}

impl CockpitConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse cockpit.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize cockpit.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Config file to read: an explicit path, else the project file, else the
    /// user-level file. Returns `None` when no candidate exists.
    pub fn locate(explicit: Option<&Path>, project_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let project = project_config_path(project_dir);
        if project.exists() {
            return Some(project);
        }
        user_config_path().filter(|p| p.exists())
    }

    /// Load with every layer applied.
    pub fn resolve(project_dir: &Path, cli: &CliOverrides) -> Result<(Self, Option<PathBuf>)> {
        let _ = dotenvy::dotenv();
        let path = Self::locate(cli.config_path.as_deref(), project_dir);
        let mut config = match &path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(cli);
        Ok((config, path))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.server.base_url = url;
        }
        if let Some(ms) = lookup(ENV_POLL_INTERVAL_MS).and_then(|v| v.trim().parse().ok()) {
            self.polling.interval_ms = ms;
        }
        if let Some(json) = lookup(ENV_LOG_JSON) {
            self.logging.json = matches!(json.trim(), "1" | "true" | "yes");
        }
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(url) = &cli.base_url {
            self.server.base_url = url.clone();
        }
    }

    /// Poll interval, clamped to the supported minimum.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn ghost_settings(&self) -> GhostSettings {
        GhostSettings {
            lifetime_ms: self.ghosts.lifetime_ms,
            exit_ms: self.ghosts.exit_ms,
            max_ghosts: self.ghosts.max_ghosts,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warnings.push(format!(
                "Invalid base_url '{}': must start with http:// or https://",
                self.server.base_url
            ));
        }
        if self.server.request_timeout_secs == 0 {
            warnings.push("request_timeout_secs is 0: every request would time out".to_string());
        }
        if self.polling.interval_ms < MIN_POLL_INTERVAL_MS {
            warnings.push(format!(
                "Poll interval {}ms is below the minimum of {}ms",
                self.polling.interval_ms, MIN_POLL_INTERVAL_MS
            ));
        }
        if self.ghosts.lifetime_ms <= 0 {
            warnings.push(format!(
                "Ghost lifetime must be positive, got {}ms",
                self.ghosts.lifetime_ms
            ));
        }
        if self.ghosts.exit_ms < 0 {
            warnings.push(format!(
                "Ghost exit duration cannot be negative, got {}ms",
                self.ghosts.exit_ms
            ));
        }

        warnings
    }
}

pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cockpit").join(CONFIG_FILE_NAME))
}
