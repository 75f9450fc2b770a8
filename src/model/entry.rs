use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Phase name used for entries that were logged outside of any phase.
pub const UNKNOWN_PHASE: &str = "_unknown_";

/// Seconds since the Unix epoch.
///
/// The backend is not consistent about timestamps: some rows carry a float,
/// some an RFC 3339 string, some a naive `YYYY-MM-DD HH:MM:SS` string. All of
/// them normalize to seconds here. Missing or unparseable timestamps are `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Total order over timestamps (NaN sorts last).
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }

    /// Parse a textual timestamp.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(secs) = raw.parse::<f64>() {
            return Some(Self(secs));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::from_millis(dt.timestamp_millis()));
        }
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Self::from_millis(naive.and_utc().timestamp_millis()));
            }
        }
        None
    }

    fn from_millis(millis: i64) -> Self {
        Self(millis as f64 / 1000.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Timestamp(secs)),
            Raw::Text(text) => Ok(Timestamp::parse(&text).unwrap_or_else(|| {
                warn!(timestamp = %text, "Unrecognized timestamp, sorting as 0");
                Timestamp::default()
            })),
        }
    }
}

/// Deserialize `null` as the type's default.
///
/// The backend emits explicit nulls for cost and token columns it has not
/// filled yet, which `#[serde(default)]` alone does not cover.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of a session's orchestration log.
///
/// Entries are immutable once logged. `sounding_index` and `reforge_step`
/// mark entries that belong to a soundings or reforge block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub phase_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_type: String,
    #[serde(default)]
    pub turn_number: Option<u32>,
    #[serde(default)]
    pub sounding_index: Option<u32>,
    #[serde(default)]
    pub reforge_step: Option<u32>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_in: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_out: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub is_winner: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_internal: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
}

impl Entry {
    /// Phase this entry is grouped under; entries without a phase use [`UNKNOWN_PHASE`].
    pub fn phase_key(&self) -> &str {
        match self.phase_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_PHASE,
        }
    }

    /// Whether this entry was produced by a sounding attempt.
    pub fn in_sounding(&self) -> bool {
        self.sounding_index.is_some()
    }

    /// Whether this entry was produced by a reforge step.
    pub fn in_reforge(&self) -> bool {
        self.reforge_step.is_some()
    }

    pub fn has_cost(&self) -> bool {
        self.cost > 0.0
    }

    /// Plain-text view of the content for previews.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            Value::Object(map) => map
                .get("content")
                .or_else(|| map.get("text"))
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .unwrap_or_else(|| self.content.to_string()),
            other => other.to_string(),
        }
    }
}
