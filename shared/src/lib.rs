use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Timestamps below this magnitude are treated as seconds, anything larger as
/// milliseconds. The server does not canonicalize units, so every consumer
/// goes through [`datetime_unix_to_millis`].
pub const SECONDS_CUTOFF: i64 = 100_000_000_000;

pub fn datetime_unix_to_millis(datetime_unix: i64) -> i64 {
    if datetime_unix < SECONDS_CUTOFF {
        datetime_unix.saturating_mul(1000)
    } else {
        datetime_unix
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry record as served by the data service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub id: u64,
    #[serde(default, deserialize_with = "module_id_from_any")]
    pub module_id: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub datetime_unix: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub rssi: Option<i64>,
    #[serde(default)]
    pub snr: Option<i64>,
    #[serde(default)]
    pub source: Option<i64>,
    #[serde(default)]
    pub jumps: Option<i64>,
}

// The service formats module ids as hex text, older dumps carry plain integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawModuleId {
    Text(String),
    Number(i64),
}

fn module_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawModuleId>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawModuleId::Text(s)) => s,
        Some(RawModuleId::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

/// Response of `GET {api}?offset&limit&direction`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub data: Vec<TelemetryRow>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub total_visible_count: Option<u64>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Response of `GET {api}/datetime`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatetimeLookupResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub target_id: Option<u64>,
    #[serde(default)]
    pub data: Vec<TelemetryRow>,
}

/// Response of `GET {api}/search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub target_id: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Module entry of the bulk list delivered when a session is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionModule {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}
