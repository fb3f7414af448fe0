use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracker_shared::{TelemetryRow, datetime_unix_to_millis};

use crate::persist::{COLUMN_VISIBILITY_KEY, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKey {
    Id,
    ModuleId,
    ModuleName,
    DatetimeUnix,
    Lat,
    Lon,
    Alt,
    Rssi,
    Snr,
    Source,
    Jumps,
}

impl ColumnKey {
    pub const ALL: [ColumnKey; 11] = [
        ColumnKey::Id,
        ColumnKey::ModuleId,
        ColumnKey::ModuleName,
        ColumnKey::DatetimeUnix,
        ColumnKey::Lat,
        ColumnKey::Lon,
        ColumnKey::Alt,
        ColumnKey::Rssi,
        ColumnKey::Snr,
        ColumnKey::Source,
        ColumnKey::Jumps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKey::Id => "id",
            ColumnKey::ModuleId => "module_id",
            ColumnKey::ModuleName => "module_name",
            ColumnKey::DatetimeUnix => "datetime_unix",
            ColumnKey::Lat => "lat",
            ColumnKey::Lon => "lon",
            ColumnKey::Alt => "alt",
            ColumnKey::Rssi => "rssi",
            ColumnKey::Snr => "snr",
            ColumnKey::Source => "source",
            ColumnKey::Jumps => "jumps",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }

    pub fn title(&self) -> &'static str {
        match self {
            ColumnKey::Id => "ID",
            ColumnKey::ModuleId => "Module ID",
            ColumnKey::ModuleName => "Name",
            ColumnKey::DatetimeUnix => "Time",
            ColumnKey::Lat => "Latitude",
            ColumnKey::Lon => "Longitude",
            ColumnKey::Alt => "Altitude",
            ColumnKey::Rssi => "RSSI",
            ColumnKey::Snr => "SNR",
            ColumnKey::Source => "Source",
            ColumnKey::Jumps => "Jumps",
        }
    }

    /// Fixed column width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            ColumnKey::Id | ColumnKey::Lat | ColumnKey::Lon | ColumnKey::Alt => 80,
            ColumnKey::ModuleId | ColumnKey::ModuleName => 120,
            ColumnKey::DatetimeUnix => 150,
            ColumnKey::Rssi | ColumnKey::Snr | ColumnKey::Source | ColumnKey::Jumps => 40,
        }
    }

    pub fn visible_by_default(&self) -> bool {
        !matches!(
            self,
            ColumnKey::Id | ColumnKey::ModuleName | ColumnKey::Lat | ColumnKey::Lon
        )
    }
}

/// Which columns are shown. Persisted as a flat `{"key": bool}` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnVisibility {
    visible: BTreeMap<ColumnKey, bool>,
}

impl Default for ColumnVisibility {
    fn default() -> Self {
        Self {
            visible: ColumnKey::ALL
                .into_iter()
                .map(|key| (key, key.visible_by_default()))
                .collect(),
        }
    }
}

impl ColumnVisibility {
    /// Saved entries override the defaults; unknown keys and unreadable state
    /// are ignored.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut visibility = Self::default();
        let Some(raw) = store.get_string(COLUMN_VISIBILITY_KEY) else {
            return visibility;
        };
        match serde_json::from_str::<HashMap<String, bool>>(&raw) {
            Ok(saved) => {
                for (key, shown) in saved {
                    if let Some(column) = ColumnKey::from_key(&key) {
                        visibility.visible.insert(column, shown);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring saved column state"),
        }
        visibility
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        let map: BTreeMap<&str, bool> = self
            .visible
            .iter()
            .map(|(key, shown)| (key.as_str(), *shown))
            .collect();
        match serde_json::to_string(&map) {
            Ok(raw) => store.set_string(COLUMN_VISIBILITY_KEY, &raw),
            Err(e) => tracing::warn!(error = %e, "failed to encode column state"),
        }
    }

    pub fn is_visible(&self, key: ColumnKey) -> bool {
        self.visible.get(&key).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, key: ColumnKey, shown: bool, store: &dyn KeyValueStore) {
        self.visible.insert(key, shown);
        self.save(store);
    }

    pub fn reset(&mut self, store: &dyn KeyValueStore) {
        *self = Self::default();
        self.save(store);
    }

    pub fn visible_columns(&self) -> Vec<ColumnKey> {
        ColumnKey::ALL
            .into_iter()
            .filter(|key| self.is_visible(*key))
            .collect()
    }

    pub fn total_width(&self) -> u32 {
        self.visible_columns().iter().map(ColumnKey::width).sum()
    }
}

fn opt<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Formats a timestamp (seconds or milliseconds) in `tz`.
pub fn format_datetime_unix<Tz>(datetime_unix: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    DateTime::from_timestamp_millis(datetime_unix_to_millis(datetime_unix))
        .map(|dt| dt.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| datetime_unix.to_string())
}

pub fn format_cell(row: &TelemetryRow, key: ColumnKey) -> String {
    match key {
        ColumnKey::Id => row.id.to_string(),
        ColumnKey::ModuleId => row.module_id.clone(),
        ColumnKey::ModuleName => row.module_name.clone().unwrap_or_default(),
        ColumnKey::DatetimeUnix => row
            .datetime_unix
            .map(|dt| format_datetime_unix(dt, &Local))
            .unwrap_or_default(),
        ColumnKey::Lat => opt(row.lat),
        ColumnKey::Lon => opt(row.lon),
        ColumnKey::Alt => opt(row.alt),
        ColumnKey::Rssi => opt(row.rssi),
        ColumnKey::Snr => opt(row.snr),
        ColumnKey::Source => opt(row.source),
        ColumnKey::Jumps => opt(row.jumps),
    }
}
