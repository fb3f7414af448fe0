use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

pub const CONFIG_PATH_ENV: &str = "TRACKER_TABLE_CONFIG";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/table/users";

/// Tunables of one table instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    pub api_url: String,
    /// Rows per page request.
    pub limit: u64,
    /// Fixed row height in pixels.
    pub row_height: f64,
    /// Scroll container height until the host reports one.
    pub viewport_height: f64,
    /// Rows rendered above and below the visible range.
    pub buffer: u64,
    /// Soft cap on cached rows.
    pub cleanup_threshold: usize,
    /// Distance to the loaded edge, in rows, that triggers a prefetch.
    pub preload_threshold: u64,
    pub max_removed_per_cleanup: usize,
    /// Scroll deltas above this many rows count as a jump.
    pub jump_scroll_rows: u64,
    /// Load missing rows behind freshly created placeholders.
    pub placeholder_self_heal: bool,
    pub request_timeout_ms: u64,
    /// Session filter sent with every page request.
    pub session_id: Option<i64>,
    pub timings: TableTimings,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            limit: 50,
            row_height: 45.0,
            viewport_height: 450.0,
            buffer: 10,
            cleanup_threshold: 200,
            preload_threshold: 20,
            max_removed_per_cleanup: 100,
            jump_scroll_rows: 20,
            placeholder_self_heal: true,
            request_timeout_ms: 10_000,
            session_id: None,
            timings: TableTimings::default(),
        }
    }
}

/// Timer intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableTimings {
    pub scroll_render_ms: u64,
    pub jump_check_ms: u64,
    pub follow_up_check_ms: u64,
    pub deferred_render_ms: u64,
    pub placeholder_heal_ms: u64,
    pub load_coalesce_ms: u64,
    pub scroll_throttle_ms: u64,
    pub scroll_release_ms: u64,
    pub scroll_poll_ms: u64,
    pub scroll_poll_attempts: u32,
    pub datetime_throttle_ms: u64,
}

impl Default for TableTimings {
    fn default() -> Self {
        Self {
            scroll_render_ms: 10,
            jump_check_ms: 100,
            follow_up_check_ms: 200,
            deferred_render_ms: 50,
            placeholder_heal_ms: 50,
            load_coalesce_ms: 100,
            scroll_throttle_ms: 200,
            scroll_release_ms: 500,
            scroll_poll_ms: 100,
            scroll_poll_attempts: 20,
            datetime_throttle_ms: 400,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl TableTimings {
    pub fn scroll_render(&self) -> Duration {
        ms(self.scroll_render_ms)
    }
    pub fn jump_check(&self) -> Duration {
        ms(self.jump_check_ms)
    }
    pub fn follow_up_check(&self) -> Duration {
        ms(self.follow_up_check_ms)
    }
    pub fn deferred_render(&self) -> Duration {
        ms(self.deferred_render_ms)
    }
    pub fn placeholder_heal(&self) -> Duration {
        ms(self.placeholder_heal_ms)
    }
    pub fn load_coalesce(&self) -> Duration {
        ms(self.load_coalesce_ms)
    }
    pub fn scroll_throttle(&self) -> Duration {
        ms(self.scroll_throttle_ms)
    }
    pub fn scroll_release(&self) -> Duration {
        ms(self.scroll_release_ms)
    }
    pub fn scroll_poll(&self) -> Duration {
        ms(self.scroll_poll_ms)
    }
    pub fn datetime_throttle(&self) -> Duration {
        ms(self.datetime_throttle_ms)
    }
}

impl TableOptions {
    pub fn request_timeout(&self) -> Duration {
        ms(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(ConfigError::Invalid("limit must be at least 1".into()));
        }
        if !(self.row_height.is_finite() && self.row_height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "row_height must be positive, got {}",
                self.row_height
            )));
        }
        if !(self.viewport_height.is_finite() && self.viewport_height >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "viewport_height must not be negative, got {}",
                self.viewport_height
            )));
        }
        if self.cleanup_threshold == 0 {
            return Err(ConfigError::Invalid(
                "cleanup_threshold must be at least 1".into(),
            ));
        }
        if self.max_removed_per_cleanup == 0 {
            return Err(ConfigError::Invalid(
                "max_removed_per_cleanup must be at least 1".into(),
            ));
        }
        if self.timings.scroll_poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "timings.scroll_poll_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let options: TableOptions = serde_json::from_str(raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Reads the file named by `TRACKER_TABLE_CONFIG`, or returns defaults when
    /// the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options = TableOptions::from_json_str(
            r#"{"limit": 100, "timings": {"datetime_throttle_ms": 250}}"#,
        )
        .expect("config should parse");
        assert_eq!(options.limit, 100);
        assert_eq!(options.row_height, 45.0);
        assert_eq!(options.cleanup_threshold, 200);
        assert_eq!(options.timings.datetime_throttle(), Duration::from_millis(250));
        assert_eq!(options.timings.scroll_throttle_ms, 200);
    }

    #[test]
    fn rejects_zero_limit_and_bad_row_height() {
        assert!(matches!(
            TableOptions::from_json_str(r#"{"limit": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TableOptions::from_json_str(r#"{"row_height": -1.0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TableOptions::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("table.json");
        let err = TableOptions::load_from(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        std::fs::write(&missing, r#"{"buffer": 4}"#).expect("write");
        let options = TableOptions::load_from(&missing).expect("config should load");
        assert_eq!(options.buffer, 4);
    }
}
