// ----------------------------
// Client-side persistence
//  - browser hosts: localStorage behind the same trait
//  - native: JSON file in the app data dir
// ----------------------------

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const COLUMN_VISIBILITY_KEY: &str = "tableColumnVisibility";
pub const CONTROLS_OPEN_KEY: &str = "tableControlsOpen";
pub const CURRENT_TAB_KEY: &str = "tableCurrentTab";

/// Flat string key/value storage, the shape of browser `localStorage`.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str);
    fn remove(&self, key: &str);

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }
}

/// All keys live in one pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_local_dir>/tracker/storage.json`, falling back to the working dir.
    pub fn default_location() -> Self {
        let mut base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
        base.push("tracker");
        base.push("storage.json");
        Self::new(base)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Result<HashMap<String, String>, io::Error> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };

        let map = serde_json::from_slice::<HashMap<String, String>>(&bytes).unwrap_or_default();
        Ok(map)
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<(), io::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(map).unwrap_or_else(|_| b"{}".to_vec());
        std::fs::write(&self.path, bytes)
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), io::Error> {
        let mut map = self.load_map()?;
        f(&mut map);
        self.save_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.load_map() {
            Ok(map) => map.get(key).cloned(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read storage");
                None
            }
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        if let Err(e) = self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        }) {
            tracing::warn!(path = %self.path.display(), key, error = %e, "failed to write storage");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.update(|map| {
            map.remove(key);
        }) {
            tracing::warn!(path = %self.path.display(), key, error = %e, "failed to write storage");
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_string(&self, key: &str, value: &str) {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
