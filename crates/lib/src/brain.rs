//! Brain: the process-wide key/value store owned by the host.
//!
//! Several features may share one brain, so callers namespace their keys. Reads and writes are
//! synchronous; the file-backed brain persists the whole map as a JSON object after each write.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Narrow key/value capability injected into features that need persistent state.
pub trait Brain: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn remove(&self, key: &str);
}

/// In-memory brain; contents are lost on restart.
#[derive(Default)]
pub struct MemoryBrain {
    inner: RwLock<HashMap<String, Value>>,
}

impl MemoryBrain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Brain for MemoryBrain {
    fn get(&self, key: &str) -> Option<Value> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        g.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        g.remove(key);
    }
}

/// Brain persisted to a JSON file. Missing or unreadable file => starts empty.
pub struct JsonFileBrain {
    path: PathBuf,
    inner: RwLock<Map<String, Value>>,
}

impl JsonFileBrain {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let inner = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("brain: ignoring unreadable {}: {}", path.display(), e);
                Map::new()
            }),
            Err(_) => Map::new(),
        };
        log::debug!("brain: loaded {} key(s) from {}", inner.len(), path.display());
        Self {
            path,
            inner: RwLock::new(inner),
        }
    }

    fn save(&self, map: &Map<String, Value>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)
    }

    fn persist(&self, map: &Map<String, Value>) {
        if let Err(e) = self.save(map) {
            log::warn!("brain: failed to persist {}: {}", self.path.display(), e);
        }
    }
}

impl Brain for JsonFileBrain {
    fn get(&self, key: &str) -> Option<Value> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        g.insert(key.to_string(), value);
        self.persist(&g);
    }

    fn remove(&self, key: &str) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if g.remove(key).is_some() {
            self.persist(&g);
        }
    }
}

/// Open the host brain: file-backed when a path is configured, in-memory otherwise.
pub fn open_brain(path: Option<&Path>) -> Arc<dyn Brain> {
    match path {
        Some(p) => {
            log::info!("brain: persisting to {}", p.display());
            Arc::new(JsonFileBrain::load(p))
        }
        None => Arc::new(MemoryBrain::new()),
    }
}
