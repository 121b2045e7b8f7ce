//! Per-instance scan checkpoints
//!
//! A checkpoint is the last log timestamp seen for an `(application, instance)`
//! pair. Missing checkpoints are a normal state and mean "scan from the start".
//!
//! Layout of the file store:
//! ```text
//! last_check/
//! ├── orders-api_i-0a1b2c.txt
//! └── orders-api_i-3d4e5f.txt
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, info};

use crate::utils::{MonitorError, MonitorResult};

/// Checkpoint persistence keyed by application and instance
///
/// Callers serialize access per key; implementations need no locking beyond
/// what keeps distinct keys independent.
pub trait CheckpointStore: Send + Sync {
    /// Last stored timestamp, `None` when nothing was stored yet
    fn get(&self, app_name: &str, instance_id: &str) -> MonitorResult<Option<String>>;

    /// Overwrite the stored timestamp; durable once this returns
    fn set(&self, app_name: &str, instance_id: &str, timestamp: &str) -> MonitorResult<()>;
}

/// One text file per key under a checkpoint directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> MonitorResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            error!(error = %e, dir = %dir.display(), "Failed to create checkpoint directory");
            MonitorError::checkpoint(format!("Failed to create checkpoint directory: {}", e))
        })?;

        info!(dir = %dir.display(), "Checkpoint store initialized");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the checkpoint for one key
    pub fn path_for(&self, app_name: &str, instance_id: &str) -> PathBuf {
        let filename = format!(
            "{}_{}.txt",
            sanitize_component(app_name),
            sanitize_component(instance_id)
        );
        self.dir.join(filename)
    }
}

/// Keep key components from escaping the checkpoint directory
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, app_name: &str, instance_id: &str) -> MonitorResult<Option<String>> {
        let path = self.path_for(app_name, instance_id);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!(error = %e, file = %path.display(), "Failed to read checkpoint file");
                return Err(MonitorError::checkpoint(format!(
                    "Failed to read checkpoint {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let timestamp = content.trim();
        if timestamp.is_empty() {
            return Ok(None);
        }
        Ok(Some(timestamp.to_string()))
    }

    fn set(&self, app_name: &str, instance_id: &str, timestamp: &str) -> MonitorResult<()> {
        let path = self.path_for(app_name, instance_id);
        let tmp_path = path.with_extension("txt.tmp");

        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(timestamp.as_bytes())?;
            file.sync_all()
        };

        write_tmp()
            .and_then(|_| fs::rename(&tmp_path, &path))
            .map_err(|e| {
                error!(error = %e, file = %path.display(), "Failed to write checkpoint file");
                MonitorError::checkpoint(format!(
                    "Failed to write checkpoint {}: {}",
                    path.display(),
                    e
                ))
            })?;

        debug!(app = %app_name, instance = %instance_id, timestamp = %timestamp, "Saved checkpoint");
        Ok(())
    }
}

/// Volatile store, used by tests and one-off runs
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: Mutex<HashMap<(String, String), String>>,
    writes: Mutex<usize>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one checkpoint
    pub fn with_entry(app_name: &str, instance_id: &str, timestamp: &str) -> Self {
        let store = Self::new();
        store
            .lock_entries()
            .insert(key(app_name, instance_id), timestamp.to_string());
        store
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn key(app_name: &str, instance_id: &str) -> (String, String) {
    (app_name.to_string(), instance_id.to_string())
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn get(&self, app_name: &str, instance_id: &str) -> MonitorResult<Option<String>> {
        Ok(self.lock_entries().get(&key(app_name, instance_id)).cloned())
    }

    fn set(&self, app_name: &str, instance_id: &str, timestamp: &str) -> MonitorResult<()> {
        self.lock_entries()
            .insert(key(app_name, instance_id), timestamp.to_string());
        *self.writes.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        Ok(())
    }
}
