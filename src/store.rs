//! Durable task store
//!
//! One JSON file holds every task record. Every `create`/`update` rewrites the
//! file synchronously before returning; the in-memory cache is always the last
//! successfully written state. A corrupt or unreadable store file degrades to
//! an empty task list at open time instead of failing startup — prior history
//! is lost but the process stays usable, which is the right trade for a
//! single-operator tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{TaskPatch, TaskRecord};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task already exists: {0}")]
    DuplicateId(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDb {
    tasks: Vec<TaskRecord>,
}

struct StoreInner {
    path: PathBuf,
    db: TaskDb,
}

/// Durable mapping of task id to task record
///
/// All mutation funnels through `create`/`update`, serialized by one mutex.
/// Each task is owned by exactly one loop, so last-writer-wins at the patch
/// level is sufficient; no cross-record transactions exist.
pub struct TaskStore {
    inner: Mutex<StoreInner>,
}

impl TaskStore {
    /// Open the store at `path`, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let db = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<TaskDb>(&raw) {
                Ok(db) => db,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Store file unparseable, starting empty");
                    TaskDb::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TaskDb::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Store file unreadable, starting empty");
                TaskDb::default()
            }
        };

        debug!(path = %path.display(), tasks = db.tasks.len(), "Opened task store");
        Ok(Self {
            inner: Mutex::new(StoreInner { path, db }),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }

    /// Append a new record, persisting before returning.
    pub fn create(&self, record: TaskRecord) -> Result<TaskRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.db.tasks.iter().any(|t| t.id == record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        inner.db.tasks.push(record.clone());
        persist(&mut inner)?;
        Ok(record)
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        let inner = self.inner.lock().unwrap();
        inner.db.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Snapshot copy of all records.
    pub fn list(&self) -> Vec<TaskRecord> {
        let inner = self.inner.lock().unwrap();
        inner.db.tasks.clone()
    }

    /// Merge `patch` into the record for `id`, stamp `updated_at`, persist, and
    /// return the updated record. Returns `Ok(None)` when the id no longer
    /// exists — callers must treat that as "task deleted concurrently".
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<TaskRecord>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(index) = inner.db.tasks.iter().position(|t| t.id == id) else {
            return Ok(None);
        };
        {
            let record = &mut inner.db.tasks[index];
            record.apply(&patch);
            record.updated_at = Utc::now();
        }
        persist(&mut inner)?;
        Ok(Some(inner.db.tasks[index].clone()))
    }
}

fn persist(inner: &mut StoreInner) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(&inner.db)?;
    fs::write(&inner.path, raw)?;
    Ok(())
}
