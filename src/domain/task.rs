//! Task record and lifecycle types
//!
//! A `TaskRecord` is the persisted unit of scheduling: one record per task id,
//! mutated only through the store's `update` entry point (which stamps
//! `updated_at`). The live/not-live distinction is deliberately NOT part of this
//! type; a record with `status: running` can be stale after a crash, and the
//! registry of live controllers is the authoritative signal.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduling mode for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Loop back-to-back, with at most a single yield between runs
    Continuous,
    /// Wait a fixed number of seconds between runs
    Interval,
}

impl std::fmt::Display for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Interval => write!(f, "interval"),
        }
    }
}

impl std::str::FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(Self::Continuous),
            "interval" => Ok(Self::Interval),
            other => Err(format!("invalid mode '{other}', use 'continuous' or 'interval'")),
        }
    }
}

/// Persisted task status
///
/// Transitions: `running -> {stopping -> stopped, completed, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Stopping,
    Stopped,
    Completed,
    Error,
}

impl TaskStatus {
    /// Whether this status is terminal (no loop should be running)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("invalid status '{other}'")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A persisted task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier, assigned at creation
    pub id: String,

    /// Operator-stated goal, captured verbatim
    pub goal: String,

    /// Resolved paths to input materials (ordered)
    pub input_materials: Vec<PathBuf>,

    /// Directory the worker writes its artifacts into
    pub output_dir: PathBuf,

    /// Working directory for worker invocations
    pub workspace_dir: PathBuf,

    /// Scheduling mode
    pub mode: TaskMode,

    /// Seconds between runs; positive when `mode` is interval
    pub interval_seconds: u64,

    /// Stop after this many successful runs; 0 means unlimited
    pub max_success_runs: u64,

    /// Persisted lifecycle status
    pub status: TaskStatus,

    /// Number of successful runs so far
    pub run_count: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,

    /// Path to the artifact expected from the most recent run
    pub last_output_path: Option<PathBuf>,

    /// Last failure message, cleared on a successful run
    pub last_error: Option<String>,

    /// Agent model recorded at creation
    pub model: String,
}

impl TaskRecord {
    /// Apply a patch in place. Does not stamp `updated_at`; the store does that
    /// as part of its read-modify-write entry point.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(run_count) = patch.run_count {
            self.run_count = run_count;
        }
        if let Some(last_run_at) = patch.last_run_at {
            self.last_run_at = Some(last_run_at);
        }
        if let Some(path) = &patch.last_output_path {
            self.last_output_path = Some(path.clone());
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }
    }
}

/// Field-level patch for a task record
///
/// `last_error` is doubly optional: `None` leaves the field alone,
/// `Some(None)` clears it, `Some(Some(msg))` records a failure.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub run_count: Option<u64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_output_path: Option<PathBuf>,
    pub last_error: Option<Option<String>>,
}

impl TaskPatch {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn run_count(mut self, run_count: u64) -> Self {
        self.run_count = Some(run_count);
        self
    }

    pub fn last_run_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_run_at = Some(at);
        self
    }

    pub fn last_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.last_output_path = Some(path.into());
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: "task-1".to_string(),
            goal: "write a report".to_string(),
            input_materials: vec![PathBuf::from("/tmp/in")],
            output_dir: PathBuf::from("/tmp/out"),
            workspace_dir: PathBuf::from("/tmp"),
            mode: TaskMode::Continuous,
            interval_seconds: 0,
            max_success_runs: 0,
            status: TaskStatus::Running,
            run_count: 0,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            last_output_path: None,
            last_error: None,
            model: "composer-1".to_string(),
        }
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Stopping.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("continuous".parse::<TaskMode>().unwrap(), TaskMode::Continuous);
        assert_eq!("interval".parse::<TaskMode>().unwrap(), TaskMode::Interval);
        assert!("hourly".parse::<TaskMode>().is_err());
    }

    #[test]
    fn test_patch_apply() {
        let mut record = sample_record();
        let at = Utc::now();
        let patch = TaskPatch::default()
            .status(TaskStatus::Running)
            .run_count(3)
            .last_run_at(at)
            .last_output_path("/tmp/out/RUN_ONCE_OUTPUT.md")
            .clear_error();

        record.last_error = Some("boom".to_string());
        record.apply(&patch);

        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.run_count, 3);
        assert_eq!(record.last_run_at, Some(at));
        assert_eq!(record.last_error, None);
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut record = sample_record();
        record.last_error = Some("boom".to_string());
        record.apply(&TaskPatch::default().run_count(1));
        assert_eq!(record.last_error, Some("boom".to_string()));
        assert_eq!(record.status, TaskStatus::Running);
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"mode\":\"continuous\""));
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, record.status);
    }
}
