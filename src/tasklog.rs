//! Per-task append-only log streams
//!
//! One physical log file per task id, tail-readable. The scheduler runs
//! detached from any caller, so these streams are the operator's only window
//! into a task's run history. Appends are best-effort: a failed write must not
//! take down a task loop.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

/// Log level for a task log line
#[derive(Debug, Clone, Copy)]
enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }
}

/// Writer/reader for per-task log streams
pub struct TaskLogger {
    dir: PathBuf,
}

impl TaskLogger {
    /// Create a logger writing under `dir`, creating it as needed.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the log file for a task id
    pub fn log_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.log"))
    }

    pub fn info(&self, task_id: &str, message: &str, extra: Option<&Value>) {
        self.append(task_id, Level::Info, message, extra);
    }

    pub fn warn(&self, task_id: &str, message: &str, extra: Option<&Value>) {
        self.append(task_id, Level::Warn, message, extra);
    }

    pub fn error(&self, task_id: &str, message: &str, extra: Option<&Value>) {
        self.append(task_id, Level::Error, message, extra);
    }

    pub fn debug(&self, task_id: &str, message: &str, extra: Option<&Value>) {
        self.append(task_id, Level::Debug, message, extra);
    }

    fn append(&self, task_id: &str, level: Level, message: &str, extra: Option<&Value>) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut line = format!("[{ts}] [{}] [{task_id}] {message}", level.as_str());
        if let Some(extra) = extra {
            line.push_str(" | ");
            line.push_str(&extra.to_string());
        }
        line.push('\n');

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(task_id))
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            debug!(task_id, error = %e, "Failed to append task log line");
        }
    }

    /// Read the last `lines` lines of a task's log; `0` returns everything.
    /// Returns `None` when no log file exists for the id.
    pub fn tail(&self, task_id: &str, lines: usize) -> Option<String> {
        let content = fs::read_to_string(self.log_path(task_id)).ok()?;
        if lines == 0 {
            return Some(content);
        }
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Some(all[start..].join("\n"))
    }
}
