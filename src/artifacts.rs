//! Artifact files the worker maintains in each task's output directory
//!
//! The core observes these files but never authors them. Absence of any of
//! them is tolerated everywhere; a run that failed to write its progress file
//! simply hands less context to the next run.

use std::fs;
use std::path::{Path, PathBuf};

/// Core instructions generated by the priming run; input to every run prompt.
pub const CORE_PROMPT_FILE: &str = "CORE_PROMPT.md";
/// Machine-readable progress record maintained by the worker.
pub const PROGRESS_FILE: &str = "PROGRESS.json";
/// Human-readable run index maintained by the worker.
pub const INDEX_FILE: &str = "INDEX.md";
/// Per-run output artifact.
pub const RUN_OUTPUT_FILE: &str = "RUN_ONCE_OUTPUT.md";
/// Optional note a run leaves for its successor.
pub const HANDOFF_FILE: &str = "HANDOFF_PROMPT.md";

/// Path of the per-run output artifact for a task
pub fn run_output_path(output_dir: &Path) -> PathBuf {
    output_dir.join(RUN_OUTPUT_FILE)
}

/// Bundle of prior-run artifacts handed to the worker so it can resume
/// rather than restart.
#[derive(Debug, Clone, Default)]
pub struct PriorRuns {
    /// Successful runs completed before this one
    pub run_count: u64,
    pub progress: Option<String>,
    pub index: Option<String>,
    pub last_output: Option<String>,
    pub handoff: Option<String>,
}

impl PriorRuns {
    /// Load whatever prior-run artifacts exist in `output_dir`. Missing or
    /// unreadable files are omitted from the bundle, never an error.
    pub fn load(output_dir: &Path, run_count: u64) -> Self {
        let read = |name: &str| fs::read_to_string(output_dir.join(name)).ok();
        Self {
            run_count,
            progress: read(PROGRESS_FILE),
            index: read(INDEX_FILE),
            last_output: read(RUN_OUTPUT_FILE),
            handoff: read(HANDOFF_FILE),
        }
    }
}
