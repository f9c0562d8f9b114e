//! Directory snapshot and diff engine
//!
//! A worker invocation is an untrusted black box; the only objective signal of
//! "did anything happen" is a before/after diff of the output directory. The
//! walk is best-effort: entries that disappear mid-walk or cannot be statted
//! are skipped, never an error, because transient files and races are expected
//! while a worker is writing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use walkdir::WalkDir;

/// Default tolerance for treating a modified-time difference as "no change".
/// Absorbs filesystem timestamp granularity noise; configurable because the
/// right value depends on the underlying filesystem clock.
pub const DEFAULT_MTIME_TOLERANCE: Duration = Duration::from_millis(2);

/// Metadata for a single file in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FileMeta {
    /// File size in bytes
    pub len: u64,
    /// Last modification time
    #[serde(serialize_with = "serialize_mtime")]
    pub modified: SystemTime,
}

fn serialize_mtime<S: serde::Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let ms = t
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    s.serialize_u64(ms as u64)
}

/// Point-in-time view of a directory tree: relative path -> metadata
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: HashMap<PathBuf, FileMeta>,
}

impl Snapshot {
    /// Capture a snapshot of `root`, recursively.
    ///
    /// A missing root yields an empty snapshot. Per-entry errors (permission
    /// denied, race-deleted files) skip the entry rather than failing the walk.
    pub fn capture(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let mut files = HashMap::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            files.insert(
                rel.to_path_buf(),
                FileMeta {
                    len: meta.len(),
                    modified,
                },
            );
        }

        Self { files }
    }

    /// Number of files captured
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FileMeta> {
        self.files.get(path.as_ref())
    }
}

/// A created or deleted file
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEntry {
    pub path: PathBuf,
    #[serde(flatten)]
    pub meta: FileMeta,
}

/// A file present in both snapshots whose metadata changed
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedEntry {
    pub path: PathBuf,
    pub before: FileMeta,
    pub after: FileMeta,
}

/// Result of diffing two snapshots of the same root
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub created: Vec<ChangeEntry>,
    pub updated: Vec<UpdatedEntry>,
    pub deleted: Vec<ChangeEntry>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Compute created/updated/deleted sets between two snapshots.
///
/// A path present in both with identical size and a modification time within
/// `mtime_tolerance` is omitted from all three sets.
pub fn diff(before: &Snapshot, after: &Snapshot, mtime_tolerance: Duration) -> DiffReport {
    let mut report = DiffReport::default();

    for (path, after_meta) in &after.files {
        match before.files.get(path) {
            None => report.created.push(ChangeEntry {
                path: path.clone(),
                meta: *after_meta,
            }),
            Some(before_meta) => {
                let mtime_delta = abs_delta(before_meta.modified, after_meta.modified);
                if before_meta.len != after_meta.len || mtime_delta > mtime_tolerance {
                    report.updated.push(UpdatedEntry {
                        path: path.clone(),
                        before: *before_meta,
                        after: *after_meta,
                    });
                }
            }
        }
    }

    for (path, before_meta) in &before.files {
        if !after.files.contains_key(path) {
            report.deleted.push(ChangeEntry {
                path: path.clone(),
                meta: *before_meta,
            });
        }
    }

    report
}

fn abs_delta(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b).or_else(|_| b.duration_since(a)).unwrap_or_default()
}

/// A list capped at a limit, remembering the true total
#[derive(Debug, Clone, Serialize)]
pub struct Capped<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub truncated: bool,
}

fn cap<T: Clone>(items: &[T], limit: usize) -> Capped<T> {
    Capped {
        items: items.iter().take(limit).cloned().collect(),
        total: items.len(),
        truncated: items.len() > limit,
    }
}

/// Bounded view of a diff, safe to ship into logs and reports
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSummary {
    pub created: Capped<ChangeEntry>,
    pub updated: Capped<UpdatedEntry>,
    pub deleted: Capped<ChangeEntry>,
}

/// Cap each list of a diff at `limit` entries, keeping the true counts.
pub fn summarize(report: &DiffReport, limit: usize) -> ChangeSummary {
    ChangeSummary {
        created: cap(&report.created, limit),
        updated: cap(&report.updated, limit),
        deleted: cap(&report.deleted, limit),
    }
}
