//! Control surface for task lifecycle operations
//!
//! `TaskService` is the single entry point the CLI (or any embedding) talks
//! to: start a task, stop it, list tasks, read a task's log. All collaborators
//! are injected, so the whole surface is testable with a mock worker and a
//! tempdir store.

use std::fs;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::agent::{AgentClient, AgentError, InvocationRequest, OUTPUT_EXCERPT_LIMIT, truncate};
use crate::artifacts::CORE_PROMPT_FILE;
use crate::domain::{TaskMode, TaskPatch, TaskRecord, TaskStatus, generate_task_id};
use crate::prompts::build_generation_prompt;
use crate::runner::{RunnerError, TaskLoop, TaskRegistry, spawn_task_loop};
use crate::snapshot::{DEFAULT_MTIME_TOLERANCE, Snapshot, diff, summarize};
use crate::store::{StoreError, TaskStore};
use crate::tasklog::TaskLogger;

/// Default wait between runs in interval mode, when the operator gives none
pub const DEFAULT_INTERVAL_SECONDS: u64 = 1800;

/// Default cap per change list in run summaries
pub const DEFAULT_SUMMARY_LIMIT: usize = 50;

/// Errors surfaced synchronously from `start`
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid task options: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(AgentError),

    #[error("priming invocation failed: {0}")]
    Agent(AgentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from operations addressed to an existing task
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no such task: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Operator-supplied options for starting a task
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub goal: String,
    pub input_materials: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub mode: TaskMode,
    /// Seconds between runs; interval mode only, defaulted when absent
    pub interval_seconds: Option<u64>,
    /// Stop after this many successful runs; 0 means unlimited
    pub max_success_runs: u64,
    /// Agent model; defaulted from settings when absent
    pub model: Option<String>,
    /// Worker working directory; defaults to the common ancestor of the
    /// inputs and the output directory
    pub workspace_dir: Option<PathBuf>,
}

/// Tunables the service applies to every task it starts
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_model: String,
    pub mtime_tolerance: Duration,
    pub summary_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_model: "composer-1".to_string(),
            mtime_tolerance: DEFAULT_MTIME_TOLERANCE,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

/// A task record joined with its live-scheduler status
#[derive(Debug, Clone)]
pub struct TaskView {
    pub record: TaskRecord,
    /// Whether a controller for this task is live in this process
    pub live: bool,
}

impl TaskView {
    /// Effective status for display. A non-terminal persisted status with no
    /// live controller means a previous process died without settling the
    /// record; that is reported as `stale`, never as `running`.
    pub fn status_label(&self) -> String {
        if !self.live && !self.record.status.is_terminal() {
            "stale".to_string()
        } else {
            self.record.status.to_string()
        }
    }
}

/// Task lifecycle operations over injected collaborators
pub struct TaskService {
    store: Arc<TaskStore>,
    registry: Arc<TaskRegistry>,
    agent: Arc<dyn AgentClient>,
    log: Arc<TaskLogger>,
    settings: ServiceSettings,
}

impl TaskService {
    pub fn new(
        store: Arc<TaskStore>,
        registry: Arc<TaskRegistry>,
        agent: Arc<dyn AgentClient>,
        log: Arc<TaskLogger>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            registry,
            agent,
            log,
            settings,
        }
    }

    /// Validate options, prime the task, persist its record, and spawn its
    /// loop. Returns the created record once the loop is scheduled.
    ///
    /// The readiness check runs before anything is persisted, so an
    /// unauthenticated worker leaves no record behind. The priming invocation
    /// asks the worker to explore the inputs and write the core-instructions
    /// file; if the worker fails to write it, the generation prompt itself
    /// becomes the core prompt.
    pub async fn start(&self, options: StartOptions) -> Result<TaskRecord, StartError> {
        let goal = options.goal.trim().to_string();
        if goal.is_empty() {
            return Err(StartError::Validation("goal must not be empty".to_string()));
        }
        if options.output_dir.as_os_str().is_empty() {
            return Err(StartError::Validation("output directory must not be empty".to_string()));
        }

        let interval_seconds = match options.mode {
            TaskMode::Continuous => 0,
            TaskMode::Interval => {
                let secs = options.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS);
                if secs == 0 {
                    return Err(StartError::Validation(
                        "interval must be positive in interval mode".to_string(),
                    ));
                }
                secs
            }
        };

        fs::create_dir_all(&options.output_dir)?;
        let output_dir = fs::canonicalize(&options.output_dir)?;

        let mut input_materials = Vec::with_capacity(options.input_materials.len());
        for input in &options.input_materials {
            let resolved = fs::canonicalize(input).map_err(|_| {
                StartError::Validation(format!("input material not found: {}", input.display()))
            })?;
            input_materials.push(resolved);
        }

        let workspace_dir = match options.workspace_dir {
            Some(dir) => fs::canonicalize(&dir)?,
            None => {
                let mut roots = input_materials.clone();
                roots.push(output_dir.clone());
                common_ancestor(&roots).unwrap_or_else(|| output_dir.clone())
            }
        };

        self.agent
            .check_ready(&workspace_dir)
            .await
            .map_err(|e| {
                if e.is_auth() {
                    StartError::Auth(e)
                } else {
                    StartError::Agent(e)
                }
            })?;

        let model = options.model.unwrap_or_else(|| self.settings.default_model.clone());
        let task_id = generate_task_id();
        info!(task_id, goal = %goal, "Starting task");
        self.log.info(
            &task_id,
            "Priming task",
            Some(&json!({
                "goal": goal,
                "output_dir": output_dir,
                "workspace_dir": workspace_dir,
                "model": model,
            })),
        );

        let generation_prompt = build_generation_prompt(&goal, &input_materials, &output_dir);
        let before = Snapshot::capture(&output_dir);
        let outcome = self
            .agent
            .invoke(InvocationRequest {
                workspace_dir: workspace_dir.clone(),
                model: model.clone(),
                prompt: generation_prompt.clone(),
            })
            .await
            .map_err(StartError::Agent)?;
        let after = Snapshot::capture(&output_dir);
        let summary = summarize(&diff(&before, &after, self.settings.mtime_tolerance), self.settings.summary_limit);
        self.log.info(
            &task_id,
            "Priming finished",
            Some(&json!({
                "changes": summary,
                "output": truncate(&outcome.output, OUTPUT_EXCERPT_LIMIT),
            })),
        );

        let core_prompt = match fs::read_to_string(output_dir.join(CORE_PROMPT_FILE)) {
            Ok(text) => text,
            Err(_) => {
                self.log.warn(
                    &task_id,
                    "Worker did not write core instructions, using generation prompt for runs",
                    None,
                );
                generation_prompt
            }
        };

        let now = chrono::Utc::now();
        let record = self.store.create(TaskRecord {
            id: task_id.clone(),
            goal,
            input_materials,
            output_dir: output_dir.clone(),
            workspace_dir: workspace_dir.clone(),
            mode: options.mode,
            interval_seconds,
            max_success_runs: options.max_success_runs,
            status: TaskStatus::Running,
            run_count: 0,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            last_output_path: None,
            last_error: None,
            model: model.clone(),
        })?;

        spawn_task_loop(
            TaskLoop {
                task_id,
                core_prompt,
                output_dir,
                workspace_dir,
                model,
                interval: Duration::from_secs(interval_seconds),
                max_success_runs: options.max_success_runs,
                mtime_tolerance: self.settings.mtime_tolerance,
                summary_limit: self.settings.summary_limit,
            },
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.agent),
            Arc::clone(&self.log),
        )?;

        Ok(record)
    }

    /// Request a stop. With a live loop the record moves to `stopping` and
    /// the loop settles it to `stopped`; without one the record is settled
    /// directly. Stopping an already-terminal task is a no-op.
    pub fn stop(&self, task_id: &str) -> Result<TaskRecord, ServiceError> {
        let record = self
            .store
            .get(task_id)
            .ok_or_else(|| ServiceError::NotFound(task_id.to_string()))?;

        if self.registry.is_active(task_id) {
            let updated = self
                .store
                .update(task_id, TaskPatch::default().status(TaskStatus::Stopping))?
                .ok_or_else(|| ServiceError::NotFound(task_id.to_string()))?;
            self.registry.stop(task_id);
            self.log.info(task_id, "Stop requested", None);
            return Ok(updated);
        }

        if record.status.is_terminal() {
            return Ok(record);
        }

        // Stale record from a previous process: settle it here.
        let updated = self
            .store
            .update(task_id, TaskPatch::default().status(TaskStatus::Stopped))?
            .ok_or_else(|| ServiceError::NotFound(task_id.to_string()))?;
        self.log.info(task_id, "Task stopped", None);
        Ok(updated)
    }

    /// All task records joined with live-controller status, optionally
    /// filtered by persisted status.
    pub fn list(&self, status_filter: Option<TaskStatus>) -> Vec<TaskView> {
        self.store
            .list()
            .into_iter()
            .filter(|r| status_filter.is_none_or(|s| r.status == s))
            .map(|record| {
                let live = self.registry.is_active(&record.id);
                TaskView { record, live }
            })
            .collect()
    }

    /// Tail of a task's log stream with a short header; `lines == 0` returns
    /// the whole stream.
    pub fn log(&self, task_id: &str, lines: usize) -> Result<String, ServiceError> {
        let record = self
            .store
            .get(task_id)
            .ok_or_else(|| ServiceError::NotFound(task_id.to_string()))?;

        let header = format!(
            "Task {id}\n  goal: {goal}\n  status: {status}\n  runs: {runs}\n  log: {path}\n",
            id = record.id,
            goal = record.goal,
            status = record.status,
            runs = record.run_count,
            path = self.log.log_path(task_id).display(),
        );
        let body = self
            .log
            .tail(task_id, lines)
            .unwrap_or_else(|| "(no log entries yet)".to_string());
        Ok(format!("{header}\n{body}"))
    }
}

/// Longest shared path prefix of `paths`, by components.
fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = paths.iter();
    let mut prefix: Vec<Component> = iter.next()?.components().collect();

    for path in iter {
        let comps: Vec<Component> = path.components().collect();
        let shared = prefix
            .iter()
            .zip(comps.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(shared);
    }

    if prefix.is_empty() {
        None
    } else {
        Some(prefix.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockAgentClient;
    use std::path::Path;
    use tempfile::tempdir;

    fn service(temp: &Path, agent: Arc<dyn AgentClient>) -> TaskService {
        TaskService::new(
            Arc::new(TaskStore::open(temp.join("tasks.json")).unwrap()),
            Arc::new(TaskRegistry::new()),
            agent,
            Arc::new(TaskLogger::new(temp.join("logs")).unwrap()),
            ServiceSettings::default(),
        )
    }

    fn options(output_dir: &Path) -> StartOptions {
        StartOptions {
            goal: "produce a report".to_string(),
            input_materials: vec![],
            output_dir: output_dir.to_path_buf(),
            mode: TaskMode::Interval,
            interval_seconds: Some(3600),
            max_success_runs: 0,
            model: None,
            workspace_dir: None,
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_rejects_empty_goal() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        let mut opts = options(&temp.path().join("out"));
        opts.goal = "   ".to_string();
        let err = svc.start(opts).await.unwrap_err();
        assert!(matches!(err, StartError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_rejects_zero_interval() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        let mut opts = options(&temp.path().join("out"));
        opts.interval_seconds = Some(0);
        let err = svc.start(opts).await.unwrap_err();
        assert!(matches!(err, StartError::Validation(msg) if msg.contains("interval")));
    }

    #[tokio::test]
    async fn test_start_rejects_missing_input() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        let mut opts = options(&temp.path().join("out"));
        opts.input_materials = vec![temp.path().join("no-such-input")];
        let err = svc.start(opts).await.unwrap_err();
        assert!(matches!(err, StartError::Validation(msg) if msg.contains("input material")));
    }

    #[tokio::test]
    async fn test_unauthenticated_worker_creates_no_record() {
        let temp = tempdir().unwrap();
        let agent = Arc::new(MockAgentClient::not_logged_in());
        let svc = service(temp.path(), agent.clone());

        let err = svc.start(options(&temp.path().join("out"))).await.unwrap_err();
        assert!(matches!(err, StartError::Auth(_)));
        assert!(svc.list(None).is_empty());
        assert_eq!(agent.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_start_primes_creates_record_and_spawns() {
        let temp = tempdir().unwrap();
        let agent = Arc::new(MockAgentClient::always_ok());
        let svc = service(temp.path(), agent.clone());

        let mut opts = options(&temp.path().join("out"));
        opts.max_success_runs = 1;
        let record = svc.start(opts).await.unwrap();

        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.interval_seconds, 3600);
        assert_eq!(record.model, "composer-1");
        // Priming invocation happened before the loop's first run
        assert!(agent.invocations()[0].prompt.contains("PHASE 1"));

        let svc_store = Arc::clone(&svc.store);
        let id = record.id.clone();
        wait_until(move || {
            svc_store
                .get(&id)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        })
        .await;

        let task = svc.store.get(&record.id).unwrap();
        assert_eq!(task.run_count, 1);
        assert!(!svc.registry.is_active(&record.id));
        // Worker never wrote core instructions, so runs reuse the generation prompt
        let runs = agent.invocations();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].prompt.contains("PHASE 1"));
        assert!(runs[1].prompt.contains("Execute one run now."));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_without_live_loop() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        let mut opts = options(&temp.path().join("out"));
        opts.max_success_runs = 1;
        let record = svc.start(opts).await.unwrap();

        let svc_store = Arc::clone(&svc.store);
        let id = record.id.clone();
        wait_until(move || {
            svc_store
                .get(&id)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        })
        .await;

        // Completed task: stop leaves it completed
        let stopped = svc.stop(&record.id).unwrap();
        assert_eq!(stopped.status, TaskStatus::Completed);

        let err = svc.stop("no-such-id").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_remaps_stale_running_record() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        // Simulate a record left behind by a crashed process
        let now = chrono::Utc::now();
        svc.store
            .create(TaskRecord {
                id: "stale-1".to_string(),
                goal: "g".to_string(),
                input_materials: vec![],
                output_dir: temp.path().join("out"),
                workspace_dir: temp.path().to_path_buf(),
                mode: TaskMode::Continuous,
                interval_seconds: 0,
                max_success_runs: 0,
                status: TaskStatus::Running,
                run_count: 2,
                created_at: now,
                updated_at: now,
                last_run_at: None,
                last_output_path: None,
                last_error: None,
                model: "composer-1".to_string(),
            })
            .unwrap();

        let views = svc.list(None);
        assert_eq!(views.len(), 1);
        assert!(!views[0].live);
        assert_eq!(views[0].status_label(), "stale");

        // Stopping a stale record settles it directly
        let stopped = svc.stop("stale-1").unwrap();
        assert_eq!(stopped.status, TaskStatus::Stopped);
        assert_eq!(svc.list(Some(TaskStatus::Stopped)).len(), 1);
        assert_eq!(svc.list(None)[0].status_label(), "stopped");
    }

    #[tokio::test]
    async fn test_log_includes_header_and_tail() {
        let temp = tempdir().unwrap();
        let svc = service(temp.path(), Arc::new(MockAgentClient::always_ok()));

        let mut opts = options(&temp.path().join("out"));
        opts.max_success_runs = 1;
        let record = svc.start(opts).await.unwrap();

        let out = svc.log(&record.id, 0).unwrap();
        assert!(out.contains(&record.id));
        assert!(out.contains("produce a report"));
        assert!(out.contains("Priming task"));

        let err = svc.log("missing", 0).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_common_ancestor() {
        let paths = vec![
            PathBuf::from("/data/projects/a/src"),
            PathBuf::from("/data/projects/b"),
            PathBuf::from("/data/projects/a"),
        ];
        assert_eq!(common_ancestor(&paths), Some(PathBuf::from("/data/projects")));

        assert_eq!(
            common_ancestor(&[PathBuf::from("/only/one")]),
            Some(PathBuf::from("/only/one"))
        );
        assert_eq!(common_ancestor(&[]), None);
        // Disjoint absolute paths share the root
        assert_eq!(
            common_ancestor(&[PathBuf::from("/a/b"), PathBuf::from("/c/d")]),
            Some(PathBuf::from("/"))
        );
    }
}
