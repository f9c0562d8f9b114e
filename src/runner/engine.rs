//! Per-task execution loop
//!
//! One spawned tokio task per scheduled loop. The loop runs detached from
//! whoever started it: every outcome lands in the store and the task log, and
//! a single top-level boundary turns any unexpected failure into a persisted
//! `error` status so no loop dies silently while its record still says
//! `running`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::agent::{AgentClient, InvocationRequest, OUTPUT_EXCERPT_LIMIT, truncate};
use crate::artifacts::{PriorRuns, run_output_path};
use crate::domain::{TaskPatch, TaskStatus};
use crate::prompts::build_run_prompt;
use crate::snapshot::{Snapshot, diff, summarize};
use crate::store::{StoreError, TaskStore};
use crate::tasklog::TaskLogger;

use super::registry::{RunnerError, TaskController, TaskRegistry};

/// Everything a task loop needs, fixed at spawn time
///
/// Mutable state (status, run count) lives in the store and is re-read each
/// iteration; this struct carries only the parts that never change for the
/// lifetime of the loop.
#[derive(Debug, Clone)]
pub struct TaskLoop {
    pub task_id: String,
    /// Core instructions fed into every run prompt
    pub core_prompt: String,
    pub output_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub model: String,
    /// Wait between runs; zero means back-to-back with a single yield
    pub interval: Duration,
    /// Stop after this many successful runs; 0 means unlimited
    pub max_success_runs: u64,
    pub mtime_tolerance: Duration,
    /// Cap per change list in run summaries
    pub summary_limit: usize,
}

/// Register a controller for the task and spawn its loop.
///
/// Fails synchronously when a loop for this id is already scheduled; after a
/// successful return, all further outcomes are reported through the store and
/// the task log. The controller is deregistered exactly once, after terminal
/// persistence, on every exit path.
pub fn spawn_task_loop(
    plan: TaskLoop,
    store: Arc<TaskStore>,
    registry: Arc<TaskRegistry>,
    agent: Arc<dyn AgentClient>,
    log: Arc<TaskLogger>,
) -> Result<JoinHandle<()>, RunnerError> {
    let controller = registry.register(&plan.task_id)?;

    let handle = tokio::spawn(async move {
        info!(task_id = %plan.task_id, "Task loop starting");

        if let Err(e) = run_loop(&plan, &controller, &store, agent.as_ref(), &log).await {
            error!(task_id = %plan.task_id, error = %e, "Task loop failed");
            log.error(&plan.task_id, "Task loop failed", Some(&json!({"error": e.to_string()})));
            let patch = TaskPatch::default()
                .status(TaskStatus::Error)
                .error(e.to_string());
            if let Err(e) = store.update(&plan.task_id, patch) {
                error!(task_id = %plan.task_id, error = %e, "Failed to persist loop failure");
            }
        }

        registry.remove(&plan.task_id);
        debug!(task_id = %plan.task_id, "Task loop ended");
    });

    Ok(handle)
}

async fn run_loop(
    plan: &TaskLoop,
    controller: &TaskController,
    store: &TaskStore,
    agent: &dyn AgentClient,
    log: &TaskLogger,
) -> Result<(), StoreError> {
    let token = controller.token();

    while !token.is_cancelled() {
        let run_at = Utc::now();

        // Re-read the live run count each iteration; a vanished record is an
        // implicit stop, not an error.
        let Some(record) = store.get(&plan.task_id) else {
            log.warn(&plan.task_id, "Task record no longer exists, stopping loop", None);
            token.cancel();
            break;
        };
        let run_count = record.run_count;
        let run_number = run_count + 1;

        let before = Snapshot::capture(&plan.output_dir);
        let prior = (run_count > 0).then(|| PriorRuns::load(&plan.output_dir, run_count));
        let prompt = build_run_prompt(&plan.core_prompt, &plan.output_dir, prior.as_ref());

        log.info(&plan.task_id, "Run starting", Some(&json!({"run": run_number})));

        match agent
            .invoke(InvocationRequest {
                workspace_dir: plan.workspace_dir.clone(),
                model: plan.model.clone(),
                prompt,
            })
            .await
        {
            Ok(outcome) => {
                let after = Snapshot::capture(&plan.output_dir);
                let summary = summarize(&diff(&before, &after, plan.mtime_tolerance), plan.summary_limit);
                log.info(
                    &plan.task_id,
                    "Run finished",
                    Some(&json!({
                        "run": run_number,
                        "changes": summary,
                        "output": truncate(&outcome.output, OUTPUT_EXCERPT_LIMIT),
                    })),
                );

                let patch = TaskPatch::default()
                    .status(TaskStatus::Running)
                    .run_count(run_number)
                    .last_run_at(run_at)
                    .last_output_path(run_output_path(&plan.output_dir))
                    .clear_error();
                let Some(updated) = store.update(&plan.task_id, patch)? else {
                    log.warn(&plan.task_id, "Task record deleted during run, stopping loop", None);
                    token.cancel();
                    break;
                };

                if plan.max_success_runs > 0 && updated.run_count >= plan.max_success_runs {
                    log.info(
                        &plan.task_id,
                        "Max successful runs reached, completing task",
                        Some(&json!({"runs": updated.run_count})),
                    );
                    store.update(&plan.task_id, TaskPatch::default().status(TaskStatus::Completed))?;
                    token.cancel();
                    break;
                }
            }
            Err(e) => {
                // Fail fast: no automatic retry, the operator restarts.
                let message = e.to_string();
                log.error(
                    &plan.task_id,
                    "Run failed",
                    Some(&json!({
                        "run": run_number,
                        "error": truncate(&message, OUTPUT_EXCERPT_LIMIT),
                    })),
                );
                store.update(
                    &plan.task_id,
                    TaskPatch::default()
                        .status(TaskStatus::Error)
                        .last_run_at(run_at)
                        .last_output_path(run_output_path(&plan.output_dir))
                        .error(message),
                )?;
                token.cancel();
                break;
            }
        }

        if !token.is_cancelled() {
            if plan.interval > Duration::ZERO {
                token.sleep(plan.interval).await;
            } else {
                // Back-to-back mode still yields so stop requests and other
                // tasks get a chance to run.
                tokio::task::yield_now().await;
            }
        }
    }

    // A loop ended by cancellation leaves a non-terminal status behind; settle
    // it before deregistering.
    if let Some(record) = store.get(&plan.task_id) {
        if matches!(record.status, TaskStatus::Running | TaskStatus::Stopping) {
            store.update(&plan.task_id, TaskPatch::default().status(TaskStatus::Stopped))?;
            log.info(&plan.task_id, "Task stopped", None);
        }
    }

    Ok(())
}
