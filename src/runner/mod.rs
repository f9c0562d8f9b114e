//! Scheduler/runner: live task registry and per-task loops

mod engine;
mod registry;

pub use engine::{TaskLoop, spawn_task_loop};
pub use registry::{RunnerError, StopToken, TaskController, TaskRegistry};
