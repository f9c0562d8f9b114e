//! Domain types for nightshift tasks

mod id;
mod task;

pub use id::generate_task_id;
pub use task::{TaskMode, TaskPatch, TaskRecord, TaskStatus};
