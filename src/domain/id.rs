//! Task ID generation
//!
//! Task ids are UUIDv7 strings: time-ordered, so store listings and log file
//! names sort by creation time.

/// Generate a fresh task id
pub fn generate_task_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
