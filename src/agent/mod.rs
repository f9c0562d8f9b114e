//! Worker invocation layer
//!
//! The worker is an external agent CLI, treated as an opaque
//! invoke(prompt) -> outcome call. This module owns the trait seam, the
//! subprocess-backed implementation, and a scripted mock for tests.

mod client;
mod error;
mod process;

pub use client::AgentClient;
pub use client::mock::MockAgentClient;
pub use error::AgentError;
pub use process::ProcessAgent;

use std::path::PathBuf;

/// A single worker invocation request
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Working directory for the worker process
    pub workspace_dir: PathBuf,
    /// Model identifier passed through to the worker
    pub model: String,
    /// Full prompt text
    pub prompt: String,
}

/// Captured result of a successful worker invocation
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    /// Combined stdout + stderr, in that order
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    /// Worker session id, when the worker protocol provides one
    pub session_id: Option<String>,
}

/// How much invocation output is carried into task log extras
pub const OUTPUT_EXCERPT_LIMIT: usize = 4000;

/// Truncate text for log extras, keeping the true length visible.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated, total {} chars)", &text[..end], text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "x".repeat(50);
        let out = truncate(&text, 10);
        assert!(out.starts_with("xxxxxxxxxx\n"));
        assert!(out.contains("total 50 chars"));
    }
}
