//! Worker invocation error types

use thiserror::Error;

/// Errors that can occur while checking or invoking the worker
#[derive(Debug, Error)]
pub enum AgentError {
    /// The worker binary is installed but not authenticated
    #[error("agent is not logged in; run `{bin} login` in a terminal first")]
    NotLoggedIn { bin: String },

    /// The readiness check itself failed
    #[error("agent status check failed: {0}")]
    NotReady(String),

    /// The worker process could not be launched
    #[error("failed to launch agent process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker protocol requires a session but none was returned
    #[error("agent did not return a session id")]
    MissingSessionId,

    /// The worker exited non-zero; `output` is its combined stdout/stderr
    #[error("agent run failed: {output}")]
    RunFailed {
        output: String,
        session_id: Option<String>,
    },
}

impl AgentError {
    /// Whether this error means the operator must authenticate before any
    /// task can be started.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::NotLoggedIn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth() {
        let err = AgentError::NotLoggedIn {
            bin: "agent".to_string(),
        };
        assert!(err.is_auth());
        assert!(err.to_string().contains("agent login"));

        let err = AgentError::RunFailed {
            output: "boom".to_string(),
            session_id: None,
        };
        assert!(!err.is_auth());
    }
}
