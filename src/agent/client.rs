//! AgentClient trait definition

use async_trait::async_trait;
use std::path::Path;

use super::{AgentError, InvocationOutcome, InvocationRequest};

/// Opaque worker invocation seam
///
/// Each invocation is independent and runs to completion (or its own
/// failure); there is no timeout here and cancellation never interrupts an
/// in-flight invocation. Bounding a single run is an operator concern
/// outside this core.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Check that the worker is installed and authenticated.
    ///
    /// Called before any task record is created, so an unauthenticated
    /// worker surfaces synchronously to the caller of start.
    async fn check_ready(&self, workspace_dir: &Path) -> Result<(), AgentError>;

    /// Run one prompt against the worker and capture its output.
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutcome, AgentError>;
}

/// Scripted mock client for tests
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Ok(InvocationOutcome),
        Err(String),
    }

    /// Mock worker: replays a script of outcomes, then repeats a default
    /// success. Records every invocation for assertions.
    pub struct MockAgentClient {
        script: Mutex<VecDeque<Scripted>>,
        invocations: Mutex<Vec<InvocationRequest>>,
        ready: bool,
    }

    impl MockAgentClient {
        /// A mock that always succeeds with empty output
        pub fn always_ok() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                invocations: Mutex::new(Vec::new()),
                ready: true,
            }
        }

        /// A mock whose readiness check fails (worker not logged in)
        pub fn not_logged_in() -> Self {
            Self {
                ready: false,
                ..Self::always_ok()
            }
        }

        /// Queue a successful outcome with the given output text
        pub fn push_ok(&self, output: &str) {
            self.script.lock().unwrap().push_back(Scripted::Ok(InvocationOutcome {
                output: output.to_string(),
                stdout: output.to_string(),
                ..Default::default()
            }));
        }

        /// Queue a failed invocation with the given output
        pub fn push_err(&self, output: &str) {
            self.script.lock().unwrap().push_back(Scripted::Err(output.to_string()));
        }

        /// Number of invocations made so far
        pub fn invocation_count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }

        /// Copy of all requests seen so far
        pub fn invocations(&self) -> Vec<InvocationRequest> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentClient for MockAgentClient {
        async fn check_ready(&self, _workspace_dir: &Path) -> Result<(), AgentError> {
            if self.ready {
                Ok(())
            } else {
                Err(AgentError::NotLoggedIn {
                    bin: "agent".to_string(),
                })
            }
        }

        async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutcome, AgentError> {
            self.invocations.lock().unwrap().push(request);
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Ok(outcome)) => Ok(outcome),
                Some(Scripted::Err(output)) => Err(AgentError::RunFailed {
                    output,
                    session_id: None,
                }),
                None => Ok(InvocationOutcome::default()),
            }
        }
    }

}
