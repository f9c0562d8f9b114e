//! Subprocess-backed worker client
//!
//! Drives the agent CLI: a `status` call for the readiness check, then for
//! each invocation a fresh session (`create-chat`) and a non-interactive
//! prompt run resumed against it. stdout and stderr are captured whole; the
//! invocation is awaited to completion with no timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AgentClient, AgentError, InvocationOutcome, InvocationRequest};

/// Worker client that shells out to the agent binary
pub struct ProcessAgent {
    bin: PathBuf,
}

impl ProcessAgent {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run_command(&self, args: &[&str], cwd: &Path) -> Result<CommandResult, AgentError> {
        debug!(bin = %self.bin.display(), ?args, cwd = %cwd.display(), "Running agent command");
        let output = Command::new(&self.bin)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandResult {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn create_session(&self, workspace_dir: &Path) -> Result<String, AgentError> {
        let res = self.run_command(&["create-chat"], workspace_dir).await?;
        if res.status != 0 {
            return Err(AgentError::NotReady(format!(
                "create-chat failed: {}{}",
                res.stdout, res.stderr
            )));
        }
        res.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .map(str::to_string)
            .ok_or(AgentError::MissingSessionId)
    }
}

struct CommandResult {
    status: i32,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl AgentClient for ProcessAgent {
    async fn check_ready(&self, workspace_dir: &Path) -> Result<(), AgentError> {
        let res = self.run_command(&["status"], workspace_dir).await?;
        let combined = format!("{}{}", res.stdout, res.stderr);
        if combined.contains("Not logged in") || combined.contains("Run 'agent login'") {
            return Err(AgentError::NotLoggedIn {
                bin: self.bin.display().to_string(),
            });
        }
        if res.status != 0 {
            return Err(AgentError::NotReady(combined.trim().to_string()));
        }
        Ok(())
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutcome, AgentError> {
        let session_id = self.create_session(&request.workspace_dir).await?;
        let workspace = request.workspace_dir.display().to_string();

        let args = [
            "-p",
            "-f",
            "--model",
            &request.model,
            "--resume",
            &session_id,
            "--workspace",
            &workspace,
            &request.prompt,
        ];

        let res = self.run_command(&args, &request.workspace_dir).await?;
        let output = format!("{}{}", res.stdout, res.stderr);
        if res.status != 0 {
            return Err(AgentError::RunFailed {
                output,
                session_id: Some(session_id),
            });
        }

        Ok(InvocationOutcome {
            output,
            stdout: res.stdout,
            stderr: res.stderr,
            session_id: Some(session_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn fake_bin(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("agent");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_check_ready_detects_not_logged_in() {
        let temp = tempdir().unwrap();
        let bin = fake_bin(temp.path(), "echo 'Not logged in'; exit 0");
        let agent = ProcessAgent::new(bin);

        let err = agent.check_ready(temp.path()).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_check_ready_ok() {
        let temp = tempdir().unwrap();
        let bin = fake_bin(temp.path(), "echo 'Logged in as operator'; exit 0");
        let agent = ProcessAgent::new(bin);

        assert!(agent.check_ready(temp.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invoke_captures_output_and_session() {
        let temp = tempdir().unwrap();
        // First call is create-chat, every later call is the prompt run
        let bin = fake_bin(
            temp.path(),
            "if [ \"$1\" = create-chat ]; then echo session-42; else echo ran; fi",
        );
        let agent = ProcessAgent::new(bin);

        let outcome = agent
            .invoke(InvocationRequest {
                workspace_dir: temp.path().to_path_buf(),
                model: "composer-1".to_string(),
                prompt: "do the thing".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.session_id.as_deref(), Some("session-42"));
        assert!(outcome.output.contains("ran"));
    }

    #[tokio::test]
    async fn test_invoke_nonzero_exit_fails() {
        let temp = tempdir().unwrap();
        let bin = fake_bin(
            temp.path(),
            "if [ \"$1\" = create-chat ]; then echo session-1; else echo boom >&2; exit 3; fi",
        );
        let agent = ProcessAgent::new(bin);

        let err = agent
            .invoke(InvocationRequest {
                workspace_dir: temp.path().to_path_buf(),
                model: "composer-1".to_string(),
                prompt: "p".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            AgentError::RunFailed { output, session_id } => {
                assert!(output.contains("boom"));
                assert_eq!(session_id.as_deref(), Some("session-1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let temp = tempdir().unwrap();
        let agent = ProcessAgent::new(temp.path().join("no-such-bin"));
        let err = agent.check_ready(temp.path()).await.unwrap_err();
        assert!(matches!(err, AgentError::Spawn(_)));
    }
}
