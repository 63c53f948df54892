use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Errors raised before or while running the wrapped command.
///
/// A command that runs and exits non-zero is not an error here; its exit
/// code is returned as a value.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("No command given to run")]
    EmptyCommand,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the wrapped command and reports its exit code
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<i32, ExecError>;
}

/// Runs commands as child processes sharing this process's stdio
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner {
    work_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `work_dir` instead of the current directory
    pub fn in_dir<P: AsRef<Path>>(work_dir: P) -> Self {
        Self {
            work_dir: Some(work_dir.as_ref().to_path_buf()),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<i32, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.work_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let status = child.wait().await.map_err(|source| ExecError::Wait {
            program: program.clone(),
            source,
        })?;

        let code = exit_code(status);
        tracing::debug!(%program, code, "wrapped command exited");
        Ok(code)
    }
}

/// Exit code of a finished process; signals map to 128 + signal number
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_command() {
        let runner = ProcessRunner::new();
        assert!(matches!(runner.run(&[]).await, Err(ExecError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&argv(&["guardian-test-definitely-not-a-binary"]))
            .await;
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_pass_through() {
        let runner = ProcessRunner::new();
        assert_eq!(runner.run(&argv(&["true"])).await.unwrap(), 0);
        assert_eq!(runner.run(&argv(&["sh", "-c", "exit 3"])).await.unwrap(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = ProcessRunner::in_dir(temp_dir.path());
        let code = runner
            .run(&argv(&["sh", "-c", "touch marker"]))
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert!(temp_dir.path().join("marker").exists());
    }
}
