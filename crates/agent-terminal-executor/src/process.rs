//! Local process executor.

use std::{path::PathBuf, process::Stdio, time::Duration};

use agent_terminal_core::traits::{ExecError, ExecOutput, Executor};
use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
};

use crate::{command::CommandLine, shell::resolve_executable_path};

/// How long output pipes may stay open after the main process exits.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as local child processes.
///
/// Each command gets its own process group so a timeout kills everything it
/// started, not just the direct child.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Executor running in the server's current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor running in `dir`.
    #[must_use]
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }

    async fn build(&self, line: CommandLine) -> Result<Command, ExecError> {
        let mut cmd = match line {
            CommandLine::Shell { shell, flag, script } => {
                let mut cmd = Command::new(shell);
                cmd.arg(flag).arg(script);
                cmd
            }
            CommandLine::Direct { program, args } => {
                let executable = resolve_executable_path(&program)
                    .await
                    .ok_or(ExecError::CommandNotFound(program))?;
                let mut cmd = Command::new(executable);
                cmd.args(args);
                cmd
            }
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(cmd)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutput, ExecError> {
        let line = CommandLine::parse(command).map_err(|e| ExecError::Execution(e.to_string()))?;
        let program = line.program().to_string();
        let mut cmd = self.build(line).await?;
        let mut child = cmd.group_spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::CommandNotFound(program)
            } else {
                ExecError::Execution(e.to_string())
            }
        })?;

        let mut stdout_task = tokio::spawn(read_pipe(child.inner().stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.inner().stderr.take()));

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let (stdout, stderr) = if let Ok(pair) =
                    tokio::time::timeout(PIPE_GRACE, join_pipes(&mut stdout_task, &mut stderr_task)).await
                {
                    pair
                } else {
                    tracing::debug!(command, "Output pipes held open after exit, killing process group");
                    kill_group(&mut child).await;
                    join_pipes(&mut stdout_task, &mut stderr_task).await
                };
                tracing::debug!(command, exit_code = ?status.code(), "Local command finished");
                Ok(ExecOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                })
            }
            Ok(Err(e)) => {
                kill_group(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(ExecError::Execution(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(command, timeout_secs = timeout.as_secs_f64(), "Local command timed out, killing");
                kill_group(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(ExecError::TimeoutExceeded(timeout))
            }
        }
    }
}

async fn kill_group(child: &mut AsyncGroupChild) {
    if let Err(e) = child.kill().await {
        tracing::debug!("Failed to kill process group: {e}");
    }
    if let Err(e) = child.wait().await {
        tracing::debug!("Failed to reap process: {e}");
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!("Error reading process output: {e}");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_pipes(stdout: &mut JoinHandle<String>, stderr: &mut JoinHandle<String>) -> (String, String) {
    let (stdout, stderr) = tokio::join!(stdout, stderr);
    (stdout.unwrap_or_default(), stderr.unwrap_or_default())
}
