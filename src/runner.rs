//! Scoped execution of one external command.
//!
//! The runner never interprets a non-zero exit as a Rust-level error:
//! callers classify the outcome from [`CommandOutput`]. Only a command
//! that cannot be started at all (or that hits the optional timeout)
//! surfaces as an error.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::constants::OUTPUT_TAIL_LIMIT;
use crate::errors::CollectError;

/// Exit status and captured diagnostics of a terminated child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, -1 when the child was killed by a signal.
    pub code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Exit error for this output, for callers classifying a failure.
    pub fn exit_error(&self, command: &str) -> CollectError {
        CollectError::Exit {
            command: command.to_string(),
            code: self.code,
        }
    }
}

/// Run `argv` with the given working directory and environment, blocking
/// the caller's task until the child terminates.
///
/// The child inherits nothing: its environment is exactly `env`. Stdout
/// and stderr are drained as they stream, retaining at most
/// [`OUTPUT_TAIL_LIMIT`] bytes each. With a timeout, expiry kills the
/// child and yields [`CollectError::Timeout`].
pub async fn run_command(
    argv: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, CollectError> {
    let display = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| CollectError::EmptyCommand {
        template: String::new(),
    })?;

    trace!("spawning `{display}` in {}", cwd.display());

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CollectError::Launch {
            command: display.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_tail(stdout));
    let stderr_task = tokio::spawn(read_tail(stderr));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(waited) => waited,
            Err(_) => {
                let _ = child.kill().await;
                return Err(CollectError::Timeout {
                    command: display,
                    timeout: limit,
                });
            }
        },
        None => child.wait().await,
    }
    .map_err(|source| CollectError::Launch {
        command: display.clone(),
        source,
    })?;

    let stdout_tail = stdout_task.await.unwrap_or_default();
    let stderr_tail = stderr_task.await.unwrap_or_default();
    let code = status.code().unwrap_or(-1);

    debug!("`{display}` exited with code {code}");

    Ok(CommandOutput {
        code,
        stdout_tail,
        stderr_tail,
    })
}

/// Drain a child stream keeping only the last [`OUTPUT_TAIL_LIMIT`] bytes.
async fn read_tail<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > OUTPUT_TAIL_LIMIT {
                    tail.drain(..tail.len() - OUTPUT_TAIL_LIMIT);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
