//! Error hook execution.
//!
//! Terminal failures can be forwarded to an external shell command, which
//! receives the serialized [`SendResult`](crate::sender::SendResult) on stdin.
//! Hook runs are best effort: failures are logged and never retried.

use std::io;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::queue::BoundedQueue;

/// A pending hook invocation.
#[derive(Debug, Clone)]
pub struct Command {
    pub command: String,
    pub input: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect output of `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("exit status {code}")]
    Exit { code: i32, output: Vec<u8> },

    #[error("terminated by signal")]
    Signal { output: Vec<u8> },
}

impl CommandError {
    /// Combined output captured before the failure, if any.
    pub fn output(&self) -> &[u8] {
        match self {
            CommandError::Exit { output, .. } | CommandError::Signal { output } => output,
            CommandError::Spawn { .. } | CommandError::Wait { .. } => &[],
        }
    }
}

/// Run `hook` through `sh -c` with `input` on stdin.
///
/// Returns stdout followed by stderr. A non-zero exit is an error that still
/// carries the output.
pub async fn invoke_pipe(hook: &str, input: &[u8]) -> Result<Vec<u8>, CommandError> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(hook)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: hook.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return;
        };
        match stdin.write_all(input).await {
            Ok(()) => {}
            // The hook is free to ignore its input.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(hook, "Hook closed stdin before reading all input");
            }
            Err(e) => {
                tracing::error!(hook, error = %e, "Failed to write hook stdin");
            }
        }
    };

    let (_, waited) = tokio::join!(feed, child.wait_with_output());
    let output = waited.map_err(|source| CommandError::Wait {
        command: hook.to_string(),
        source,
    })?;

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    if output.status.success() {
        return Ok(combined);
    }
    match output.status.code() {
        Some(code) => Err(CommandError::Exit {
            code,
            output: combined,
        }),
        None => Err(CommandError::Signal { output: combined }),
    }
}

/// Executor task: run hooks until the command queue is closed and drained.
pub async fn run_executor(executor_id: usize, commands: BoundedQueue<Command>) {
    while let Some(cmd) = commands.take().await {
        tracing::debug!(
            executor_id,
            command = %cmd.command,
            input = %String::from_utf8_lossy(&cmd.input),
            "Invoking hook command"
        );

        match invoke_pipe(&cmd.command, &cmd.input).await {
            Ok(_) => tracing::debug!(executor_id, "Hook command succeeded"),
            Err(e) => tracing::error!(
                executor_id,
                command = %cmd.command,
                error = %e,
                output = %String::from_utf8_lossy(e.output()),
                "Hook command failed"
            ),
        }
    }

    tracing::debug!(executor_id, "Command executor stopped");
}
