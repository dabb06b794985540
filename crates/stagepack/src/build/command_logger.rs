//! Command execution with log capture
//!
//! Runs external build commands while streaming their output line by line into
//! tracing and an optional callback (used for the progress spinner).

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Callback for log lines
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Run a command to completion, capturing its output
///
/// # Arguments
/// * `command` - The command to execute
/// * `label` - Name of the build being driven (for log fields and errors)
/// * `operation` - Description of the operation (e.g., "CMake configure")
/// * `log_callback` - Optional callback to receive log lines
pub async fn run_command_with_logging(
    command: &mut Command,
    label: &str,
    operation: &str,
    log_callback: Option<LogCallback>,
) -> Result<()> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!("Running command: {:?}", command);

    let mut child = command.spawn().map_err(|e| {
        Error::build(
            format!("{} failed to start for {}", operation, label),
            e.to_string(),
        )
    })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        Error::build(
            format!("{} for {} has no stdout pipe", operation, label),
            "This is an unexpected internal error",
        )
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        Error::build(
            format!("{} for {} has no stderr pipe", operation, label),
            "This is an unexpected internal error",
        )
    })?;

    let stdout_handle = forward_lines(stdout, label.to_string(), false, log_callback.clone());
    let stderr_handle = forward_lines(stderr, label.to_string(), true, log_callback);

    let status = child.wait().await.map_err(|e| {
        Error::build(
            format!("{} failed for {}", operation, label),
            e.to_string(),
        )
    })?;

    let _ = stdout_handle.await;
    let _ = stderr_handle.await;

    if !status.success() {
        return Err(Error::build(
            format!("{} failed for {} ({})", operation, label, status),
            "Check the build output for errors",
        ));
    }

    Ok(())
}

fn forward_lines<R>(
    stream: R,
    label: String,
    is_stderr: bool,
    log_callback: Option<LogCallback>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                tracing::warn!(target: "build_output", build = %label, "{}", line);
            } else {
                tracing::debug!(target: "build_output", build = %label, "{}", line);
            }

            if let Some(ref callback) = log_callback {
                callback(&line);
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_captures_output_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: LogCallback = Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        });

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo first; echo second"]);
        run_command_with_logging(&mut cmd, "test", "echo", Some(callback))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_build_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let result = run_command_with_logging(&mut cmd, "test", "exit", None).await;

        assert!(matches!(result, Err(Error::Build { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_build_error() {
        let mut cmd = Command::new("stagepack-no-such-program");
        let result = run_command_with_logging(&mut cmd, "test", "missing", None).await;

        assert!(matches!(result, Err(Error::Build { .. })));
    }
}
