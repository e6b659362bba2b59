//! Running external command-line tools with a hard timeout.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use super::backend::ToolError;

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Run `program` with `args`, returning stdout on success.
///
/// The child is killed if `timeout` elapses first.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
    install_hint: &str,
) -> Result<Vec<u8>, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let result = match tokio::time::timeout(timeout, output).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", program, timeout);
            return Err(ToolError::ToolTimeout {
                tool: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    match result {
        Ok(output) => {
            tracing::debug!(
                "{} exited with {} in {}ms",
                program,
                output.status,
                start.elapsed().as_millis()
            );
            if output.status.success() {
                Ok(output.stdout)
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ToolError::ToolFailed {
                    tool: program.to_string(),
                    message: stderr.trim().to_string(),
                })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::ToolUnavailable(
            format!("{} ({})", program, install_hint),
        )),
        Err(e) => Err(ToolError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let err = run_tool(
            "takeoff-no-such-tool",
            ["--version"],
            Duration::from_secs(5),
            "not installable",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::ToolUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_tool() {
        if !check_binary("sleep") {
            return;
        }
        let err = run_tool("sleep", ["5"], Duration::from_millis(100), "coreutils")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ToolTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_returned() {
        if !check_binary("echo") {
            return;
        }
        let out = run_tool("echo", ["D7"], Duration::from_secs(5), "coreutils")
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim(), "D7");
    }
}
