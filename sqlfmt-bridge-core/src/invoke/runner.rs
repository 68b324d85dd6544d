//! Runs the sqlfmt binary over a piece of SQL.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default limit for a single formatting run.
pub const DEFAULT_FORMAT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// sqlfmt ran and rejected the input.
    #[error("sqlfmt exited with code {code}: {stderr}")]
    Tool { code: i32, stderr: String },

    /// sqlfmt could not be run, or died without an exit code.
    #[error("Failed to run sqlfmt: {0}")]
    Process(String),

    #[error("sqlfmt did not finish within {0:?}")]
    TimedOut(Duration),
}

impl FormatError {
    /// True when the input itself was the problem.
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub text: String,
    /// Anything sqlfmt wrote to stderr despite succeeding.
    pub diagnostics: Option<String>,
}

/// Pipes `input` through `binary args...` and returns its stdout.
///
/// One trailing newline is removed from the output. The child is killed if
/// it outlives `limit` or if the returned future is dropped.
pub async fn run_formatter(
    binary: &Path,
    args: &[String],
    input: &str,
    limit: Duration,
) -> Result<Formatted, FormatError> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .env("NO_COLOR", "1")
        .env("TERM", "dumb")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(binary = %binary.display(), ?args, bytes = input.len(), "Running sqlfmt");

    let mut child = cmd.spawn().map_err(|e| {
        FormatError::Process(format!("failed to start {}: {}", binary.display(), e))
    })?;

    // Feed stdin from its own task so a large input can't deadlock against
    // a full stdout pipe.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_owned();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "sqlfmt closed stdin early");
            }
            // dropping stdin closes the pipe
        })
    });

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(FormatError::Process(format!("failed to read output: {}", e))),
        Err(_) => {
            warn!(binary = %binary.display(), ?limit, "sqlfmt timed out, killing");
            if let Some(writer) = writer {
                writer.abort();
            }
            return Err(FormatError::TimedOut(limit));
        }
    };

    if let Some(writer) = writer {
        let _ = writer.await;
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let Some(code) = output.status.code() else {
        return Err(FormatError::Process(format!(
            "sqlfmt was terminated ({})",
            output.status
        )));
    };

    if code != 0 {
        debug!(code, %stderr, "sqlfmt rejected input");
        return Err(FormatError::Tool { code, stderr });
    }

    let mut text = String::from_utf8(output.stdout)
        .map_err(|_| FormatError::Process("sqlfmt produced non-UTF-8 output".to_string()))?;
    if text.ends_with('\n') {
        text.pop();
    }

    Ok(Formatted {
        text,
        diagnostics: (!stderr.is_empty()).then_some(stderr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_process_error() {
        let result = run_formatter(
            Path::new("/definitely/not/here/sqlfmt"),
            &[],
            "select 1",
            Duration::from_secs(5),
        )
        .await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, FormatError::Process(_)));
    }

    #[test]
    fn test_error_display() {
        let err = FormatError::Tool {
            code: 1,
            stderr: "unexpected token".to_string(),
        };
        assert!(err.is_tool_error());
        assert_eq!(
            err.to_string(),
            "sqlfmt exited with code 1: unexpected token"
        );
        assert!(!FormatError::TimedOut(Duration::from_secs(1)).is_tool_error());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("sqlfmt");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_strips_one_trailing_newline() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, r"cat > /dev/null; printf 'SELECT *\nFROM t\n\n'");

            let formatted = run_formatter(&bin, &[], "select * from t", Duration::from_secs(5))
                .await
                .unwrap();

            assert_eq!(formatted.text, "SELECT *\nFROM t\n");
            assert_eq!(formatted.diagnostics, None);
        }

        #[tokio::test]
        async fn test_passes_args_and_stdin() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, r#"echo "$@"; cat"#);
            let args = vec!["-u".to_string(), "-s".to_string(), "2".to_string()];

            let formatted = run_formatter(&bin, &args, "select 1\n", Duration::from_secs(5))
                .await
                .unwrap();

            assert_eq!(formatted.text, "-u -s 2\nselect 1");
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_tool_error() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, "cat > /dev/null; echo 'parse error at 1:8' >&2; exit 1");

            let result = run_formatter(&bin, &[], "select (", Duration::from_secs(5)).await;

            assert_eq!(
                result,
                Err(FormatError::Tool {
                    code: 1,
                    stderr: "parse error at 1:8".to_string()
                })
            );
        }

        #[tokio::test]
        async fn test_stderr_on_success_is_diagnostic() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, "cat; echo 'warning: long line' >&2");

            let result = run_formatter(&bin, &[], "select 1", Duration::from_secs(5)).await;
            let formatted = tokio_test::assert_ok!(result);

            assert_eq!(formatted.text, "select 1");
            assert_eq!(formatted.diagnostics.as_deref(), Some("warning: long line"));
        }

        #[tokio::test]
        async fn test_large_input_does_not_deadlock() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, "cat");
            let input = "select 1;\n".repeat(200_000);

            let formatted = run_formatter(&bin, &[], &input, Duration::from_secs(20))
                .await
                .unwrap();

            assert_eq!(formatted.text.len(), input.len() - 1);
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, "sleep 10");

            let started = std::time::Instant::now();
            let result = run_formatter(&bin, &[], "select 1", Duration::from_millis(200)).await;

            assert_eq!(result, Err(FormatError::TimedOut(Duration::from_millis(200))));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_killed_by_signal_is_process_error() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, "kill -9 $$");

            let result = run_formatter(&bin, &[], "select 1", Duration::from_secs(5)).await;

            assert!(matches!(result, Err(FormatError::Process(_))));
        }

        #[tokio::test]
        async fn test_non_utf8_output_is_process_error() {
            let dir = TempDir::new().unwrap();
            let bin = script(&dir, r"cat > /dev/null; printf '\377\376'");

            let result = run_formatter(&bin, &[], "select 1", Duration::from_secs(5)).await;

            assert!(matches!(result, Err(FormatError::Process(_))));
        }
    }
}
