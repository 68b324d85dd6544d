//! Version query against an installed sqlfmt binary.

use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Flag that makes sqlfmt print its version and exit.
pub const VERSION_FLAG: &str = "--version";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"v?\d+(?:\.\d+)+(?:[-+][0-9A-Za-z.\-]+)?").expect("valid version regex")
    })
}

/// Extracts a version string from `--version` output.
///
/// sqlfmt prints a bare version (`0.3.1`), but output such as
/// `sqlfmt 0.3.1` is accepted too. Returns `None` for empty output.
pub fn parse_version_output(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    match version_pattern().find(line) {
        Some(m) => Some(m.as_str().to_string()),
        None => Some(line.to_string()),
    }
}

/// Runs `binary --version` and returns the reported version.
///
/// Spawn errors, non-zero exits, timeouts and empty output all yield `None`,
/// which callers treat as "version unknown".
pub async fn query_version(binary: &Path, limit: Duration) -> Option<String> {
    let mut cmd = Command::new(binary);
    cmd.arg(VERSION_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(binary = %binary.display(), error = %e, "Version query failed to start");
            return None;
        }
        Err(_) => {
            warn!(binary = %binary.display(), ?limit, "Version query timed out");
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            binary = %binary.display(),
            status = %output.status,
            "Version query exited unsuccessfully"
        );
        return None;
    }

    let version = parse_version_output(&String::from_utf8_lossy(&output.stdout));
    debug!(binary = %binary.display(), ?version, "Queried installed version");
    version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_version() {
        assert_eq!(parse_version_output("0.3.1\n"), Some("0.3.1".to_string()));
        assert_eq!(parse_version_output("v1.1.0"), Some("v1.1.0".to_string()));
    }

    #[test]
    fn test_parse_prefixed_version() {
        assert_eq!(
            parse_version_output("sqlfmt 1.2.3-beta.1\n"),
            Some("1.2.3-beta.1".to_string())
        );
    }

    #[test]
    fn test_parse_empty_and_non_version_output() {
        assert_eq!(parse_version_output(""), None);
        assert_eq!(parse_version_output("\n  \n"), None);
        assert_eq!(
            parse_version_output("nightly\n"),
            Some("nightly".to_string())
        );
    }

    #[tokio::test]
    async fn test_query_version_missing_binary() {
        let missing = Path::new("/definitely/not/here/sqlfmt");
        assert_eq!(query_version(missing, Duration::from_secs(5)).await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_query_version_script() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join("sqlfmt");
        std::fs::write(&script, "#!/bin/sh\necho 1.4.2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            query_version(&script, Duration::from_secs(5)).await,
            Some("1.4.2".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_query_version_failing_binary() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join("sqlfmt");
        std::fs::write(&script, "#!/bin/sh\necho 1.4.2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(query_version(&script, Duration::from_secs(5)).await, None);
    }
}
