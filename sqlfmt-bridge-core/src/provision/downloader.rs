//! Async file downloader with progress reporting and URL validation.
//!
//! Release archives are streamed to disk chunk by chunk with reqwest, so the
//! archive is never held in memory as a whole.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

// ============================================================================
// URL Security Validation
// ============================================================================

/// Hosts that may be reached over plain HTTP.
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]", "::1"];

/// Validates that a URL is safe to fetch.
///
/// Checks:
/// - URL scheme must be HTTPS (plain HTTP only for loopback hosts)
/// - Host must be in `allowed_hosts` (subdomains included)
pub fn validate_url(url_str: &str, allowed_hosts: &[String]) -> Result<Url> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL must have a host: {}", url_str))?;

    let loopback = LOOPBACK_HOSTS.contains(&host);
    match url.scheme() {
        "https" => {}
        "http" if loopback => {}
        _ => anyhow::bail!("URL must use HTTPS: {}", url_str),
    }

    let is_allowed = allowed_hosts
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)));

    if !is_allowed {
        anyhow::bail!(
            "Download domain not allowed: {}. Allowed: {:?}",
            host,
            allowed_hosts
        );
    }

    Ok(url)
}

// ============================================================================
// Download Progress
// ============================================================================

/// Progress information during a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
    /// Progress percentage (0.0 to 100.0), or None if total is unknown.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    pub(crate) fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f32 / total as f32) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

// ============================================================================
// Download Function
// ============================================================================

/// Downloads a file from a URL with streaming and progress reporting.
///
/// The destination's parent directory must already exist. The file is
/// flushed before this returns, so callers may read it immediately.
///
/// # Returns
///
/// The total number of bytes downloaded.
///
/// # Errors
///
/// Returns an error if:
/// - The URL fails [`validate_url`].
/// - The network request fails.
/// - The server returns a non-success status code.
/// - The file cannot be created or written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    allowed_hosts: &[String],
    dest: &Path,
    progress_cb: &(dyn Fn(DownloadProgress) + Send + Sync),
) -> Result<u64> {
    info!("Downloading {} to {}", url, dest.display());

    let url = validate_url(url, allowed_hosts)?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("Failed to start download from {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!(
            "Download failed with status {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        );
    }

    let total_bytes = response.content_length();
    debug!("Content-Length: {:?}", total_bytes);

    let mut file = File::create(dest)
        .await
        .with_context(|| format!("Failed to create file: {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;

    progress_cb(DownloadProgress::new(0, total_bytes));

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.with_context(|| "Failed to read chunk from response stream")?;

        file.write_all(&chunk)
            .await
            .with_context(|| "Failed to write chunk to file")?;

        bytes_downloaded += chunk.len() as u64;
        progress_cb(DownloadProgress::new(bytes_downloaded, total_bytes));
    }

    // Extraction must not start on a partially written archive.
    file.flush().await.context("Failed to flush file")?;
    file.sync_all().await.context("Failed to sync file")?;

    info!(
        "Download complete: {} bytes written to {}",
        bytes_downloaded,
        dest.display()
    );

    Ok(bytes_downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn github_hosts() -> Vec<String> {
        vec!["github.com".to_string()]
    }

    fn loopback_hosts() -> Vec<String> {
        vec!["127.0.0.1".to_string()]
    }

    #[test]
    fn test_download_progress_calculation() {
        let progress = DownloadProgress::new(50, Some(100));
        assert_eq!(progress.bytes_downloaded, 50);
        assert_eq!(progress.total_bytes, Some(100));
        assert_eq!(progress.percent, Some(50.0));

        let progress_no_total = DownloadProgress::new(50, None);
        assert_eq!(progress_no_total.percent, None);

        let progress_zero_total = DownloadProgress::new(0, Some(0));
        assert_eq!(progress_zero_total.percent, Some(0.0));
    }

    #[test]
    fn test_validate_url_https_required() {
        assert!(validate_url("http://github.com/file.tar.gz", &github_hosts()).is_err());
        assert!(validate_url("https://github.com/file.tar.gz", &github_hosts()).is_ok());
    }

    #[test]
    fn test_validate_url_allowed_domains() {
        let hosts = vec!["github.com".to_string()];
        assert!(validate_url(
            "https://github.com/GrantFBarnes/sqlfmt/releases/download/v1/a.tar.gz",
            &hosts
        )
        .is_ok());
        assert!(validate_url("https://api.github.com/repos/x/y", &hosts).is_ok());

        assert!(validate_url("https://evil.com/malware.tar.gz", &hosts).is_err());
        assert!(validate_url("https://github.com.evil.org/fake.tar.gz", &hosts).is_err());
    }

    #[test]
    fn test_validate_url_loopback_http() {
        assert!(validate_url("http://127.0.0.1:8080/a.tar.gz", &loopback_hosts()).is_ok());
        // Loopback is still subject to the allow-list
        assert!(validate_url("http://127.0.0.1:8080/a.tar.gz", &github_hosts()).is_err());
    }

    #[test]
    fn test_validate_url_invalid() {
        assert!(validate_url("not-a-url", &github_hosts()).is_err());
        assert!(validate_url("", &github_hosts()).is_err());
        assert!(validate_url("file:///etc/passwd", &github_hosts()).is_err());
    }

    #[tokio::test]
    async fn test_download_file_streams_to_disk() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 64 * 1024];
        let mock = server
            .mock("GET", "/asset.tar.gz")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("asset.tar.gz");
        let last_seen = Arc::new(AtomicU64::new(0));
        let seen = last_seen.clone();

        let client = reqwest::Client::new();
        let written = download_file(
            &client,
            &format!("{}/asset.tar.gz", server.url()),
            &loopback_hosts(),
            &dest,
            &move |p: DownloadProgress| seen.store(p.bytes_downloaded, Ordering::SeqCst),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(written, body.len() as u64);
        assert_eq!(last_seen.load(Ordering::SeqCst), body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_file_rejects_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("missing.tar.gz");

        let client = reqwest::Client::new();
        let result = download_file(
            &client,
            &format!("{}/missing.tar.gz", server.url()),
            &loopback_hosts(),
            &dest,
            &|_| {},
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("404"), "unexpected error: {}", err);
        assert!(!dest.exists());
    }
}
