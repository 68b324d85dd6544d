//! Release metadata and archive retrieval.
//!
//! [`ReleaseSource`] is the seam between the provisioner and the network.
//! [`GitHubReleases`] is the production implementation; tests substitute
//! in-memory sources.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::downloader::{download_file, validate_url, DownloadProgress};
use super::types::{ProvisionError, ReleaseTag};
use crate::config::ProvisionerConfig;

/// Progress callback shared across the provisioning layer.
pub type ProgressFn = dyn Fn(DownloadProgress) + Send + Sync;

/// Where releases come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetches the tag of the newest release.
    ///
    /// Any failure is reported as [`ProvisionError::MetadataUnavailable`].
    async fn latest_tag(&self) -> Result<ReleaseTag, ProvisionError>;

    /// Downloads the archive `archive_name` of release `tag` to `dest`.
    ///
    /// Returns the number of bytes written. Any failure is reported as
    /// [`ProvisionError::DownloadFailed`].
    async fn download_archive(
        &self,
        tag: &ReleaseTag,
        archive_name: &str,
        dest: &Path,
        progress: &ProgressFn,
    ) -> Result<u64, ProvisionError>;
}

/// Subset of the GitHub release JSON we rely on.
#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Release source backed by the GitHub releases API.
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    client: reqwest::Client,
    config: ProvisionerConfig,
}

impl GitHubReleases {
    pub fn new(config: ProvisionerConfig) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sqlfmt-bridge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProvisionError::MetadataUnavailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    async fn fetch_latest(&self) -> anyhow::Result<ReleaseTag> {
        let url = validate_url(&self.config.release_api_url, &self.config.allowed_hosts)?;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("release index returned status {}", status.as_u16());
        }

        let release: LatestRelease = response.json().await?;
        let tag = release.tag_name.trim();
        if tag.is_empty() {
            anyhow::bail!("release index returned an empty tag");
        }

        Ok(ReleaseTag::new(tag))
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleases {
    async fn latest_tag(&self) -> Result<ReleaseTag, ProvisionError> {
        debug!(url = %self.config.release_api_url, "Fetching latest release tag");
        match self.fetch_latest().await {
            Ok(tag) => {
                info!(%tag, "Latest sqlfmt release");
                Ok(tag)
            }
            Err(e) => {
                warn!(error = %e, "Release metadata unavailable");
                Err(ProvisionError::MetadataUnavailable(e.to_string()))
            }
        }
    }

    async fn download_archive(
        &self,
        tag: &ReleaseTag,
        archive_name: &str,
        dest: &Path,
        progress: &ProgressFn,
    ) -> Result<u64, ProvisionError> {
        let url = self.config.archive_url(tag.as_str(), archive_name);
        download_file(
            &self.client,
            &url,
            &self.config.allowed_hosts,
            dest,
            progress,
        )
        .await
        .map_err(|e| ProvisionError::DownloadFailed(format!("{:#}", e)))
    }
}
