//! Provisioner: keeps an up-to-date sqlfmt binary under an install root.
//!
//! The `Provisioner` is the main entry point of the provisioning layer. It
//! coordinates the release source, downloader, extractor and version query,
//! and serializes installs per root so concurrent callers never race on the
//! same archive or staging directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

use super::downloader::DownloadProgress;
use super::extractor::{extract_tar_gz, locate_binary, make_executable};
use super::paths;
use super::release::{GitHubReleases, ProgressFn, ReleaseSource};
use super::types::{
    BinaryStatus, InstalledBinary, PlatformTarget, ProvisionError, ProvisioningOutcome,
    ReinstallFailurePolicy, ReleaseTag,
};
use super::version::query_version;
use crate::config::ProvisionerConfig;

// ============================================================================
// Binary Lease
// ============================================================================

/// A ready binary plus a shared guard on its install root.
///
/// While any lease for a root is alive, the provisioner will not swap the
/// binary under that root.
#[derive(Debug)]
pub struct BinaryLease {
    path: PathBuf,
    _guard: OwnedRwLockReadGuard<()>,
}

impl BinaryLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Per-root State
// ============================================================================

#[derive(Debug, Default)]
struct CheckState {
    /// When the release check last confirmed the installed binary.
    last_check: Option<(Instant, ReleaseTag)>,
}

#[derive(Debug, Default)]
struct RootSlot {
    /// Held for the whole of `ensure_binary`.
    install: AsyncMutex<CheckState>,
    /// Read side held by running invocations, write side by the final swap.
    in_use: Arc<RwLock<()>>,
}

// ============================================================================
// Provisioner
// ============================================================================

/// Ensures a usable, up-to-date sqlfmt binary exists under an install root.
///
/// This is thread-safe and can be shared across async tasks.
pub struct Provisioner {
    source: Arc<dyn ReleaseSource>,
    platform: PlatformTarget,
    config: ProvisionerConfig,
    slots: Mutex<HashMap<PathBuf, Arc<RootSlot>>>,
    progress: Arc<ProgressFn>,
}

impl Provisioner {
    /// Creates a provisioner for the current platform backed by GitHub releases.
    ///
    /// Fails with [`ProvisionError::UnsupportedPlatform`] on hosts without a
    /// published build.
    pub fn new(config: ProvisionerConfig) -> Result<Self, ProvisionError> {
        let platform = PlatformTarget::detect()?;
        let source = GitHubReleases::new(config.clone())?;

        info!(%platform, "Provisioner initialized");

        Ok(Self::with_source(config, platform, Arc::new(source)))
    }

    /// Creates a provisioner with an explicit platform and release source.
    pub fn with_source(
        config: ProvisionerConfig,
        platform: PlatformTarget,
        source: Arc<dyn ReleaseSource>,
    ) -> Self {
        Self {
            source,
            platform,
            config,
            slots: Mutex::new(HashMap::new()),
            progress: Arc::new(log_progress),
        }
    }

    /// Replaces the download progress callback.
    pub fn with_progress<F>(mut self, progress_cb: F) -> Self
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.progress = Arc::new(progress_cb);
        self
    }

    /// Path where the binary lives under `root`.
    pub fn binary_path(&self, root: &Path) -> PathBuf {
        paths::binary_path(root, self.platform)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Reports what is installed under `root`. Never touches the network.
    pub async fn status(&self, root: &Path) -> BinaryStatus {
        match self.installed(root).await {
            Some(InstalledBinary { path, version }) => BinaryStatus::Installed { path, version },
            None => BinaryStatus::NotInstalled,
        }
    }

    /// Returns the binary under `root` and its self-reported version.
    pub async fn installed(&self, root: &Path) -> Option<InstalledBinary> {
        let path = self.binary_path(root);
        if !is_file(&path).await {
            return None;
        }

        let version = query_version(&path, self.config.version_query_timeout).await;
        Some(InstalledBinary { path, version })
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Ensures a usable binary exists under `root`, installing or updating
    /// it as needed.
    ///
    /// Calls for the same root are serialized: a caller arriving while an
    /// install is running waits for it and then finds the fresh binary.
    pub async fn ensure_binary(&self, root: &Path) -> ProvisioningOutcome {
        let slot = self.slot(root);
        let mut state = slot.install.lock().await;

        match self.ensure_locked(root, &slot, &mut state).await {
            Ok(path) => ProvisioningOutcome::Ready(path),
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Provisioning failed");
                ProvisioningOutcome::Failed(e)
            }
        }
    }

    /// Ensures the binary and returns it with a guard that blocks binary
    /// swaps under `root` until the lease is dropped.
    pub async fn lease(&self, root: &Path) -> Result<BinaryLease, ProvisionError> {
        let path = self.ensure_binary(root).await.into_result()?;
        let guard = self.slot(root).in_use.clone().read_owned().await;

        Ok(BinaryLease {
            path,
            _guard: guard,
        })
    }

    async fn ensure_locked(
        &self,
        root: &Path,
        slot: &RootSlot,
        state: &mut CheckState,
    ) -> Result<PathBuf, ProvisionError> {
        let binary = self.binary_path(root);

        if !is_file(&binary).await {
            info!(path = %binary.display(), "sqlfmt not installed, fetching latest release");
            // Nothing to fall back to: an unavailable index is fatal here.
            let tag = self.source.latest_tag().await?;
            self.install(root, slot, &tag).await?;
            state.last_check = Some((Instant::now(), tag));
            return Ok(binary);
        }

        if let (Some(interval), Some((checked_at, tag))) =
            (self.config.update_check_interval, &state.last_check)
        {
            if checked_at.elapsed() < interval {
                debug!(%tag, "Release checked recently, skipping update check");
                return Ok(binary);
            }
        }

        let tag = match self.source.latest_tag().await {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, "Skipping update check, using installed sqlfmt");
                return Ok(binary);
            }
        };

        let installed = query_version(&binary, self.config.version_query_timeout).await;
        if installed.as_deref().is_some_and(|v| tag.matches_version(v)) {
            debug!(%tag, "sqlfmt is up to date");
            state.last_check = Some((Instant::now(), tag));
            return Ok(binary);
        }

        info!(installed = ?installed, latest = %tag, "Updating sqlfmt");
        match self.install(root, slot, &tag).await {
            Ok(()) => {
                state.last_check = Some((Instant::now(), tag));
                Ok(binary)
            }
            Err(e) => match self.config.reinstall_failure_policy {
                ReinstallFailurePolicy::KeepExisting => {
                    warn!(error = %e, "Update failed, keeping installed sqlfmt");
                    Ok(binary)
                }
                ReinstallFailurePolicy::Fail => Err(e),
            },
        }
    }

    /// Downloads release `tag`, extracts it to a staging directory and moves
    /// the binary into place. The existing binary is only replaced once the
    /// new one has been fully extracted.
    async fn install(
        &self,
        root: &Path,
        slot: &RootSlot,
        tag: &ReleaseTag,
    ) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            ProvisionError::DownloadFailed(format!(
                "Failed to create directory {}: {}",
                root.display(),
                e
            ))
        })?;

        self.sweep_transient(root).await;

        let archive_path = paths::archive_download_path(root, self.platform);
        let staging = paths::staging_dir(root);

        let result = self
            .download_and_swap(root, slot, tag, &archive_path, &staging)
            .await;

        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up archive {}: {}", archive_path.display(), e);
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up staging dir {}: {}", staging.display(), e);
            }
        }

        if result.is_ok() {
            info!(%tag, root = %root.display(), "sqlfmt installed successfully");
        }
        result
    }

    /// Removes downloads and staging directories left behind by attempts
    /// that never reached their own cleanup (cancelled or crashed).
    ///
    /// Callers hold the root's install mutex, so no live attempt owns them.
    async fn sweep_transient(&self, root: &Path) {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {} for leftovers: {}", root.display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !paths::is_transient_name(&name.to_string_lossy(), self.platform) {
                continue;
            }

            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let removed = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };

            match removed {
                Ok(()) => debug!(path = %path.display(), "Removed leftover install file"),
                Err(e) => warn!("Failed to remove leftover {}: {}", path.display(), e),
            }
        }
    }

    async fn download_and_swap(
        &self,
        root: &Path,
        slot: &RootSlot,
        tag: &ReleaseTag,
        archive_path: &Path,
        staging: &Path,
    ) -> Result<(), ProvisionError> {
        let archive_name = self.platform.archive_file_name();
        let bytes = self
            .source
            .download_archive(tag, archive_name, archive_path, self.progress.as_ref())
            .await?;
        debug!(bytes, archive = archive_name, "Archive downloaded");

        let binary_name = self.platform.binary_file_name();
        let archive = archive_path.to_path_buf();
        let staging_dir = staging.to_path_buf();

        let staged = tokio::task::spawn_blocking(move || -> anyhow::Result<PathBuf> {
            extract_tar_gz(&archive, &staging_dir)?;
            let found = locate_binary(&staging_dir, binary_name).ok_or_else(|| {
                anyhow::anyhow!("archive does not contain {}", binary_name)
            })?;
            make_executable(&found)?;
            Ok(found)
        })
        .await
        .map_err(|e| ProvisionError::ExtractionFailed(format!("extraction task failed: {}", e)))?
        .map_err(|e| ProvisionError::ExtractionFailed(format!("{:#}", e)))?;

        let target = self.binary_path(root);
        let _swap = slot.in_use.write().await;
        tokio::fs::rename(&staged, &target).await.map_err(|e| {
            ProvisionError::ExtractionFailed(format!(
                "Failed to move {} to {}: {}",
                staged.display(),
                target.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn slot(&self, root: &Path) -> Arc<RootSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(root.to_path_buf()).or_default().clone()
    }
}

fn log_progress(progress: DownloadProgress) {
    if let Some(percent) = progress.percent {
        debug!("sqlfmt download progress: {:.1}%", percent);
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
