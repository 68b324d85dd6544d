//! Core types for sqlfmt provisioning.
//!
//! This module defines the foundational types used across the provisioning
//! layer: platform resolution, release tags, binary status, provisioning
//! outcomes, and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while provisioning the sqlfmt binary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// The host OS/architecture has no published sqlfmt build.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// The release index could not be queried.
    #[error("Release metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// The release archive could not be downloaded or written to disk.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The archive could not be unpacked or did not contain the binary.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
}

// ============================================================================
// Platform Resolution
// ============================================================================

/// A platform with a published sqlfmt build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformTarget {
    WindowsX64,
    MacosArm64,
    LinuxX64,
}

impl PlatformTarget {
    /// Returns all supported targets.
    pub fn all() -> &'static [PlatformTarget] {
        &[Self::WindowsX64, Self::MacosArm64, Self::LinuxX64]
    }

    /// Resolves a target from an OS and architecture name, using the values
    /// of `std::env::consts::{OS, ARCH}`.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, ProvisionError> {
        match (os, arch) {
            ("windows", "x86_64") => Ok(Self::WindowsX64),
            ("macos", "aarch64") => Ok(Self::MacosArm64),
            ("linux", "x86_64") => Ok(Self::LinuxX64),
            _ => Err(ProvisionError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    /// Detects the current platform at runtime.
    pub fn detect() -> Result<Self, ProvisionError> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// File name of the executable inside the install root.
    pub fn binary_file_name(&self) -> &'static str {
        match self {
            Self::WindowsX64 => "sqlfmt.exe",
            Self::MacosArm64 | Self::LinuxX64 => "sqlfmt",
        }
    }

    /// File name of the release asset for this platform.
    pub fn archive_file_name(&self) -> &'static str {
        match self {
            Self::WindowsX64 => "sqlfmt-x86_64-pc-windows-msvc.tar.gz",
            Self::MacosArm64 => "sqlfmt-aarch64-apple-darwin.tar.gz",
            Self::LinuxX64 => "sqlfmt-x86_64-unknown-linux-gnu.tar.gz",
        }
    }

    /// Returns a human-readable description of the platform.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::WindowsX64 => "Windows (x86_64)",
            Self::MacosArm64 => "macOS (Apple Silicon)",
            Self::LinuxX64 => "Linux (x86_64)",
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Release Tags
// ============================================================================

/// Version identifier published with a release, e.g. `v1.2.3`.
///
/// Tags are opaque: the only supported comparison is equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether a binary's self-reported version names this release.
    ///
    /// sqlfmt prints its crate version (`1.2.3`) while releases are tagged
    /// `v1.2.3`, so a single leading `v` is ignored on both sides.
    pub fn matches_version(&self, version: &str) -> bool {
        strip_v(self.0.trim()) == strip_v(version.trim())
    }
}

fn strip_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Installed Binary & Status
// ============================================================================

/// A binary found on disk together with the version it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    pub path: PathBuf,
    /// `None` when the version query failed.
    pub version: Option<String>,
}

/// Installation status of the sqlfmt binary under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryStatus {
    /// No binary at the expected path.
    NotInstalled,
    /// A binary exists.
    Installed {
        path: PathBuf,
        /// Self-reported version, if the binary answered the version query.
        version: Option<String>,
    },
    /// sqlfmt is not published for this platform.
    UnsupportedPlatform,
}

impl BinaryStatus {
    /// Returns true if a binary is present.
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

impl fmt::Display for BinaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not installed"),
            Self::Installed {
                path,
                version: Some(version),
            } => write!(f, "installed ({}) at {}", version, path.display()),
            Self::Installed {
                path,
                version: None,
            } => write!(f, "installed (unknown version) at {}", path.display()),
            Self::UnsupportedPlatform => write!(f, "unsupported platform"),
        }
    }
}

// ============================================================================
// Provisioning Outcome
// ============================================================================

/// Terminal result of a provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// A usable binary exists at this path.
    Ready(PathBuf),
    /// No usable binary is available.
    Failed(ProvisionError),
}

impl ProvisioningOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Returns the binary path when ready.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Ready(path) => Some(path),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<PathBuf, ProvisionError> {
        match self {
            Self::Ready(path) => Ok(path),
            Self::Failed(err) => Err(err),
        }
    }
}

/// What to do when updating an existing binary fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinstallFailurePolicy {
    /// Keep using the previously installed binary.
    #[default]
    KeepExisting,
    /// Report the failure even though a binary exists.
    Fail,
}
