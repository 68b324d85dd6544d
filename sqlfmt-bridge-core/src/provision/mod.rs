//! Provisioning of the sqlfmt binary.
//!
//! This module makes sure a usable, up-to-date sqlfmt executable exists under
//! an install root before anything tries to run it. Releases are published on
//! GitHub as one gzip-compressed tarball per platform.
//!
//! # Architecture
//!
//! - `types`: Core types (PlatformTarget, ReleaseTag, ProvisioningOutcome, errors)
//! - `paths`: Install root and transient path resolution
//! - `release`: Release metadata client and archive retrieval (`ReleaseSource`)
//! - `downloader`: Streaming download with progress reporting
//! - `extractor`: tar.gz extraction
//! - `version`: `--version` query against an installed binary
//! - `manager`: `Provisioner`, the orchestration entry point
//!
//! # Example
//!
//! ```ignore
//! use sqlfmt_bridge_core::config::ProvisionerConfig;
//! use sqlfmt_bridge_core::provision::{paths, Provisioner};
//!
//! let provisioner = Provisioner::new(ProvisionerConfig::default())?;
//! let binary = provisioner
//!     .ensure_binary(&paths::get_default_root())
//!     .await
//!     .into_result()?;
//! println!("sqlfmt ready at {}", binary.display());
//! ```

pub mod downloader;
pub mod extractor;
pub mod manager;
pub mod paths;
pub mod release;
pub mod types;
pub mod version;

pub use downloader::DownloadProgress;
pub use manager::{BinaryLease, Provisioner};
pub use release::{GitHubReleases, ProgressFn, ReleaseSource};
pub use types::{
    BinaryStatus, InstalledBinary, PlatformTarget, ProvisionError, ProvisioningOutcome,
    ReinstallFailurePolicy, ReleaseTag,
};
pub use version::query_version;
