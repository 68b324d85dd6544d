//! sqlfmt-bridge Core Library
//!
//! Bridges a host (editor, CLI) to the external `sqlfmt` formatter:
//!
//! - Provisioning: detect the platform, fetch the newest release, install
//!   and update the binary under an install root
//! - Invocation: map settings to flags and pipe SQL through the binary
//! - Configuration: formatter settings persisted in SQLite
//!
//! The SQL formatting itself is done entirely by `sqlfmt`.

pub mod config;
pub mod db;
pub mod formatter;
pub mod invoke;
pub mod provision;

// Re-exports for convenience
pub use config::{FormatSettings, KeywordCase, ProvisionerConfig, SettingsError};
pub use db::Database;
pub use formatter::{FormatterError, SqlFormatter};
pub use invoke::{build_args, run_formatter, FormatError, Formatted};
pub use provision::{
    BinaryStatus, PlatformTarget, ProvisionError, Provisioner, ProvisioningOutcome, ReleaseTag,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
