//! Configuration for sqlfmt-bridge.
//!
//! - `settings`: user-facing formatter options, persisted in SQLite
//! - `provisioner`: release endpoints, timeouts and update policy

mod provisioner;
mod settings;

pub use provisioner::{
    ProvisionerConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_BASE_URL,
    DEFAULT_RELEASE_API_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_VERSION_QUERY_TIMEOUT,
};
pub use settings::{FormatSettings, KeywordCase, SettingsError, DEFAULT_SPACE_COUNT};
