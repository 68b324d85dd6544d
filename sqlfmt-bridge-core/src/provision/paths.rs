//! Path management for the provisioned sqlfmt binary.
//!
//! Everything lives under a single install root. By default that is the
//! per-user data directory:
//!
//! - Linux: `~/.local/share/sqlfmt-bridge/bin/`
//! - macOS: `~/Library/Application Support/sqlfmt-bridge/bin/`
//! - Windows: `C:\Users\<User>\AppData\Roaming\sqlfmt-bridge\bin\`
//!
//! When no data directory can be determined, the OS temp directory is used
//! instead. During an install the root also holds the downloaded archive and
//! a staging directory, both removed once the install finishes.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::types::PlatformTarget;

/// Application directory name under the data (or temp) folder.
const APP_DIR: &str = "sqlfmt-bridge";

/// Prefix of the per-install staging directories.
const STAGING_PREFIX: &str = ".staging-";

// ============================================================================
// Path Resolution
// ============================================================================

/// Returns the base application directory.
///
/// e.g., `~/.local/share/sqlfmt-bridge/` on Linux
pub fn get_app_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Returns the default install root for the binary.
///
/// Path: `{data}/sqlfmt-bridge/bin/`
pub fn get_default_root() -> PathBuf {
    get_app_dir().join("bin")
}

/// Returns the default settings database path.
///
/// Path: `{data}/sqlfmt-bridge/settings.db`
pub fn get_settings_db_path() -> PathBuf {
    get_app_dir().join("settings.db")
}

/// Returns the platform-specific path of the binary under `root`.
///
/// - Linux/macOS: `{root}/sqlfmt`
/// - Windows: `{root}/sqlfmt.exe`
pub fn binary_path(root: &Path, platform: PlatformTarget) -> PathBuf {
    root.join(platform.binary_file_name())
}

/// Returns a fresh path for a downloaded archive under `root`.
///
/// The random component keeps an abandoned download from a crashed process
/// from being mistaken for the current one.
pub fn archive_download_path(root: &Path, platform: PlatformTarget) -> PathBuf {
    root.join(format!(
        "{}.{}.download",
        platform.archive_file_name(),
        Uuid::new_v4().simple()
    ))
}

/// Returns a fresh staging directory path under `root`.
pub fn staging_dir(root: &Path) -> PathBuf {
    root.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()))
}

/// Whether `name` is a download or staging entry left in a root by an
/// install attempt.
pub fn is_transient_name(name: &str, platform: PlatformTarget) -> bool {
    if name.starts_with(STAGING_PREFIX) {
        return true;
    }
    name.strip_prefix(platform.archive_file_name())
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| rest.ends_with(".download"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir_contains_name() {
        let dir = get_app_dir();
        assert!(dir.ends_with(APP_DIR), "unexpected app dir: {}", dir.display());
    }

    #[test]
    fn test_default_root_is_under_app_dir() {
        let root = get_default_root();
        assert!(root.starts_with(get_app_dir()));
        assert!(root.ends_with("bin"));
    }

    #[test]
    fn test_settings_db_path() {
        let db = get_settings_db_path();
        assert!(db.starts_with(get_app_dir()));
        assert!(db.ends_with("settings.db"));
    }

    #[test]
    fn test_binary_path_per_platform() {
        let root = Path::new("/opt/fmt");
        assert_eq!(
            binary_path(root, PlatformTarget::LinuxX64),
            PathBuf::from("/opt/fmt/sqlfmt")
        );
        assert_eq!(
            binary_path(root, PlatformTarget::WindowsX64),
            PathBuf::from("/opt/fmt/sqlfmt.exe")
        );
    }

    #[test]
    fn test_transient_paths_are_unique_and_under_root() {
        let root = Path::new("/opt/fmt");

        let a = archive_download_path(root, PlatformTarget::LinuxX64);
        let b = archive_download_path(root, PlatformTarget::LinuxX64);
        assert_ne!(a, b);
        assert!(a.starts_with(root));
        assert!(a
            .to_string_lossy()
            .contains("sqlfmt-x86_64-unknown-linux-gnu.tar.gz"));

        let s1 = staging_dir(root);
        let s2 = staging_dir(root);
        assert_ne!(s1, s2);
        assert!(s1.starts_with(root));
        assert!(s1
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(STAGING_PREFIX));
    }

    #[test]
    fn test_is_transient_name() {
        let platform = PlatformTarget::LinuxX64;
        let archive = archive_download_path(Path::new("/r"), platform);
        let staging = staging_dir(Path::new("/r"));

        for path in [archive, staging] {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(is_transient_name(&name, platform), "{}", name);
        }

        assert!(!is_transient_name("sqlfmt", platform));
        assert!(!is_transient_name("sqlfmt-x86_64-unknown-linux-gnu.tar.gz", platform));
        assert!(!is_transient_name("notes.download", platform));
    }
}
