//! Provisioner configuration: release endpoints, timeouts and policies.

use std::time::Duration;

use crate::provision::ReinstallFailurePolicy;

/// Release index returning the newest sqlfmt release as JSON.
pub const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/GrantFBarnes/sqlfmt/releases/latest";

/// Base URL for release assets; `/<tag>/<archive>` is appended.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://github.com/GrantFBarnes/sqlfmt/releases/download";

/// Timeout for establishing HTTP connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for a single HTTP request, archive download included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `sqlfmt --version`.
pub const DEFAULT_VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`crate::provision::Provisioner`] and the release client.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Release index endpoint (GitHub "latest release" API).
    pub release_api_url: String,
    /// Base URL of downloadable release assets.
    pub download_base_url: String,
    /// Hosts the release client may contact (subdomains included).
    pub allowed_hosts: Vec<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub version_query_timeout: Duration,
    /// Behavior when updating an existing binary fails.
    pub reinstall_failure_policy: ReinstallFailurePolicy,
    /// Skip the release check when the last one for a root is younger than
    /// this. `None` checks on every call.
    pub update_check_interval: Option<Duration>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            release_api_url: DEFAULT_RELEASE_API_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            allowed_hosts: vec!["github.com".to_string()],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            version_query_timeout: DEFAULT_VERSION_QUERY_TIMEOUT,
            reinstall_failure_policy: ReinstallFailurePolicy::default(),
            update_check_interval: None,
        }
    }
}

impl ProvisionerConfig {
    /// Points the release client at another server, e.g. a mirror.
    ///
    /// The server's host is added to the allow-list.
    pub fn with_release_server(mut self, api_url: String, download_base_url: String) -> Self {
        for raw in [&api_url, &download_base_url] {
            if let Some(host) = url::Url::parse(raw)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
            {
                if !self.allowed_hosts.contains(&host) {
                    self.allowed_hosts.push(host);
                }
            }
        }
        self.release_api_url = api_url;
        self.download_base_url = download_base_url;
        self
    }

    pub fn with_reinstall_failure_policy(mut self, policy: ReinstallFailurePolicy) -> Self {
        self.reinstall_failure_policy = policy;
        self
    }

    pub fn with_update_check_interval(mut self, interval: Duration) -> Self {
        self.update_check_interval = Some(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the download URL of `archive` for release `tag`.
    pub fn archive_url(&self, tag: &str, archive: &str) -> String {
        format!(
            "{}/{}/{}",
            self.download_base_url.trim_end_matches('/'),
            tag,
            archive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_github() {
        let config = ProvisionerConfig::default();
        assert!(config.release_api_url.ends_with("/releases/latest"));
        assert_eq!(config.allowed_hosts, vec!["github.com".to_string()]);
        assert_eq!(
            config.reinstall_failure_policy,
            ReinstallFailurePolicy::KeepExisting
        );
        assert!(config.update_check_interval.is_none());
    }

    #[test]
    fn test_archive_url_template() {
        let config = ProvisionerConfig::default();
        assert_eq!(
            config.archive_url("v1.2.3", "sqlfmt-x86_64-unknown-linux-gnu.tar.gz"),
            "https://github.com/GrantFBarnes/sqlfmt/releases/download/v1.2.3/sqlfmt-x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn test_with_release_server_extends_allow_list() {
        let config = ProvisionerConfig::default().with_release_server(
            "http://127.0.0.1:9000/latest".to_string(),
            "http://127.0.0.1:9000/download/".to_string(),
        );
        assert!(config.allowed_hosts.contains(&"127.0.0.1".to_string()));
        assert_eq!(
            config.allowed_hosts.iter().filter(|h| *h == "127.0.0.1").count(),
            1
        );
        assert_eq!(
            config.archive_url("v1", "a.tar.gz"),
            "http://127.0.0.1:9000/download/v1/a.tar.gz"
        );
    }
}
