//! Canvas host allowlist.
//!
//! The access token is bearer-style, so the set of hosts it may ever be
//! sent to is fixed in code. A base URL that is not an exact match for an
//! allowlisted instance is rejected outright, never "tried anyway".
//! Adding an institution is a code change.

use thiserror::Error;
use url::Url;

/// One trusted Canvas instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasHost {
    /// Stable key used in API requests (e.g. `"qut"`).
    pub key: String,
    /// Human-readable institution name.
    pub label: String,
    /// Exact base URL of the instance, no trailing slash.
    pub base_url: String,
}

impl CanvasHost {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            base_url: base_url.into(),
        }
    }
}

/// The institutions this deployment is willing to talk to.
const CANVAS_HOSTS: &[(&str, &str, &str)] = &[
    (
        "qut",
        "Queensland University of Technology",
        "https://canvas.qut.edu.au",
    ),
    (
        "griffith",
        "Griffith University",
        "https://learning.secure.griffith.edu.au",
    ),
    (
        "swinburne",
        "Swinburne University of Technology",
        "https://swinburne.instructure.com",
    ),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowlistError {
    #[error("host '{0}' is not on the allowlist")]
    HostNotAllowed(String),
    #[error("unknown institution key '{0}'")]
    UnknownKey(String),
}

/// Fixed table of trusted Canvas instances, injected into the components
/// that perform external calls so tests can substitute their own table.
#[derive(Debug, Clone)]
pub struct HostAllowlist {
    hosts: Vec<CanvasHost>,
}

impl HostAllowlist {
    /// The compiled-in production table.
    pub fn builtin() -> Self {
        Self {
            hosts: CANVAS_HOSTS
                .iter()
                .map(|(key, label, base_url)| CanvasHost::new(*key, *label, *base_url))
                .collect(),
        }
    }

    /// An allowlist over an explicit table (tests).
    pub fn new(hosts: Vec<CanvasHost>) -> Self {
        Self { hosts }
    }

    /// All entries, for listing institutions to clients.
    pub fn hosts(&self) -> &[CanvasHost] {
        &self.hosts
    }

    /// Look up an instance by its stable key.
    pub fn by_key(&self, key: &str) -> Result<&CanvasHost, AllowlistError> {
        self.hosts
            .iter()
            .find(|host| host.key == key)
            .ok_or_else(|| AllowlistError::UnknownKey(key.to_string()))
    }

    /// Whether `base_url` is exactly one of the table's base URLs.
    ///
    /// Comparison is on normalized origin (scheme, host, port) plus path,
    /// so `https://canvas.qut.edu.au/` matches the slashless table entry
    /// but `https://canvas.qut.edu.au.evil.com` and prefix tricks do not.
    pub fn is_allowed(&self, base_url: &str) -> bool {
        let Ok(candidate) = Url::parse(base_url) else {
            return false;
        };

        self.hosts.iter().any(|host| {
            let Ok(allowed) = Url::parse(&host.base_url) else {
                return false;
            };
            candidate.scheme() == allowed.scheme()
                && candidate.host_str() == allowed.host_str()
                && candidate.port_or_known_default() == allowed.port_or_known_default()
                && candidate.path().trim_end_matches('/') == allowed.path().trim_end_matches('/')
                && candidate.query().is_none()
                && candidate.fragment().is_none()
        })
    }

    /// Like [`is_allowed`](Self::is_allowed) but terminal on rejection.
    pub fn require(&self, base_url: &str) -> Result<(), AllowlistError> {
        if self.is_allowed(base_url) {
            Ok(())
        } else {
            Err(AllowlistError::HostNotAllowed(base_url.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_allowlist() -> HostAllowlist {
        HostAllowlist::new(vec![CanvasHost::new(
            "qut",
            "Queensland University of Technology",
            "https://canvas.qut.edu.au",
        )])
    }

    #[test]
    fn exact_base_url_is_allowed() {
        let allowlist = test_allowlist();
        assert!(allowlist.is_allowed("https://canvas.qut.edu.au"));
        assert!(allowlist.is_allowed("https://canvas.qut.edu.au/"));
    }

    #[test]
    fn unlisted_host_is_rejected() {
        let allowlist = test_allowlist();
        assert!(!allowlist.is_allowed("https://canvas.example.edu"));
    }

    #[test]
    fn prefix_and_substring_tricks_are_rejected() {
        let allowlist = test_allowlist();
        assert!(!allowlist.is_allowed("https://canvas.qut.edu.au.evil.com"));
        assert!(!allowlist.is_allowed("https://evil.com/canvas.qut.edu.au"));
        assert!(!allowlist.is_allowed("https://canvas.qut.edu.au?redirect=evil"));
    }

    #[test]
    fn scheme_downgrade_is_rejected() {
        let allowlist = test_allowlist();
        assert!(!allowlist.is_allowed("http://canvas.qut.edu.au"));
    }

    #[test]
    fn non_default_port_is_rejected() {
        let allowlist = test_allowlist();
        assert!(!allowlist.is_allowed("https://canvas.qut.edu.au:8443"));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let allowlist = test_allowlist();
        assert!(!allowlist.is_allowed("not a url"));
        assert!(!allowlist.is_allowed(""));
    }

    #[test]
    fn by_key_resolves_known_institutions() {
        let allowlist = test_allowlist();
        let host = allowlist.by_key("qut").unwrap();
        assert_eq!(host.base_url, "https://canvas.qut.edu.au");

        assert_eq!(
            allowlist.by_key("nowhere").unwrap_err(),
            AllowlistError::UnknownKey("nowhere".to_string())
        );
    }

    #[test]
    fn require_is_terminal_on_rejection() {
        let allowlist = test_allowlist();
        assert!(allowlist.require("https://canvas.qut.edu.au").is_ok());
        assert!(matches!(
            allowlist.require("https://elsewhere.edu"),
            Err(AllowlistError::HostNotAllowed(_))
        ));
    }

    #[test]
    fn builtin_table_parses() {
        for host in HostAllowlist::builtin().hosts() {
            assert!(Url::parse(&host.base_url).is_ok());
            assert!(!host.base_url.ends_with('/'));
        }
    }
}
