//! Client configuration.

use url::Url;

use crate::error::{SyncError, SyncResult};

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost:8080/projeto5backend";

/// Where the backend lives. Sockets and REST share the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host and optional context path, without scheme.
    pub host: String,
    /// Use `wss`/`https` instead of `ws`/`http`.
    pub secure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            secure: false,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    fn base(&self, scheme: &str, suffix: &str) -> SyncResult<Url> {
        let host = self
            .host
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_start_matches("ws://")
            .trim_start_matches("wss://")
            .trim_end_matches('/');
        if host.is_empty() {
            return Err(SyncError::config("host is empty"));
        }
        Url::parse(&format!("{scheme}://{host}/{suffix}"))
            .map_err(|e| SyncError::InvalidEndpoint(format!("{host}: {e}")))
    }

    /// Base for socket endpoints, always ending in `/`.
    pub fn ws_base(&self) -> SyncResult<Url> {
        self.base(if self.secure { "wss" } else { "ws" }, "")
    }

    /// Base for REST calls (`.../rest/`).
    pub fn http_base(&self) -> SyncResult<Url> {
        self.base(if self.secure { "https" } else { "http" }, "rest/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bases() {
        let config = ClientConfig::default();
        assert_eq!(
            config.ws_base().unwrap().as_str(),
            "ws://localhost:8080/projeto5backend/"
        );
        assert_eq!(
            config.http_base().unwrap().as_str(),
            "http://localhost:8080/projeto5backend/rest/"
        );
    }

    #[test]
    fn test_secure_and_scheme_stripping() {
        let config = ClientConfig::new("https://board.example.org/", true);
        assert_eq!(config.ws_base().unwrap().as_str(), "wss://board.example.org/");
        assert_eq!(
            config.http_base().unwrap().as_str(),
            "https://board.example.org/rest/"
        );
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let config = ClientConfig::new("  ", false);
        assert!(matches!(config.ws_base(), Err(SyncError::Config(_))));
    }
}
