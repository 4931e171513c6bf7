// HTTP transport for router control planes.
//
// Router web UIs live on the LAN, usually behind plain HTTP or a
// self-signed certificate, and keep their session in a cookie. Clients
// built here always carry a cookie jar and never go through a proxy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::error::Error;

const USER_AGENT: &str = concat!("netwarden/", env!("CARGO_PKG_VERSION"));

/// Upper bound on TCP connect; a router that does not answer SYN within
/// this is treated as unreachable even when `timeout` is longer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How the router's certificate is checked.
#[derive(Debug, Clone)]
pub enum TlsMode {
    System,
    /// Trust the PEM bundle at this path in addition to the system store.
    CustomCa(PathBuf),
    /// Accept anything. The factory default for most consumer routers.
    DangerAcceptInvalid,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request deadline.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect_timeout(&self) -> Duration {
        self.timeout.min(CONNECT_TIMEOUT)
    }

    /// Build a client with a fresh session cookie jar.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .no_proxy()
            .cookie_provider(Arc::new(Jar::default()));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    Error::Tls(format!("cannot read CA bundle {}: {e}", path.display()))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| Error::Tls(format!("invalid CA bundle: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_client_builds() {
        assert!(TransportConfig::default().build_client().is_ok());
    }

    #[test]
    fn connect_timeout_never_exceeds_request_timeout() {
        let short = TransportConfig::default().with_timeout(Duration::from_secs(1));
        assert_eq!(short.connect_timeout(), Duration::from_secs(1));

        let long = TransportConfig::default().with_timeout(Duration::from_secs(30));
        assert_eq!(long.connect_timeout(), CONNECT_TIMEOUT);
    }

    #[test]
    fn missing_ca_bundle_is_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/ca.pem")),
            ..TransportConfig::default()
        };
        assert!(matches!(config.build_client(), Err(Error::Tls(_))));
    }
}
