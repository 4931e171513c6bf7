// Router HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction, capability
// gating, and `{ success, message, data }` envelope unwrapping. Auth and
// control directives live in sibling files as inherent methods.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::router::models::{RouterBrand, RouterCapability, RouterResponse};
use crate::transport::TransportConfig;

/// Raw HTTP client for a router's JSON control plane.
///
/// The endpoint is the API root (e.g. `http://192.168.1.1/api`); every
/// directive is a `POST` relative to it. Capabilities are supplied by
/// configuration, not discovered, and gate which directives may be sent.
pub struct RouterClient {
    http: reqwest::Client,
    endpoint: Url,
    brand: RouterBrand,
    capabilities: Vec<RouterCapability>,
    timeout: Duration,
}

impl RouterClient {
    /// Create a client with its own session cookie jar.
    pub fn new(
        endpoint: Url,
        brand: RouterBrand,
        capabilities: Vec<RouterCapability>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoint,
            brand,
            capabilities,
            timeout: transport.timeout,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        endpoint: Url,
        brand: RouterBrand,
        capabilities: Vec<RouterCapability>,
    ) -> Self {
        Self {
            http,
            endpoint,
            brand,
            capabilities,
            timeout: TransportConfig::default().timeout,
        }
    }

    pub fn brand(&self) -> RouterBrand {
        self.brand
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The configured feature set.
    pub fn capabilities(&self) -> &[RouterCapability] {
        &self.capabilities
    }

    pub fn supports(&self, capability: RouterCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub(crate) fn require(
        &self,
        capability: RouterCapability,
        name: &'static str,
    ) -> Result<(), Error> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(Error::UnsupportedCapability(name))
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{endpoint}/{path}`, preserving any path prefix on the endpoint.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// POST a JSON body and unwrap the envelope, returning `data`.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<Option<T>, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_envelope(resp).await
    }

    /// GET and unwrap the envelope, returning `data`.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_envelope(resp).await
    }

    /// POST without caring about the response body.
    pub(crate) async fn post_empty(&self, url: Url) -> Result<(), Error> {
        debug!("POST {}", url);

        self.http
            .post(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        Ok(())
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(e)
        }
    }

    /// Parse the `{ success, message, data }` envelope.
    ///
    /// HTTP 401 maps to [`Error::SessionExpired`]; `success: false` maps to
    /// [`Error::Rejected`] carrying the router's message.
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<Option<T>, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        let envelope: RouterResponse<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("{e} (body preview: {:?})", preview(&body)),
                body: body.clone(),
            })?;

        if envelope.success {
            Ok(envelope.data)
        } else {
            Err(Error::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "directive refused".into()),
            })
        }
    }
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
