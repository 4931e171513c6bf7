// Router control-plane session and block backend.
//
// Logs in lazily, keeps the session cookie, and re-authenticates once
// when the router reports the session expired.

use std::sync::Arc;

use async_trait::async_trait;
use netwarden_api::{RouterClient, TransportConfig};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::BlockBackend;
use crate::config::RouterProfile;
use crate::error::CoreError;
use crate::model::{Device, RouterStatus};

/// Run `$call` with a live session, logging in again once on expiry.
macro_rules! with_session {
    ($session:expr, |$client:ident| $call:expr) => {{
        $session.ensure_login().await?;
        let $client = &$session.client;
        match $call.await {
            Err(e) if e.is_auth_expired() => {
                debug!("router session expired; re-authenticating");
                $session.login().await?;
                $call.await
            }
            other => other,
        }
    }};
}

/// An authenticated connection to the configured router.
pub struct RouterSession {
    client: RouterClient,
    model: Option<String>,
    username: String,
    password: SecretString,
    logged_in: Mutex<bool>,
}

impl RouterSession {
    pub fn new(client: RouterClient, username: String, password: SecretString) -> Self {
        Self {
            client,
            model: None,
            username,
            password,
            logged_in: Mutex::new(false),
        }
    }

    pub fn from_profile(profile: &RouterProfile) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: profile.tls.clone(),
            ..TransportConfig::default()
        }
        .with_timeout(profile.timeout);
        let client = RouterClient::new(
            profile.url.clone(),
            profile.brand,
            profile.capabilities.clone(),
            &transport,
        )?;
        let mut session = Self::new(client, profile.username.clone(), profile.password.clone());
        session.model.clone_from(&profile.model);
        Ok(session)
    }

    async fn login(&self) -> Result<(), netwarden_api::Error> {
        let mut logged_in = self.logged_in.lock().await;
        *logged_in = false;
        self.client.login(&self.username, &self.password).await?;
        *logged_in = true;
        Ok(())
    }

    async fn ensure_login(&self) -> Result<(), netwarden_api::Error> {
        let mut logged_in = self.logged_in.lock().await;
        if !*logged_in {
            self.client.login(&self.username, &self.password).await?;
            *logged_in = true;
        }
        Ok(())
    }

    pub async fn block_mac(&self, device: &Device) -> Result<(), CoreError> {
        let mac = device.mac.as_str();
        with_session!(self, |client| client.block_mac(mac))?;
        Ok(())
    }

    pub async fn unblock_mac(&self, device: &Device) -> Result<(), CoreError> {
        let mac = device.mac.as_str();
        with_session!(self, |client| client.unblock_mac(mac))?;
        Ok(())
    }

    pub async fn limit_bandwidth(
        &self,
        device: &Device,
        download_mbps: f64,
        upload_mbps: f64,
    ) -> Result<(), CoreError> {
        let ip = device.ip.to_string();
        with_session!(self, |client| client.limit_bandwidth(&ip, download_mbps, upload_mbps))?;
        Ok(())
    }

    /// Fresh login plus capability listing. Never fails; problems land in
    /// `message`.
    pub async fn status(&self) -> RouterStatus {
        let mut status = RouterStatus {
            configured: true,
            connected: false,
            brand: Some(self.client.brand().to_string()),
            model: self.model.clone(),
            capabilities: self
                .client
                .capabilities()
                .iter()
                .map(ToString::to_string)
                .collect(),
            message: None,
        };

        if let Err(e) = self.login().await {
            status.message = Some(e.to_string());
            return status;
        }
        status.connected = true;

        match self.client.fetch_capabilities().await {
            Ok(reported) if !reported.is_empty() => {
                status.capabilities = reported.iter().map(ToString::to_string).collect();
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "router capability listing unavailable"),
        }
        info!(brand = ?status.brand, "router reachable");
        status
    }
}

/// Block backend that delegates to the router's firewall directive.
pub struct RouterBackend {
    session: Arc<RouterSession>,
}

impl RouterBackend {
    pub fn new(session: Arc<RouterSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl BlockBackend for RouterBackend {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn block(&self, device: &Device) -> Result<(), CoreError> {
        self.session.block_mac(device).await
    }

    async fn unblock(&self, device: &Device) -> Result<(), CoreError> {
        self.session.unblock_mac(device).await
    }
}
