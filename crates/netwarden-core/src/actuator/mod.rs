// ── Access Actuator ──
//
// Applies and removes network-layer policy: device blocks through an
// interchangeable `BlockBackend`, bandwidth caps through the router's QoS
// directive, global domain sinkholing through the hosts file, and
// forwarding rules through the host firewall.
//
// Nothing here touches the registry. Callers commit state transitions
// only after an operation reports success.

mod arp;
mod hosts;
mod router;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{BlockBackendKind, EngineConfig};
use crate::error::CoreError;
use crate::model::{BandwidthCap, Device, FirewallRule, RouterStatus};
use crate::tools::NetworkTools;

pub use arp::ArpPoisonBackend;
pub use hosts::{DomainBlocklist, normalize_domain};
pub use router::{RouterBackend, RouterSession};

/// One way of cutting a device off the network.
///
/// `Ok` means the directive was issued without error, not that isolation
/// was verified.
#[async_trait]
pub trait BlockBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn block(&self, device: &Device) -> Result<(), CoreError>;

    async fn unblock(&self, device: &Device) -> Result<(), CoreError>;
}

pub struct AccessActuator {
    backend: Arc<dyn BlockBackend>,
    router: Option<Arc<RouterSession>>,
    tools: Arc<dyn NetworkTools>,
    domains: DomainBlocklist,
}

impl AccessActuator {
    pub fn new(
        backend: Arc<dyn BlockBackend>,
        router: Option<Arc<RouterSession>>,
        tools: Arc<dyn NetworkTools>,
        domains: DomainBlocklist,
    ) -> Self {
        Self {
            backend,
            router,
            tools,
            domains,
        }
    }

    /// Wire up the backend named by `config.block_backend`.
    pub fn from_config(
        config: &EngineConfig,
        tools: Arc<dyn NetworkTools>,
    ) -> Result<Self, CoreError> {
        let router = config
            .router
            .as_ref()
            .map(RouterSession::from_profile)
            .transpose()?
            .map(Arc::new);

        let backend: Arc<dyn BlockBackend> = match (config.block_backend, &router) {
            (BlockBackendKind::Arp, _) => Arc::new(ArpPoisonBackend::new(
                Arc::clone(&tools),
                config.gateway,
            )),
            (BlockBackendKind::Router, Some(session)) => {
                Arc::new(RouterBackend::new(Arc::clone(session)))
            }
            (BlockBackendKind::Router, None) => {
                return Err(CoreError::Config {
                    message: "block backend `router` requires a router profile".into(),
                });
            }
        };
        info!(backend = backend.name(), router = router.is_some(), "access actuator ready");

        Ok(Self::new(
            backend,
            router,
            tools,
            DomainBlocklist::new(config.hosts_file.clone()),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn block(&self, device: &Device) -> Result<(), CoreError> {
        self.backend.block(device).await.map_err(|e| {
            warn!(device_id = %device.id, ip = %device.ip, error = %e, "block failed");
            e.into_actuation("block")
        })
    }

    pub async fn unblock(&self, device: &Device) -> Result<(), CoreError> {
        self.backend.unblock(device).await.map_err(|e| {
            warn!(device_id = %device.id, ip = %device.ip, error = %e, "unblock failed");
            e.into_actuation("unblock")
        })
    }

    /// Cap a device's throughput. Needs a router with the QoS capability.
    pub async fn limit_bandwidth(&self, device: &Device, cap: BandwidthCap) -> Result<(), CoreError> {
        let Some(router) = &self.router else {
            return Err(CoreError::Unsupported {
                operation: "limit bandwidth",
                required: "a router profile with the `qos` capability".into(),
            });
        };
        router
            .limit_bandwidth(device, cap.download_mbps, cap.upload_mbps)
            .await
            .map_err(|e| {
                warn!(device_id = %device.id, error = %e, "bandwidth limit failed");
                e.into_actuation("limit bandwidth")
            })?;
        info!(
            device_id = %device.id,
            download_mbps = cap.download_mbps,
            upload_mbps = cap.upload_mbps,
            "bandwidth limited"
        );
        Ok(())
    }

    /// Sinkhole `domain` for every device. `domain` must already be
    /// normalized. Returns whether the hosts file changed.
    pub async fn block_domain(&self, domain: &str) -> Result<bool, CoreError> {
        self.domains
            .block(domain)
            .await
            .map_err(|e| e.into_actuation("block domain"))
    }

    pub async fn unblock_domain(&self, domain: &str) -> Result<bool, CoreError> {
        self.domains
            .unblock(domain)
            .await
            .map_err(|e| e.into_actuation("unblock domain"))
    }

    pub async fn apply_firewall_rule(&self, rule: &FirewallRule) -> Result<(), CoreError> {
        self.tools
            .apply_firewall_rule(&rule.iptables_args())
            .await
            .map_err(|e| {
                warn!(rule = %rule.name, error = %e, "firewall rule rejected");
                e.into_actuation("firewall rule")
            })
    }

    pub async fn router_status(&self) -> RouterStatus {
        match &self.router {
            Some(router) => router.status().await,
            None => RouterStatus {
                configured: false,
                connected: false,
                brand: None,
                model: None,
                capabilities: Vec::new(),
                message: Some("no router configured".into()),
            },
        }
    }
}
