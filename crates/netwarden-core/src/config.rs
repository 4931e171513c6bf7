// ── Runtime engine configuration ──
//
// Describes *how* the engine talks to the network: which interface to
// poison on, how often to sweep, which block backend to use. It carries
// credentials but never touches disk; `netwarden-config` builds one and
// hands it in.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use netwarden_api::{RouterBrand, RouterCapability, TlsMode};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::model::BandwidthCap;

/// Well-known ports probed on every discovery pass.
pub const DISCOVERY_PORTS: [u16; 10] = [22, 23, 53, 80, 135, 139, 443, 445, 993, 995];

/// Ports probed by an explicit device scan.
pub const SCAN_PORTS: [u16; 15] = [
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 993, 995, 3389,
];

/// Which mechanism enforces a block.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BlockBackendKind {
    /// Bidirectional ARP poisoning from this host.
    #[default]
    Arp,
    /// Firewall directive sent to the router's control plane.
    Router,
}

/// Where the quota accountant gets usage readings from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UsageMeterKind {
    #[default]
    Simulated,
    /// No accrual; quotas only move through explicit updates.
    Disabled,
}

/// Router control-plane profile.
#[derive(Debug, Clone)]
pub struct RouterProfile {
    pub brand: RouterBrand,
    pub model: Option<String>,
    /// API root, e.g. `http://192.168.1.1/api`.
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub capabilities: Vec<RouterCapability>,
    pub timeout: Duration,
    pub tls: TlsMode,
}

/// Everything the engine needs to run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interface ARP poisoning and binding restores go out on.
    pub interface: String,
    /// Skip `ip route` and use this gateway.
    pub gateway: Option<IpAddr>,

    /// Background discovery cadence. Zero disables the task.
    pub discovery_interval: Duration,
    /// Quota accounting tick. Zero disables the task.
    pub quota_interval: Duration,
    /// Network stats snapshot cadence. Zero disables the task.
    pub stats_interval: Duration,

    /// Upper bound for a single ping or port probe.
    pub probe_timeout: Duration,
    /// Upper bound for resolving one discovery candidate end to end.
    pub candidate_timeout: Duration,
    /// Candidates resolved concurrently during a pass.
    pub discovery_concurrency: usize,
    pub discovery_ports: Vec<u16>,
    pub scan_ports: Vec<u16>,

    pub block_backend: BlockBackendKind,
    pub router: Option<RouterProfile>,

    /// Hosts file used for global domain blocking.
    pub hosts_file: PathBuf,
    /// Cap applied by the `throttle` breach action.
    pub throttle: BandwidthCap,

    pub usage_meter: UsageMeterKind,

    /// Packet sample bounds for traffic analysis.
    pub capture_packets: usize,
    pub capture_timeout: Duration,

    /// Broadcast channel capacity per observer.
    pub event_capacity: usize,
    /// Stats snapshots retained.
    pub stats_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            gateway: None,
            discovery_interval: Duration::from_secs(60),
            quota_interval: Duration::from_secs(10),
            stats_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
            candidate_timeout: Duration::from_secs(5),
            discovery_concurrency: 16,
            discovery_ports: DISCOVERY_PORTS.to_vec(),
            scan_ports: SCAN_PORTS.to_vec(),
            block_backend: BlockBackendKind::Arp,
            router: None,
            hosts_file: PathBuf::from("/etc/hosts"),
            throttle: BandwidthCap {
                download_mbps: 1.0,
                upload_mbps: 0.5,
            },
            usage_meter: UsageMeterKind::Simulated,
            capture_packets: 100,
            capture_timeout: Duration::from_secs(10),
            event_capacity: 256,
            stats_history: 288,
        }
    }
}

impl EngineConfig {
    /// Config for one-shot CLI use: no background tasks.
    pub fn oneshot(mut self) -> Self {
        self.discovery_interval = Duration::ZERO;
        self.quota_interval = Duration::ZERO;
        self.stats_interval = Duration::ZERO;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interface.trim().is_empty() {
            return Err(config_err("interface must not be empty"));
        }
        if self.block_backend == BlockBackendKind::Router && self.router.is_none() {
            return Err(config_err(
                "block backend `router` requires a [router] profile",
            ));
        }
        if self.probe_timeout.is_zero() || self.candidate_timeout.is_zero() {
            return Err(config_err("probe and candidate timeouts must be positive"));
        }
        if self.discovery_concurrency == 0 {
            return Err(config_err("discovery_concurrency must be at least 1"));
        }
        if self.event_capacity == 0 || self.stats_history == 0 {
            return Err(config_err(
                "event_capacity and stats_history must be at least 1",
            ));
        }
        let cap = self.throttle;
        if !(cap.download_mbps > 0.0 && cap.upload_mbps > 0.0) {
            return Err(config_err("throttle caps must be positive"));
        }
        Ok(())
    }
}

fn config_err(message: &str) -> CoreError {
    CoreError::Config {
        message: message.to_owned(),
    }
}
