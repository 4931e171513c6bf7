// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::entity_id::{DeviceId, MacAddress};

/// Best-effort device category.
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
pub enum DeviceClass {
    Laptop,
    Mobile,
    Tablet,
    Tv,
    Gaming,
    Other,
    #[default]
    Unknown,
}

/// Connectivity state. See [`DeviceStatus::can_become`] for the legal moves.
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
pub enum DeviceStatus {
    Online,
    Offline,
    Blocked,
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    /// Whether `self -> next` is a legal registry transition.
    ///
    /// ```text
    /// unknown ──alive──▶ online ⇄ offline
    /// online|unknown ──block──▶ blocked ──unblock──▶ online
    /// ```
    pub fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unknown | Self::Offline, Self::Online)
                | (Self::Online, Self::Offline)
                | (Self::Online | Self::Unknown, Self::Blocked)
                | (Self::Blocked, Self::Online)
        )
    }

    /// Status implied by a discovery liveness reading, or `None` when the
    /// reading does not move the state machine.
    pub fn after_liveness(self, alive: bool) -> Option<Self> {
        match (self, alive) {
            (Self::Unknown | Self::Offline, true) => Some(Self::Online),
            (Self::Online, false) => Some(Self::Offline),
            _ => None,
        }
    }
}

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
pub enum QuotaPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// Policy response once a quota is crossed.
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
pub enum BreachAction {
    #[default]
    Block,
    Throttle,
    Notify,
}

/// A download/upload cap in Mbps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthCap {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// The canonical Device record owned by the registry.
///
/// Usage is tracked in megabytes, throughput in Mbps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub ip: IpAddr,
    pub mac: MacAddress,
    pub name: String,
    pub class: DeviceClass,
    pub status: DeviceStatus,

    // Accounting
    pub data_used_mb: f64,
    pub current_usage_mbps: f64,
    pub quota_limit_mb: Option<f64>,
    pub quota_period: QuotaPeriod,
    pub breach_action: BreachAction,
    pub period_started: DateTime<Utc>,
    /// Set when the current period's quota crossing has been handled.
    pub quota_exceeded_at: Option<DateTime<Utc>>,

    pub is_blocked: bool,
    pub last_seen: DateTime<Utc>,

    // Discovery / scan results
    pub vendor: Option<String>,
    pub hostname: Option<String>,
    pub open_ports: Vec<u16>,
    pub vulnerabilities: Vec<String>,

    // Policy bookkeeping
    pub priority: u8,
    pub bandwidth_limit: Option<BandwidthCap>,
    pub blocked_domains: Vec<String>,
}

impl Device {
    /// True once cumulative usage has reached a configured limit.
    pub fn quota_crossed(&self) -> bool {
        self.quota_limit_mb
            .is_some_and(|limit| self.data_used_mb >= limit)
    }

    /// Crossed and not yet handled in this period.
    pub fn quota_pending(&self) -> bool {
        self.quota_crossed() && self.quota_exceeded_at.is_none()
    }

    /// Zero usage for a new accounting period and drop quota-driven state.
    ///
    /// A blocked device goes back to `online`: reset is bookkeeping and
    /// never waits on the actuator.
    pub(crate) fn reset_usage(&mut self, now: DateTime<Utc>) {
        self.data_used_mb = 0.0;
        self.period_started = now;
        self.quota_exceeded_at = None;
        self.is_blocked = false;
        if self.status == DeviceStatus::Blocked {
            self.status = DeviceStatus::Online;
        }
    }

    /// Start a new accounting period. Only a quota-driven block under the
    /// `block` breach action is lifted; manual blocks stay.
    pub(crate) fn roll_over(&mut self, now: DateTime<Utc>) {
        let quota_block = self.breach_action == BreachAction::Block
            && self.quota_exceeded_at.is_some()
            && self.is_blocked;
        self.data_used_mb = 0.0;
        self.period_started = now;
        self.quota_exceeded_at = None;
        if quota_block {
            self.is_blocked = false;
            if self.status == DeviceStatus::Blocked {
                self.status = DeviceStatus::Online;
            }
        }
    }

    /// Fold a discovery observation into this record. Only address,
    /// vendor, hostname, open ports, last-seen and liveness-driven status
    /// are touched. Returns `true` when the status changed.
    pub(crate) fn apply_observation(&mut self, obs: &DeviceObservation, now: DateTime<Utc>) -> bool {
        self.ip = obs.ip;
        self.vendor = Some(obs.vendor.clone());
        self.hostname = Some(obs.hostname.clone());
        self.open_ports.clone_from(&obs.open_ports);
        self.last_seen = now;
        match self.status.after_liveness(obs.alive) {
            Some(next) => {
                self.status = next;
                true
            }
            None => false,
        }
    }

    /// Record a successful block actuation.
    pub(crate) fn mark_blocked(&mut self) {
        self.status = DeviceStatus::Blocked;
        self.is_blocked = true;
    }

    /// Record a successful unblock actuation.
    pub(crate) fn mark_unblocked(&mut self) {
        self.status = DeviceStatus::Online;
        self.is_blocked = false;
    }
}

/// One candidate reported by a discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceObservation {
    pub ip: IpAddr,
    pub mac: MacAddress,
    pub vendor: String,
    pub hostname: String,
    pub open_ports: Vec<u16>,
    pub alive: bool,
}

impl DeviceObservation {
    /// The degraded form reported when resolving a candidate failed.
    pub fn degraded(ip: IpAddr, mac: MacAddress, vendor: String) -> Self {
        Self {
            ip,
            mac,
            vendor,
            hostname: ip.to_string(),
            open_ports: Vec::new(),
            alive: false,
        }
    }

    /// Whether the hostname came from a real lookup.
    pub fn has_resolved_hostname(&self) -> bool {
        self.hostname != self.ip.to_string()
    }
}

#[cfg(test)]
impl Device {
    /// An online, unlimited device for unit tests.
    #[allow(clippy::unwrap_used)]
    pub(crate) fn fixture(id: u64, ip: &str, mac: &str) -> Self {
        let now = Utc::now();
        Self {
            id: DeviceId(id),
            ip: ip.parse().unwrap(),
            mac: mac.parse().unwrap(),
            name: format!("device-{id}"),
            class: DeviceClass::Unknown,
            status: DeviceStatus::Online,
            data_used_mb: 0.0,
            current_usage_mbps: 0.0,
            quota_limit_mb: None,
            quota_period: QuotaPeriod::Daily,
            breach_action: BreachAction::Block,
            period_started: now,
            quota_exceeded_at: None,
            is_blocked: false,
            last_seen: now,
            vendor: None,
            hostname: None,
            open_ports: Vec::new(),
            vulnerabilities: Vec::new(),
            priority: 3,
            bandwidth_limit: None,
            blocked_domains: Vec::new(),
        }
    }
}
