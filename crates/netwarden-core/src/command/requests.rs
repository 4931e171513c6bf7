// ── Typed request payloads ──
//
// Each mutating command carries one of these. `validate()` runs before
// the engine looks at the registry, so a bad payload never causes a
// partial mutation.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::actuator::normalize_domain;
use crate::error::CoreError;
use crate::model::{
    BandwidthCap, BreachAction, DeviceClass, DeviceId, FirewallAction, MacAddress, Protocol,
    QuotaPeriod,
};

/// Accepted priority band.
const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

fn check_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("name must not be empty"));
    }
    if name.len() > 64 {
        return Err(CoreError::validation("name must be at most 64 characters"));
    }
    Ok(())
}

fn check_quota(limit: f64) -> Result<(), CoreError> {
    if limit.is_finite() && limit > 0.0 {
        Ok(())
    } else {
        Err(CoreError::validation("quota limit must be a positive number of MB"))
    }
}

fn check_priority(priority: u8) -> Result<(), CoreError> {
    if PRIORITY_RANGE.contains(&priority) {
        Ok(())
    } else {
        Err(CoreError::validation("priority must be between 1 and 5"))
    }
}

// ── Devices ────────────────────────────────────────────────────────

/// Explicit registration of a device discovery has not (yet) seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub ip: IpAddr,
    pub mac: MacAddress,
    #[serde(default)]
    pub class: DeviceClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_limit_mb: Option<f64>,
    #[serde(default)]
    pub quota_period: QuotaPeriod,
    #[serde(default)]
    pub breach_action: BreachAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl CreateDeviceRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_name(&self.name)?;
        if self.mac.is_placeholder() {
            return Err(CoreError::validation(format!(
                "{} is not a device hardware address",
                self.mac
            )));
        }
        if let Some(limit) = self.quota_limit_mb {
            check_quota(limit)?;
        }
        if let Some(priority) = self.priority {
            check_priority(priority)?;
        }
        Ok(())
    }
}

/// Partial update. Status, block state and hardware address are not
/// editable here; they change only through their own commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDeviceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_limit_mb: Option<f64>,
    /// Drop the quota limit (unlimited).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remove_quota: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_period: Option<QuotaPeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breach_action: Option<BreachAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl UpdateDeviceRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(limit) = self.quota_limit_mb {
            if self.remove_quota {
                return Err(CoreError::validation(
                    "quota_limit_mb and remove_quota are mutually exclusive",
                ));
            }
            check_quota(limit)?;
        }
        if let Some(priority) = self.priority {
            check_priority(priority)?;
        }
        Ok(())
    }
}

// ── Policy layers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandwidthRequest {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl BandwidthRequest {
    pub fn validate(&self) -> Result<BandwidthCap, CoreError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if !(ok(self.download_mbps) && ok(self.upload_mbps)) {
            return Err(CoreError::validation(
                "bandwidth limits must be positive numbers of Mbps",
            ));
        }
        Ok(BandwidthCap {
            download_mbps: self.download_mbps,
            upload_mbps: self.upload_mbps,
        })
    }
}

/// Domain sinkholing is global; `device_id` only selects which device's
/// bookkeeping list records it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRequest {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl DomainRequest {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            device_id: None,
        }
    }

    /// The normalized domain name.
    pub fn validate(&self) -> Result<String, CoreError> {
        normalize_domain(&self.domain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRuleRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    pub action: FirewallAction,
    #[serde(default)]
    pub priority: u32,
    /// Defaults the source address to this device's current address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl FirewallRuleRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_name(&self.name)?;
        if self.port == Some(0) {
            return Err(CoreError::validation("port must be between 1 and 65535"));
        }
        if self.port.is_some() && self.protocol == Some(Protocol::Icmp) {
            return Err(CoreError::validation("icmp rules cannot match a port"));
        }
        let matches_something = self.source_ip.is_some()
            || self.destination_ip.is_some()
            || self.port.is_some()
            || self.device_id.is_some();
        if !matches_something {
            return Err(CoreError::validation(
                "rule must match a source, destination, port or device",
            ));
        }
        Ok(())
    }
}
