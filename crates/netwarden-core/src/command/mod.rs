// ── Command API ──
//
// Every write against the registry flows through one closed `Command`
// enum. The engine validates the payload, serializes per device, drives
// the actuator where needed and publishes exactly one event per change.

pub mod requests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{Alert, AlertId, Device, DeviceId, FirewallRule, TrafficAnalysis};

pub use requests::{
    BandwidthRequest, CreateDeviceRequest, DomainRequest, FirewallRuleRequest,
    UpdateDeviceRequest,
};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All possible write operations against the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // ── Device CRUD ──────────────────────────────────────────────────
    CreateDevice(CreateDeviceRequest),
    UpdateDevice {
        id: DeviceId,
        update: UpdateDeviceRequest,
    },
    RemoveDevice {
        id: DeviceId,
    },

    // ── State machine ────────────────────────────────────────────────
    PauseDevice {
        id: DeviceId,
    },
    ResumeDevice {
        id: DeviceId,
    },
    BlockDevice {
        id: DeviceId,
    },
    UnblockDevice {
        id: DeviceId,
    },

    // ── Discovery and probing ────────────────────────────────────────
    DiscoverNow,
    ScanDevice {
        id: DeviceId,
    },
    AnalyzeTraffic {
        id: DeviceId,
    },

    // ── Policy layers ────────────────────────────────────────────────
    LimitBandwidth {
        id: DeviceId,
        #[serde(flatten)]
        limit: BandwidthRequest,
    },
    BlockDomain(DomainRequest),
    UnblockDomain(DomainRequest),
    CreateFirewallRule(FirewallRuleRequest),

    // ── Bulk ─────────────────────────────────────────────────────────
    PauseAll,
    ResetAllQuotas,

    // ── Alerts ───────────────────────────────────────────────────────
    MarkAlertRead {
        id: AlertId,
    },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateDevice(_) => "create_device",
            Self::UpdateDevice { .. } => "update_device",
            Self::RemoveDevice { .. } => "remove_device",
            Self::PauseDevice { .. } => "pause_device",
            Self::ResumeDevice { .. } => "resume_device",
            Self::BlockDevice { .. } => "block_device",
            Self::UnblockDevice { .. } => "unblock_device",
            Self::DiscoverNow => "discover_now",
            Self::ScanDevice { .. } => "scan_device",
            Self::AnalyzeTraffic { .. } => "analyze_traffic",
            Self::LimitBandwidth { .. } => "limit_bandwidth",
            Self::BlockDomain(_) => "block_domain",
            Self::UnblockDomain(_) => "unblock_domain",
            Self::CreateFirewallRule(_) => "create_firewall_rule",
            Self::PauseAll => "pause_all",
            Self::ResetAllQuotas => "reset_all_quotas",
            Self::MarkAlertRead { .. } => "mark_alert_read",
        }
    }

    /// Reject a malformed payload before any registry access.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::CreateDevice(req) => req.validate(),
            Self::UpdateDevice { update, .. } => update.validate(),
            Self::LimitBandwidth { limit, .. } => limit.validate().map(drop),
            Self::BlockDomain(req) | Self::UnblockDomain(req) => req.validate().map(drop),
            Self::CreateFirewallRule(req) => req.validate(),
            _ => Ok(()),
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Device {
        device: Arc<Device>,
    },
    /// The transition is not valid from the current state; nothing changed.
    NoOp {
        device: Arc<Device>,
    },
    Removed {
        device: Arc<Device>,
    },
    Discovered {
        count: usize,
        added: usize,
    },
    Scanned {
        device: Arc<Device>,
    },
    PauseAll {
        paused: Vec<DeviceId>,
        failed: Vec<DeviceId>,
    },
    Reset {
        device_count: usize,
    },
    Domain {
        domain: String,
        changed: bool,
    },
    Rule {
        rule: Arc<FirewallRule>,
    },
    Alert {
        alert: Arc<Alert>,
    },
    Traffic {
        analysis: TrafficAnalysis,
    },
}

impl CommandResult {
    /// The device this result carries, if any.
    pub fn device(&self) -> Option<&Arc<Device>> {
        match self {
            Self::Device { device }
            | Self::NoOp { device }
            | Self::Removed { device }
            | Self::Scanned { device } => Some(device),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: Command = serde_json::from_str(r#"{"type":"block_device","id":4}"#).unwrap();
        assert!(matches!(cmd, Command::BlockDevice { id } if id == DeviceId(4)));

        let cmd: Command = serde_json::from_str(
            r#"{"type":"limit_bandwidth","id":2,"download_mbps":5.0,"upload_mbps":1.0}"#,
        )
        .unwrap();
        assert_eq!(cmd.name(), "limit_bandwidth");
        assert!(cmd.validate().is_ok());

        let cmd: Command =
            serde_json::from_str(r#"{"type":"block_domain","domain":"not a domain"}"#).unwrap();
        assert!(matches!(cmd.validate(), Err(CoreError::ValidationFailed { .. })));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"format_disk"}"#).is_err());
    }
}
