// ── Firewall rule types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::entity_id::{DeviceId, RuleId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FirewallAction {
    Allow,
    Block,
    Reject,
}

impl FirewallAction {
    /// iptables jump target.
    pub fn target(self) -> &'static str {
        match self {
            Self::Allow => "ACCEPT",
            Self::Block => "DROP",
            Self::Reject => "REJECT",
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
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
}

/// A forwarding rule as applied to the host firewall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: RuleId,
    pub name: String,
    pub source_ip: Option<IpAddr>,
    pub destination_ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub action: FirewallAction,
    pub priority: u32,
    pub is_active: bool,
    pub device_id: Option<DeviceId>,
    pub created_at: DateTime<Utc>,
}

impl FirewallRule {
    /// `iptables` arguments appending this rule to the FORWARD chain.
    ///
    /// A port match needs a protocol, so `-p` defaults to tcp whenever a
    /// port is present.
    pub fn iptables_args(&self) -> Vec<String> {
        let mut args = vec!["-A".to_owned(), "FORWARD".to_owned()];
        if let Some(src) = self.source_ip {
            args.extend(["-s".to_owned(), src.to_string()]);
        }
        if let Some(dst) = self.destination_ip {
            args.extend(["-d".to_owned(), dst.to_string()]);
        }
        let protocol = match (self.protocol, self.port) {
            (Some(p), _) => Some(p),
            (None, Some(_)) => Some(Protocol::Tcp),
            (None, None) => None,
        };
        if let Some(p) = protocol {
            args.extend(["-p".to_owned(), p.to_string()]);
        }
        if let Some(port) = self.port {
            args.extend(["--dport".to_owned(), port.to_string()]);
        }
        args.extend(["-j".to_owned(), self.action.target().to_owned()]);
        args
    }
}
