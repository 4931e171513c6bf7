// ── Wire types for the router control plane ──

use serde::{Deserialize, Serialize};

/// Response envelope used by every control-plane endpoint:
/// `{ "success": bool, "message": "...", "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Router vendor family. Only affects login payload encoding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum RouterBrand {
    Huawei,
    TpLink,
    Asus,
    Netgear,
    Generic,
}

impl RouterBrand {
    /// Huawei firmware expects the password base64-encoded in the login body.
    pub fn encodes_password(self) -> bool {
        matches!(self, Self::Huawei)
    }
}

/// A feature the router advertises through its control plane.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RouterCapability {
    ArpControl,
    PortForwarding,
    Firewall,
    Qos,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockAction {
    Block,
    Unblock,
}

/// Body of `POST {endpoint}/firewall/block`.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDirective {
    pub mac_address: String,
    pub action: BlockAction,
}

/// Body of `POST {endpoint}/qos/limit`. Limits are in Mbps.
#[derive(Debug, Clone, Serialize)]
pub struct QosDirective {
    pub ip_address: String,
    pub download_limit: f64,
    pub upload_limit: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CapabilityList {
    #[serde(default)]
    pub capabilities: Vec<RouterCapability>,
}
