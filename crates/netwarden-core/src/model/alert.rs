// ── Alert domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::{AlertId, DeviceId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    QuotaExceeded,
    NewDevice,
    HighUsage,
    DeviceBlocked,
    DeviceUnblocked,
    SecurityVulnerability,
}

/// Immutable notification record. Only `is_read` ever changes, and only
/// from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub device_id: Option<DeviceId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// An alert before the registry assigns it an id.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub device_id: Option<DeviceId>,
}

impl NewAlert {
    pub fn new(
        kind: AlertKind,
        title: impl Into<String>,
        message: impl Into<String>,
        device_id: Option<DeviceId>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            device_id,
        }
    }
}
