// ── Aggregate and analytics types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::entity_id::DeviceId;

/// Point-in-time network aggregate. The newest snapshot is the current reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_devices: usize,
    /// Devices currently `online`.
    pub active_connections: usize,
    /// Summed instantaneous throughput, Mbps.
    pub total_bandwidth_mbps: f64,
    /// Summed usage across devices in the current period, MB.
    pub data_today_mb: f64,
    pub timestamp: DateTime<Utc>,
}

/// Protocol and domain tally from a bounded packet sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficAnalysis {
    pub device_id: Option<DeviceId>,
    pub ip: Option<IpAddr>,
    pub total_packets: usize,
    pub protocols: BTreeMap<String, usize>,
    pub domains: Vec<String>,
}

/// Router reachability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub configured: bool,
    pub connected: bool,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub capabilities: Vec<String>,
    pub message: Option<String>,
}
