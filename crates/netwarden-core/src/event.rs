// ── Event broadcaster ──
//
// Publish/subscribe fan-out of every registry mutation. Built on
// `tokio::sync::broadcast`: no replay for late subscribers, per-subscriber
// FIFO order, and a slow subscriber that falls more than `capacity`
// events behind loses the overflow (it sees `Lagged`, never blocks
// publishers).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::model::{
    Alert, AlertId, BreachAction, Device, DeviceId, FirewallRule, MacAddress, NetworkStats,
};

/// A typed notification describing one mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    DeviceAdded {
        device: Arc<Device>,
    },
    DeviceUpdated {
        device: Arc<Device>,
    },
    DeviceRemoved {
        device_id: DeviceId,
        mac: MacAddress,
    },
    DevicePaused {
        device: Arc<Device>,
    },
    DeviceResumed {
        device: Arc<Device>,
    },
    DeviceBlocked {
        device: Arc<Device>,
    },
    DeviceUnblocked {
        device: Arc<Device>,
    },
    AllDevicesPaused {
        paused: Vec<DeviceId>,
        failed: Vec<DeviceId>,
    },
    QuotasReset {
        device_count: usize,
    },
    UsageUpdated {
        devices: Vec<Arc<Device>>,
    },
    QuotaExceeded {
        device: Arc<Device>,
        action: BreachAction,
        alert_id: AlertId,
    },
    DeviceScanned {
        device: Arc<Device>,
        vulnerabilities: usize,
    },
    DevicesDiscovered {
        count: usize,
        added: usize,
    },
    BandwidthLimited {
        device: Arc<Device>,
        download_mbps: f64,
        upload_mbps: f64,
    },
    DomainBlocked {
        domain: String,
        device_id: Option<DeviceId>,
    },
    DomainUnblocked {
        domain: String,
        device_id: Option<DeviceId>,
    },
    FirewallRuleCreated {
        rule: Arc<FirewallRule>,
    },
    AlertRead {
        alert: Arc<Alert>,
    },
    StatsUpdated {
        stats: NetworkStats,
    },
}

impl EngineEvent {
    /// Wire tag, matching the serialized `"type"` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceAdded { .. } => "device_added",
            Self::DeviceUpdated { .. } => "device_updated",
            Self::DeviceRemoved { .. } => "device_removed",
            Self::DevicePaused { .. } => "device_paused",
            Self::DeviceResumed { .. } => "device_resumed",
            Self::DeviceBlocked { .. } => "device_blocked",
            Self::DeviceUnblocked { .. } => "device_unblocked",
            Self::AllDevicesPaused { .. } => "all_devices_paused",
            Self::QuotasReset { .. } => "quotas_reset",
            Self::UsageUpdated { .. } => "usage_updated",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::DeviceScanned { .. } => "device_scanned",
            Self::DevicesDiscovered { .. } => "devices_discovered",
            Self::BandwidthLimited { .. } => "bandwidth_limited",
            Self::DomainBlocked { .. } => "domain_blocked",
            Self::DomainUnblocked { .. } => "domain_unblocked",
            Self::FirewallRuleCreated { .. } => "firewall_rule_created",
            Self::AlertRead { .. } => "alert_read",
            Self::StatsUpdated { .. } => "stats_updated",
        }
    }

    /// The device this event is about, if any.
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::DeviceAdded { device }
            | Self::DeviceUpdated { device }
            | Self::DevicePaused { device }
            | Self::DeviceResumed { device }
            | Self::DeviceBlocked { device }
            | Self::DeviceUnblocked { device }
            | Self::QuotaExceeded { device, .. }
            | Self::DeviceScanned { device, .. }
            | Self::BandwidthLimited { device, .. } => Some(device.id),
            Self::DeviceRemoved { device_id, .. } => Some(*device_id),
            Self::DomainBlocked { device_id, .. } | Self::DomainUnblocked { device_id, .. } => {
                *device_id
            }
            _ => None,
        }
    }
}

/// Fan-out handle. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        let kind = event.kind();
        // `send` only fails when nobody is listening.
        let delivered = self.tx.send(Arc::new(event)).unwrap_or(0);
        trace!(kind, delivered, "event published");
        delivered
    }

    /// New subscription. Sees only events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ── Observer wire protocol ───────────────────────────────────────────

/// Messages an observer may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverMessage {
    Ping,
}

/// Control frames sent to an observer outside the event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverReply {
    Connected { version: &'static str },
    Pong,
}

impl ObserverReply {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Interpret one inbound text frame. Malformed frames are logged and
/// dropped; they never affect the connection or other observers.
pub fn handle_inbound(text: &str) -> Option<ObserverReply> {
    match serde_json::from_str::<ObserverMessage>(text) {
        Ok(ObserverMessage::Ping) => Some(ObserverReply::Pong),
        Err(e) => {
            warn!(error = %e, len = text.len(), "dropping malformed observer message");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::QuotasReset { device_count: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "quotas_reset");
        assert_eq!(json["device_count"], 3);
        assert_eq!(event.kind(), "quotas_reset");
    }

    #[test]
    fn ping_gets_pong_and_garbage_is_dropped() {
        let reply = handle_inbound(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(serde_json::to_value(reply).unwrap()["type"], "pong");
        assert!(handle_inbound("not json").is_none());
        assert!(handle_inbound(r#"{"type":"subscribe"}"#).is_none());
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_backlog() {
        let bus = EventBroadcaster::new(16);
        let mut early = bus.subscribe();

        bus.publish(EngineEvent::QuotasReset { device_count: 1 });
        let mut late = bus.subscribe();
        bus.publish(EngineEvent::DevicesDiscovered { count: 2, added: 0 });

        assert_eq!(early.recv().await.unwrap().kind(), "quotas_reset");
        assert_eq!(early.recv().await.unwrap().kind(), "devices_discovered");
        assert_eq!(late.recv().await.unwrap().kind(), "devices_discovered");
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn publish_without_observers_is_harmless() {
        let bus = EventBroadcaster::new(4);
        assert_eq!(bus.publish(EngineEvent::QuotasReset { device_count: 0 }), 0);
        assert_eq!(bus.observer_count(), 0);
    }
}
