// ── Device registry ──
//
// The single owner of Device, Alert, FirewallRule and NetworkStats state.
// Every mutation is a short synchronous section under a DashMap shard
// lock; nothing here awaits. Event publication is the engine's job so
// that bulk operations can emit exactly one event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use super::collection::{EntityCollection, Keyed};
use crate::discovery::classify;
use crate::error::CoreError;
use crate::model::{
    Alert, AlertId, Device, DeviceId, DeviceObservation, DeviceStatus, FirewallRule, MacAddress,
    NetworkStats, NewAlert, RuleId,
};

impl Keyed for Device {
    type Id = DeviceId;

    fn key(&self) -> DeviceId {
        self.id
    }
}

impl Keyed for Alert {
    type Id = AlertId;

    fn key(&self) -> AlertId {
        self.id
    }
}

impl Keyed for FirewallRule {
    type Id = RuleId;

    fn key(&self) -> RuleId {
        self.id
    }
}

/// Outcome of folding one discovery observation into the registry.
#[derive(Debug, Clone)]
pub enum Reconciled {
    /// Unseen hardware address: a new device in `unknown` state.
    Added(Arc<Device>),
    /// Existing device refreshed in place.
    Updated {
        device: Arc<Device>,
        status_changed: bool,
    },
}

impl Reconciled {
    pub fn device(&self) -> &Arc<Device> {
        match self {
            Self::Added(device) | Self::Updated { device, .. } => device,
        }
    }
}

/// Authoritative in-memory model of the network.
pub struct DeviceRegistry {
    devices: EntityCollection<Device>,
    /// Unique index: hardware address -> id.
    mac_index: DashMap<MacAddress, DeviceId>,
    next_device_id: AtomicU64,

    alerts: EntityCollection<Alert>,
    next_alert_id: AtomicU64,

    rules: EntityCollection<FirewallRule>,
    next_rule_id: AtomicU64,

    stats: watch::Sender<Arc<Vec<NetworkStats>>>,
    stats_capacity: usize,
}

impl DeviceRegistry {
    pub fn new(stats_capacity: usize) -> Self {
        let (stats, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            devices: EntityCollection::new(),
            mac_index: DashMap::new(),
            next_device_id: AtomicU64::new(1),
            alerts: EntityCollection::new(),
            next_alert_id: AtomicU64::new(1),
            rules: EntityCollection::new(),
            next_rule_id: AtomicU64::new(1),
            stats,
            stats_capacity: stats_capacity.max(1),
        }
    }

    // ── Device reads ─────────────────────────────────────────────────

    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    pub fn require(&self, id: DeviceId) -> Result<Arc<Device>, CoreError> {
        self.device(id).ok_or(CoreError::DeviceNotFound { id })
    }

    pub fn device_by_mac(&self, mac: &MacAddress) -> Option<Arc<Device>> {
        let id = *self.mac_index.get(mac)?;
        self.devices.get(id)
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.devices.subscribe()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Device mutations ─────────────────────────────────────────────

    /// Register a device built by `build` under a fresh id.
    ///
    /// Holds the hardware-address index entry for the duration, so two
    /// concurrent inserts of the same address cannot both succeed.
    pub fn insert(
        &self,
        mac: MacAddress,
        build: impl FnOnce(DeviceId) -> Device,
    ) -> Result<Arc<Device>, CoreError> {
        match self.mac_index.entry(mac) {
            Entry::Occupied(e) => Err(CoreError::DuplicateMac {
                mac: e.key().clone(),
                existing: *e.get(),
            }),
            Entry::Vacant(v) => {
                let id = self.allocate_device_id();
                let mut device = build(id);
                device.id = id;
                device.mac = v.key().clone();
                let device = Arc::new(device);
                self.devices.upsert(Device::clone(&device));
                v.insert(id);
                Ok(device)
            }
        }
    }

    /// Fold a discovery observation in: update the device with this
    /// hardware address, or create one in `unknown` state.
    pub fn reconcile(&self, obs: &DeviceObservation, now: DateTime<Utc>) -> Reconciled {
        match self.mac_index.entry(obs.mac.clone()) {
            Entry::Occupied(e) => {
                let id = *e.get();
                if let Some((device, status_changed)) =
                    self.devices.update(id, |d| d.apply_observation(obs, now))
                {
                    return Reconciled::Updated {
                        device,
                        status_changed,
                    };
                }
                // Index pointed at a vanished id; rebind it to a new record.
                let device = self.fresh_from_observation(obs, now);
                *e.into_ref() = device.id;
                Reconciled::Added(device)
            }
            Entry::Vacant(v) => {
                let device = self.fresh_from_observation(obs, now);
                v.insert(device.id);
                Reconciled::Added(device)
            }
        }
    }

    /// Apply `f` to one device under its shard lock.
    pub fn update<R>(
        &self,
        id: DeviceId,
        f: impl FnOnce(&mut Device) -> R,
    ) -> Result<(Arc<Device>, R), CoreError> {
        self.devices
            .update(id, f)
            .ok_or(CoreError::DeviceNotFound { id })
    }

    /// Apply `f` to every device; returns the ids it reported as changed.
    pub fn update_all(&self, f: impl FnMut(&mut Device) -> bool) -> Vec<DeviceId> {
        self.devices.update_all(f)
    }

    pub fn remove(&self, id: DeviceId) -> Result<Arc<Device>, CoreError> {
        let removed = self
            .devices
            .remove(id)
            .ok_or(CoreError::DeviceNotFound { id })?;
        self.mac_index.remove_if(&removed.mac, |_, owner| *owner == id);
        Ok(removed)
    }

    fn allocate_device_id(&self) -> DeviceId {
        DeviceId(self.next_device_id.fetch_add(1, Ordering::Relaxed))
    }

    fn fresh_from_observation(&self, obs: &DeviceObservation, now: DateTime<Utc>) -> Arc<Device> {
        let id = self.allocate_device_id();
        let device = device_from_observation(id, obs, now);
        self.devices.upsert(device.clone());
        Arc::new(device)
    }

    // ── Alerts ───────────────────────────────────────────────────────

    pub fn push_alert(&self, alert: NewAlert) -> Arc<Alert> {
        let id = AlertId(self.next_alert_id.fetch_add(1, Ordering::Relaxed));
        let alert = Alert {
            id,
            kind: alert.kind,
            title: alert.title,
            message: alert.message,
            device_id: alert.device_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.alerts.upsert(alert.clone());
        Arc::new(alert)
    }

    /// All alerts, newest first.
    pub fn alerts(&self) -> Vec<Arc<Alert>> {
        let mut alerts: Vec<Arc<Alert>> = self.alerts.snapshot().iter().cloned().collect();
        alerts.reverse();
        alerts
    }

    pub fn unread_alerts(&self) -> Vec<Arc<Alert>> {
        self.alerts().into_iter().filter(|a| !a.is_read).collect()
    }

    /// Flip the read flag. Returns the alert and whether it changed.
    pub fn mark_alert_read(&self, id: AlertId) -> Result<(Arc<Alert>, bool), CoreError> {
        self.alerts
            .update(id, |a| !std::mem::replace(&mut a.is_read, true))
            .ok_or(CoreError::AlertNotFound { id })
    }

    // ── Firewall rules ───────────────────────────────────────────────

    pub fn allocate_rule_id(&self) -> RuleId {
        RuleId(self.next_rule_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn record_rule(&self, rule: FirewallRule) -> Arc<FirewallRule> {
        self.rules.upsert(rule.clone());
        Arc::new(rule)
    }

    pub fn rules(&self) -> Arc<Vec<Arc<FirewallRule>>> {
        self.rules.snapshot()
    }

    // ── Network stats ────────────────────────────────────────────────

    /// Aggregate the current device set.
    pub fn compute_stats(&self, now: DateTime<Utc>) -> NetworkStats {
        let devices = self.devices.snapshot();
        NetworkStats {
            total_devices: devices.len(),
            active_connections: devices.iter().filter(|d| d.status.is_online()).count(),
            total_bandwidth_mbps: devices.iter().map(|d| d.current_usage_mbps).sum(),
            data_today_mb: devices.iter().map(|d| d.data_used_mb).sum(),
            timestamp: now,
        }
    }

    /// Append a snapshot, dropping the oldest past capacity.
    pub fn record_stats(&self, stats: NetworkStats) {
        let cap = self.stats_capacity;
        self.stats.send_modify(|history| {
            let mut next = Vec::with_capacity(history.len().min(cap) + 1);
            let skip = (history.len() + 1).saturating_sub(cap);
            next.extend(history.iter().skip(skip).cloned());
            next.push(stats);
            *history = Arc::new(next);
        });
    }

    pub fn latest_stats(&self) -> Option<NetworkStats> {
        self.stats.borrow().last().cloned()
    }

    pub fn stats_history(&self) -> Arc<Vec<NetworkStats>> {
        self.stats.borrow().clone()
    }
}

/// A freshly discovered device: `unknown` until a later pass confirms it.
fn device_from_observation(id: DeviceId, obs: &DeviceObservation, now: DateTime<Utc>) -> Device {
    let hostname = obs.has_resolved_hostname().then(|| obs.hostname.clone());
    let name = hostname
        .clone()
        .unwrap_or_else(|| format!("Device-{}", obs.ip));
    Device {
        id,
        ip: obs.ip,
        mac: obs.mac.clone(),
        name,
        class: classify::classify(&obs.vendor, hostname.as_deref()),
        status: DeviceStatus::Unknown,
        data_used_mb: 0.0,
        current_usage_mbps: 0.0,
        quota_limit_mb: None,
        quota_period: crate::model::QuotaPeriod::default(),
        breach_action: crate::model::BreachAction::default(),
        period_started: now,
        quota_exceeded_at: None,
        is_blocked: false,
        last_seen: now,
        vendor: Some(obs.vendor.clone()),
        hostname: Some(obs.hostname.clone()),
        open_ports: obs.open_ports.clone(),
        vulnerabilities: Vec::new(),
        priority: 3,
        bandwidth_limit: None,
        blocked_domains: Vec::new(),
    }
}
