// ── Engine facade ──
//
// Lifecycle for the device control engine: background discovery, quota
// and stats tasks, the command processor, and read access to the
// registry. Every registry mutation in this file is followed by exactly
// one published event.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actuator::AccessActuator;
use crate::analysis;
use crate::command::{
    Command, CommandEnvelope, CommandResult, CreateDeviceRequest, DomainRequest,
    FirewallRuleRequest, UpdateDeviceRequest,
};
use crate::config::EngineConfig;
use crate::discovery::{Discovery, vulnerabilities};
use crate::error::CoreError;
use crate::event::{EngineEvent, EventBroadcaster};
use crate::model::{
    Alert, AlertKind, BandwidthCap, BreachAction, Device, DeviceId, DeviceStatus, FirewallRule,
    NetworkStats, NewAlert, RouterStatus,
};
use crate::quota::{self, QuotaAccountant, UsageMeter};
use crate::store::{DeviceRegistry, Reconciled};
use crate::stream::DeviceFeed;
use crate::tools::{NetworkTools, SystemTools};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── EngineState ──────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// Injected collaborators. [`Engine::new`] builds the OS-backed set;
/// tests hand in fakes.
pub struct EngineParts {
    pub tools: Arc<dyn NetworkTools>,
    pub actuator: AccessActuator,
    pub meter: Arc<dyn UsageMeter>,
}

/// Read-only port scan of an arbitrary address.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub ip: IpAddr,
    pub open_ports: Vec<u16>,
    pub vulnerabilities: Vec<String>,
}

// ── Engine ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Owns the registry and the
/// event broadcaster; all writes go through [`execute`](Self::execute).
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    registry: DeviceRegistry,
    events: EventBroadcaster,
    tools: Arc<dyn NetworkTools>,
    discovery: Discovery,
    actuator: AccessActuator,
    accountant: QuotaAccountant,
    state: watch::Sender<EngineState>,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    /// Child token for the current run; cancelled on shutdown, replaced
    /// on restart.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes conflicting updates to the same device across awaits.
    device_locks: DashMap<DeviceId, Arc<Mutex<()>>>,
    discovering: AtomicBool,
}

impl Engine {
    /// Build an engine backed by the host's command-line tools and the
    /// configured block backend. Does NOT start it.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let tools: Arc<dyn NetworkTools> = Arc::new(SystemTools::new(config.interface.clone()));
        let actuator = AccessActuator::from_config(&config, Arc::clone(&tools))?;
        let meter = quota::meter_for(config.usage_meter);
        Self::with_parts(
            config,
            EngineParts {
                tools,
                actuator,
                meter,
            },
        )
    }

    pub fn with_parts(config: EngineConfig, parts: EngineParts) -> Result<Self, CoreError> {
        config.validate()?;
        let (state, _) = watch::channel(EngineState::Stopped);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(EngineInner {
                registry: DeviceRegistry::new(config.stats_history),
                events: EventBroadcaster::new(config.event_capacity),
                discovery: Discovery::new(Arc::clone(&parts.tools), &config),
                accountant: QuotaAccountant::new(parts.meter, config.throttle),
                tools: parts.tools,
                actuator: parts.actuator,
                config,
                state,
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                device_locks: DashMap::new(),
                discovering: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the command processor and every background task whose
    /// interval is non-zero. Starting a running engine is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if *self.inner.state.borrow() == EngineState::Running {
            return Ok(());
        }
        let cfg = &self.inner.config;
        let cancel = {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
            child.clone()
        };

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let engine = self.clone();
            handles.push(tokio::spawn(command_processor_task(
                engine,
                rx,
                cancel.clone(),
            )));
        }

        if !cfg.discovery_interval.is_zero() {
            let engine = self.clone();
            handles.push(tokio::spawn(discovery_task(
                engine,
                cfg.discovery_interval,
                cancel.clone(),
            )));
        }

        if !cfg.quota_interval.is_zero() {
            let engine = self.clone();
            handles.push(tokio::spawn(quota_task(
                engine,
                cfg.quota_interval,
                cancel.clone(),
            )));
        }

        if !cfg.stats_interval.is_zero() {
            let engine = self.clone();
            handles.push(tokio::spawn(stats_task(engine, cfg.stats_interval, cancel)));
        }

        info!(
            interface = %cfg.interface,
            backend = self.inner.actuator.backend_name(),
            meter = self.inner.accountant.meter_name(),
            tasks = handles.len(),
            "engine started"
        );
        self.inner.state.send_replace(EngineState::Running);
        Ok(())
    }

    /// Stop background tasks, let in-flight commands finish, and reset
    /// the command channel so the engine can be started again.
    pub async fn shutdown(&self) {
        self.inner.state.send_replace(EngineState::Stopped);
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
            *self.inner.command_tx.lock().await = tx;
            *self.inner.command_rx.lock().await = Some(rx);
        }
        debug!("engine stopped");
    }

    /// One-shot: start without background tasks, run closure, shut down.
    pub async fn oneshot<F, Fut, T>(config: EngineConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let engine = Engine::new(config.oneshot())?;
        engine.start().await?;
        let result = f(engine.clone()).await;
        engine.shutdown().await;
        result
    }

    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command.
    ///
    /// Malformed payloads are rejected here, before the command reaches
    /// the processor or the registry.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.state.borrow() != EngineState::Running {
            return Err(CoreError::EngineStopped);
        }
        cmd.validate()?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();
        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;

        rx.await.map_err(|_| CoreError::EngineStopped)?
    }

    // ── Observation ──────────────────────────────────────────────

    /// Subscribe to the event stream. Only events published after this
    /// call are delivered.
    pub fn events(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.inner.events.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.events.observer_count()
    }

    /// Whole-table subscription for consumers that render every device.
    pub fn devices(&self) -> DeviceFeed {
        DeviceFeed::new(self.inner.registry.subscribe_devices())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn list_devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.registry.devices_snapshot()
    }

    pub fn get_device(&self, id: DeviceId) -> Result<Arc<Device>, CoreError> {
        self.inner.registry.require(id)
    }

    pub fn find_by_ip(&self, ip: IpAddr) -> Option<Arc<Device>> {
        self.list_devices().iter().find(|d| d.ip == ip).cloned()
    }

    /// All alerts, newest first.
    pub fn alerts(&self) -> Vec<Arc<Alert>> {
        self.inner.registry.alerts()
    }

    pub fn unread_alerts(&self) -> Vec<Arc<Alert>> {
        self.inner.registry.unread_alerts()
    }

    pub fn latest_stats(&self) -> Option<NetworkStats> {
        self.inner.registry.latest_stats()
    }

    pub fn stats_history(&self) -> Arc<Vec<NetworkStats>> {
        self.inner.registry.stats_history()
    }

    pub fn firewall_rules(&self) -> Arc<Vec<Arc<FirewallRule>>> {
        self.inner.registry.rules()
    }

    pub async fn router_status(&self) -> RouterStatus {
        self.inner.actuator.router_status().await
    }

    /// Probe `ip` with the scan port list without touching the registry.
    pub async fn scan_address(&self, ip: IpAddr) -> ScanReport {
        let open_ports = self
            .inner
            .discovery
            .prober()
            .open_ports(ip, &self.inner.config.scan_ports)
            .await;
        let vulnerabilities = vulnerabilities(&open_ports);
        ScanReport {
            ip,
            open_ports,
            vulnerabilities,
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn publish(&self, event: EngineEvent) {
        self.inner.events.publish(event);
    }

    fn raise(&self, alert: NewAlert) -> Arc<Alert> {
        let alert = self.inner.registry.push_alert(alert);
        debug!(alert_id = %alert.id, kind = %alert.kind, "alert raised");
        alert
    }

    async fn lock_device(&self, id: DeviceId) -> OwnedMutexGuard<()> {
        let lock = self.inner.device_locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Run discovery passes on a fixed cadence, starting immediately.
async fn discovery_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = run_discovery(&engine) => match result {
                        Ok(_) | Err(CoreError::DiscoveryInProgress) => {}
                        Err(e) => warn!(error = %e, "periodic discovery failed"),
                    },
                }
            }
        }
    }
}

async fn quota_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => run_quota_tick(&engine).await,
        }
    }
}

async fn stats_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => record_stats(&engine),
        }
    }
}

/// Receive commands and run each on its own task so that slow actuation
/// against one device never delays another. On shutdown, in-flight
/// commands are allowed to finish.
async fn command_processor_task(
    engine: Engine,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = done {
                    warn!(error = %e, "command task panicked");
                }
            }
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let engine = engine.clone();
                in_flight.spawn(async move {
                    let name = envelope.command.name();
                    let result = route_command(&engine, envelope.command).await;
                    if let Err(ref e) = result {
                        debug!(command = name, error = %e, "command failed");
                    }
                    let _ = envelope.response_tx.send(result);
                });
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
}

// ── Discovery ────────────────────────────────────────────────────

/// Clears the single-pass flag however the pass ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One discovery pass folded into the registry. At most one runs at a
/// time.
async fn run_discovery(engine: &Engine) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    if inner.discovering.swap(true, Ordering::AcqRel) {
        return Err(CoreError::DiscoveryInProgress);
    }
    let _guard = PassGuard(&inner.discovering);

    let mut observations = inner.discovery.discover();
    let (mut count, mut added) = (0, 0);

    while let Some(obs) = observations.next().await {
        let obs = obs?;
        count += 1;
        match inner.registry.reconcile(&obs, Utc::now()) {
            Reconciled::Added(device) => {
                added += 1;
                info!(device_id = %device.id, ip = %device.ip, mac = %device.mac, "new device");
                engine.raise(NewAlert::new(
                    AlertKind::NewDevice,
                    "New Device Detected",
                    format!("{} ({}) joined the network", device.name, device.ip),
                    Some(device.id),
                ));
                engine.publish(EngineEvent::DeviceAdded { device });
            }
            Reconciled::Updated {
                device,
                status_changed,
            } => {
                if status_changed {
                    debug!(device_id = %device.id, status = %device.status, "liveness changed");
                }
                engine.publish(EngineEvent::DeviceUpdated { device });
            }
        }
    }

    info!(count, added, "discovery pass finished");
    engine.publish(EngineEvent::DevicesDiscovered { count, added });
    Ok(CommandResult::Discovered { count, added })
}

// ── Quota accounting ─────────────────────────────────────────────

async fn run_quota_tick(engine: &Engine) {
    let inner = &engine.inner;
    let now = Utc::now();

    let rolled = inner
        .registry
        .update_all(|d| inner.accountant.roll_over(d, now));
    if !rolled.is_empty() {
        info!(devices = rolled.len(), "quota period rolled over");
        engine.publish(EngineEvent::QuotasReset {
            device_count: rolled.len(),
        });
    }

    let accrued = inner.registry.update_all(|d| inner.accountant.accrue(d));
    if !accrued.is_empty() {
        let devices: Vec<Arc<Device>> = accrued
            .iter()
            .filter_map(|id| inner.registry.device(*id))
            .collect();
        engine.publish(EngineEvent::UsageUpdated { devices });
    }

    let pending: Vec<DeviceId> = inner
        .registry
        .devices_snapshot()
        .iter()
        .filter(|d| d.quota_pending())
        .map(|d| d.id)
        .collect();
    join_all(pending.into_iter().map(|id| handle_breach(engine, id))).await;
}

/// Apply the breach action for one crossed device. Each crossing gets a
/// single actuation attempt; a failure is logged, marks the crossing
/// handled and waits for the next period.
async fn handle_breach(engine: &Engine, id: DeviceId) {
    let inner = &engine.inner;
    let _lock = engine.lock_device(id).await;
    let Some(device) = inner.registry.device(id) else {
        return;
    };
    if !device.quota_pending() {
        return;
    }

    let mut cap = None;
    let mut block = false;
    match device.breach_action {
        BreachAction::Block if device.status == DeviceStatus::Blocked => {}
        BreachAction::Block => {
            if !device.status.can_become(DeviceStatus::Blocked) {
                debug!(device_id = %id, status = %device.status, "breach deferred until online");
                return;
            }
            if let Err(e) = inner.actuator.block(&device).await {
                warn!(device_id = %id, error = %e, "quota block failed; not retried this period");
                let now = Utc::now();
                let _ = inner.registry.update(id, |d| d.quota_exceeded_at = Some(now));
                return;
            }
            block = true;
        }
        BreachAction::Throttle => {
            let throttle = inner.accountant.throttle();
            match inner.actuator.limit_bandwidth(&device, throttle).await {
                Ok(()) => cap = Some(throttle),
                Err(e) => {
                    warn!(device_id = %id, error = %e, "quota throttle unavailable; notifying only");
                }
            }
        }
        BreachAction::Notify => {}
    }

    let now = Utc::now();
    let Ok((device, ())) = inner.registry.update(id, |d| {
        d.quota_exceeded_at = Some(now);
        if block {
            d.mark_blocked();
        }
        if let Some(cap) = cap {
            d.bandwidth_limit = Some(cap);
        }
    }) else {
        return;
    };

    let alert = engine.raise(quota::breach_alert(&device));
    info!(
        device_id = %id,
        action = %device.breach_action,
        used_mb = device.data_used_mb,
        "quota exceeded"
    );
    engine.publish(EngineEvent::QuotaExceeded {
        action: device.breach_action,
        alert_id: alert.id,
        device,
    });
}

fn record_stats(engine: &Engine) {
    let registry = &engine.inner.registry;
    let stats = registry.compute_stats(Utc::now());
    registry.record_stats(stats.clone());
    engine.publish(EngineEvent::StatsUpdated { stats });
}

// ── Command routing ──────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Cutoff {
    Pause,
    Block,
}

async fn route_command(engine: &Engine, cmd: Command) -> Result<CommandResult, CoreError> {
    match cmd {
        Command::CreateDevice(req) => create_device(engine, req),
        Command::UpdateDevice { id, update } => update_device(engine, id, &update).await,
        Command::RemoveDevice { id } => remove_device(engine, id).await,

        Command::PauseDevice { id } => cut_off(engine, id, Cutoff::Pause).await,
        Command::BlockDevice { id } => cut_off(engine, id, Cutoff::Block).await,
        Command::ResumeDevice { id } => restore(engine, id, Cutoff::Pause).await,
        Command::UnblockDevice { id } => restore(engine, id, Cutoff::Block).await,

        Command::DiscoverNow => run_discovery(engine).await,
        Command::ScanDevice { id } => scan_device(engine, id).await,
        Command::AnalyzeTraffic { id } => analyze_traffic(engine, id).await,

        Command::LimitBandwidth { id, limit } => {
            let cap = limit.validate()?;
            limit_bandwidth(engine, id, cap).await
        }
        Command::BlockDomain(req) => block_domain(engine, &req).await,
        Command::UnblockDomain(req) => unblock_domain(engine, &req).await,
        Command::CreateFirewallRule(req) => create_firewall_rule(engine, &req).await,

        Command::PauseAll => Ok(pause_all(engine).await),
        Command::ResetAllQuotas => Ok(reset_all_quotas(engine)),

        Command::MarkAlertRead { id } => {
            let (alert, changed) = engine.inner.registry.mark_alert_read(id)?;
            if changed {
                engine.publish(EngineEvent::AlertRead {
                    alert: Arc::clone(&alert),
                });
            }
            Ok(CommandResult::Alert { alert })
        }
    }
}

fn create_device(engine: &Engine, req: CreateDeviceRequest) -> Result<CommandResult, CoreError> {
    req.validate()?;
    let now = Utc::now();
    let device = engine.inner.registry.insert(req.mac.clone(), |id| Device {
        id,
        ip: req.ip,
        mac: req.mac,
        name: req.name.trim().to_owned(),
        class: req.class,
        status: DeviceStatus::Unknown,
        data_used_mb: 0.0,
        current_usage_mbps: 0.0,
        quota_limit_mb: req.quota_limit_mb,
        quota_period: req.quota_period,
        breach_action: req.breach_action,
        period_started: now,
        quota_exceeded_at: None,
        is_blocked: false,
        last_seen: now,
        vendor: None,
        hostname: None,
        open_ports: Vec::new(),
        vulnerabilities: Vec::new(),
        priority: req.priority.unwrap_or(3),
        bandwidth_limit: None,
        blocked_domains: Vec::new(),
    })?;
    info!(device_id = %device.id, mac = %device.mac, "device registered");
    engine.publish(EngineEvent::DeviceAdded {
        device: Arc::clone(&device),
    });
    Ok(CommandResult::Device { device })
}

async fn update_device(
    engine: &Engine,
    id: DeviceId,
    update: &UpdateDeviceRequest,
) -> Result<CommandResult, CoreError> {
    update.validate()?;
    let _lock = engine.lock_device(id).await;
    let (device, ()) = engine.inner.registry.update(id, |d| {
        if let Some(name) = &update.name {
            d.name = name.trim().to_owned();
        }
        if let Some(ip) = update.ip {
            d.ip = ip;
        }
        if let Some(class) = update.class {
            d.class = class;
        }
        if update.remove_quota {
            d.quota_limit_mb = None;
        } else if let Some(limit) = update.quota_limit_mb {
            d.quota_limit_mb = Some(limit);
        }
        if let Some(period) = update.quota_period {
            d.quota_period = period;
        }
        if let Some(action) = update.breach_action {
            d.breach_action = action;
        }
        if let Some(priority) = update.priority {
            d.priority = priority;
        }
        // A raised limit re-arms breach handling for this period.
        if !d.quota_crossed() {
            d.quota_exceeded_at = None;
        }
    })?;
    engine.publish(EngineEvent::DeviceUpdated {
        device: Arc::clone(&device),
    });
    Ok(CommandResult::Device { device })
}

async fn remove_device(engine: &Engine, id: DeviceId) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let lock = engine.lock_device(id).await;
    let device = inner.registry.require(id)?;

    // Do not leave a poisoning session behind for a device nobody tracks.
    if device.is_blocked {
        if let Err(e) = inner.actuator.unblock(&device).await {
            warn!(device_id = %id, error = %e, "could not lift block of removed device");
        }
    }

    let device = inner.registry.remove(id)?;
    drop(lock);
    inner.device_locks.remove(&id);

    info!(device_id = %id, mac = %device.mac, "device removed");
    engine.publish(EngineEvent::DeviceRemoved {
        device_id: id,
        mac: device.mac.clone(),
    });
    Ok(CommandResult::Removed { device })
}

/// `online|unknown -> blocked`, committed only after the actuator
/// reports success.
async fn cut_off(engine: &Engine, id: DeviceId, kind: Cutoff) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let _lock = engine.lock_device(id).await;
    let device = inner.registry.require(id)?;
    if !device.status.can_become(DeviceStatus::Blocked) {
        debug!(device_id = %id, status = %device.status, "block is a no-op");
        return Ok(CommandResult::NoOp { device });
    }

    inner.actuator.block(&device).await?;
    let (device, ()) = inner.registry.update(id, Device::mark_blocked)?;

    match kind {
        Cutoff::Pause => engine.publish(EngineEvent::DevicePaused {
            device: Arc::clone(&device),
        }),
        Cutoff::Block => {
            engine.raise(NewAlert::new(
                AlertKind::DeviceBlocked,
                "Device Blocked",
                format!("{} ({}) has been blocked from network access", device.name, device.ip),
                Some(id),
            ));
            engine.publish(EngineEvent::DeviceBlocked {
                device: Arc::clone(&device),
            });
        }
    }
    Ok(CommandResult::Device { device })
}

/// `blocked -> online`, committed only after the actuator reports success.
async fn restore(engine: &Engine, id: DeviceId, kind: Cutoff) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let _lock = engine.lock_device(id).await;
    let device = inner.registry.require(id)?;
    if !(device.is_blocked || device.status == DeviceStatus::Blocked) {
        debug!(device_id = %id, status = %device.status, "unblock is a no-op");
        return Ok(CommandResult::NoOp { device });
    }

    inner.actuator.unblock(&device).await?;
    let (device, ()) = inner.registry.update(id, Device::mark_unblocked)?;

    match kind {
        Cutoff::Pause => engine.publish(EngineEvent::DeviceResumed {
            device: Arc::clone(&device),
        }),
        Cutoff::Block => {
            engine.raise(NewAlert::new(
                AlertKind::DeviceUnblocked,
                "Device Unblocked",
                format!("{} ({}) has been restored to network access", device.name, device.ip),
                Some(id),
            ));
            engine.publish(EngineEvent::DeviceUnblocked {
                device: Arc::clone(&device),
            });
        }
    }
    Ok(CommandResult::Device { device })
}

async fn scan_device(engine: &Engine, id: DeviceId) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let target = inner.registry.require(id)?;
    let report = engine.scan_address(target.ip).await;

    let (device, ()) = inner.registry.update(id, |d| {
        d.open_ports.clone_from(&report.open_ports);
        d.vulnerabilities.clone_from(&report.vulnerabilities);
    })?;

    let found = report.vulnerabilities.len();
    if found > 0 {
        engine.raise(NewAlert::new(
            AlertKind::SecurityVulnerability,
            "Security Vulnerabilities Found",
            format!("{} has {found} potential security issues", device.name),
            Some(id),
        ));
    }
    info!(device_id = %id, open = report.open_ports.len(), vulnerabilities = found, "scan finished");
    engine.publish(EngineEvent::DeviceScanned {
        device: Arc::clone(&device),
        vulnerabilities: found,
    });
    Ok(CommandResult::Scanned { device })
}

async fn analyze_traffic(engine: &Engine, id: DeviceId) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let device = inner.registry.require(id)?;
    let cfg = &inner.config;
    let lines = inner
        .tools
        .capture_packets(device.ip, cfg.capture_packets, cfg.capture_timeout)
        .await?;
    let analysis = analysis::tally(Some(id), device.ip, &lines);
    debug!(device_id = %id, packets = analysis.total_packets, "traffic analyzed");
    Ok(CommandResult::Traffic { analysis })
}

async fn limit_bandwidth(
    engine: &Engine,
    id: DeviceId,
    cap: BandwidthCap,
) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let _lock = engine.lock_device(id).await;
    let device = inner.registry.require(id)?;

    inner.actuator.limit_bandwidth(&device, cap).await?;
    let (device, ()) = inner.registry.update(id, |d| d.bandwidth_limit = Some(cap))?;

    engine.publish(EngineEvent::BandwidthLimited {
        device: Arc::clone(&device),
        download_mbps: cap.download_mbps,
        upload_mbps: cap.upload_mbps,
    });
    Ok(CommandResult::Device { device })
}

async fn block_domain(engine: &Engine, req: &DomainRequest) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let domain = req.validate()?;
    if let Some(id) = req.device_id {
        inner.registry.require(id)?;
    }

    let mut changed = inner.actuator.block_domain(&domain).await?;
    if let Some(id) = req.device_id {
        let (_, recorded) = inner.registry.update(id, |d| {
            let fresh = !d.blocked_domains.contains(&domain);
            if fresh {
                d.blocked_domains.push(domain.clone());
            }
            fresh
        })?;
        changed |= recorded;
    }

    if changed {
        engine.publish(EngineEvent::DomainBlocked {
            domain: domain.clone(),
            device_id: req.device_id,
        });
    }
    Ok(CommandResult::Domain { domain, changed })
}

/// Lift the global sinkhole and drop `domain` from the bookkeeping of the
/// named device, or of every device when none is named.
async fn unblock_domain(engine: &Engine, req: &DomainRequest) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let domain = req.validate()?;
    if let Some(id) = req.device_id {
        inner.registry.require(id)?;
    }

    let mut changed = inner.actuator.unblock_domain(&domain).await?;
    let forget = |d: &mut Device| {
        let before = d.blocked_domains.len();
        d.blocked_domains.retain(|x| *x != domain);
        d.blocked_domains.len() != before
    };
    changed |= match req.device_id {
        Some(id) => inner.registry.update(id, forget)?.1,
        None => !inner.registry.update_all(forget).is_empty(),
    };

    if changed {
        engine.publish(EngineEvent::DomainUnblocked {
            domain: domain.clone(),
            device_id: req.device_id,
        });
    }
    Ok(CommandResult::Domain { domain, changed })
}

async fn create_firewall_rule(
    engine: &Engine,
    req: &FirewallRuleRequest,
) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    let source_ip = match (req.source_ip, req.device_id) {
        (Some(ip), _) => Some(ip),
        (None, Some(id)) => Some(inner.registry.require(id)?.ip),
        (None, None) => None,
    };

    let rule = FirewallRule {
        id: inner.registry.allocate_rule_id(),
        name: req.name.trim().to_owned(),
        source_ip,
        destination_ip: req.destination_ip,
        port: req.port,
        protocol: req.protocol,
        action: req.action,
        priority: req.priority,
        is_active: true,
        device_id: req.device_id,
        created_at: Utc::now(),
    };
    inner.actuator.apply_firewall_rule(&rule).await?;
    let rule = inner.registry.record_rule(rule);

    info!(rule_id = %rule.id, name = %rule.name, action = %rule.action, "firewall rule applied");
    engine.publish(EngineEvent::FirewallRuleCreated {
        rule: Arc::clone(&rule),
    });
    Ok(CommandResult::Rule { rule })
}

/// One independent block attempt per online device; each device ends up
/// reflecting its own outcome. Publishes one bulk event.
async fn pause_all(engine: &Engine) -> CommandResult {
    let inner = &engine.inner;
    let targets: Vec<DeviceId> = inner
        .registry
        .devices_snapshot()
        .iter()
        .filter(|d| d.status.is_online())
        .map(|d| d.id)
        .collect();

    let attempts = targets.into_iter().map(|id| async move {
        let _lock = engine.lock_device(id).await;
        let device = inner.registry.device(id)?;
        if !device.status.is_online() {
            return None;
        }
        let outcome = match inner.actuator.block(&device).await {
            Ok(()) => inner.registry.update(id, Device::mark_blocked).is_ok(),
            Err(_) => false,
        };
        Some((id, outcome))
    });

    let (mut paused, mut failed) = (Vec::new(), Vec::new());
    for (id, ok) in join_all(attempts).await.into_iter().flatten() {
        if ok {
            paused.push(id);
        } else {
            failed.push(id);
        }
    }
    paused.sort_unstable();
    failed.sort_unstable();

    info!(paused = paused.len(), failed = failed.len(), "pause all finished");
    engine.publish(EngineEvent::AllDevicesPaused {
        paused: paused.clone(),
        failed: failed.clone(),
    });
    CommandResult::PauseAll { paused, failed }
}

/// Bookkeeping reset of every device. Never calls the actuator.
fn reset_all_quotas(engine: &Engine) -> CommandResult {
    let now = Utc::now();
    let reset = engine.inner.registry.update_all(|d| {
        d.reset_usage(now);
        true
    });
    let device_count = reset.len();
    info!(device_count, "all quotas reset");
    engine.publish(EngineEvent::QuotasReset { device_count });
    CommandResult::Reset { device_count }
}
