#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netwarden_api::{RouterBrand, RouterCapability, RouterClient, TransportConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use netwarden_core::actuator::DomainBlocklist;
use netwarden_core::{
    AccessActuator, AlertKind, ArpEntry, BlockBackend, BreachAction, Command, CommandResult,
    CoreError, CreateDeviceRequest, Device, DeviceClass, DeviceFilter, DeviceId, DeviceStatus,
    DomainRequest, Engine, EngineConfig, EngineEvent, EngineParts, EngineState, FirewallAction,
    FirewallRuleRequest, MacAddress, NetworkTools, QuotaPeriod, RouterSession, UpdateDeviceRequest,
    UsageMeter, UsageSample,
};

// ── Fakes ───────────────────────────────────────────────────────────

/// A LAN where every host answers ping and has telnet and http open.
#[derive(Default)]
struct FakeLan {
    table: Mutex<Vec<ArpEntry>>,
    table_delay: Duration,
    firewall: Mutex<Vec<Vec<String>>>,
    capture: Vec<String>,
}

impl FakeLan {
    fn with_hosts(hosts: &[(&str, &str)]) -> Self {
        let table = hosts
            .iter()
            .map(|(ip, mac)| ArpEntry {
                ip: ip.parse().unwrap(),
                mac: mac.parse().unwrap(),
            })
            .collect();
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }
}

#[async_trait]
impl NetworkTools for FakeLan {
    async fn read_address_table(&self) -> Result<Vec<ArpEntry>, CoreError> {
        if !self.table_delay.is_zero() {
            tokio::time::sleep(self.table_delay).await;
        }
        Ok(self.table.lock().unwrap().clone())
    }

    async fn reverse_lookup(&self, _: IpAddr, _: Duration) -> Result<Option<String>, CoreError> {
        Ok(None)
    }

    async fn ping(&self, _: IpAddr, _: Duration) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn probe_port(&self, _: IpAddr, port: u16, _: Duration) -> bool {
        matches!(port, 23 | 80)
    }

    async fn default_gateway(&self) -> Result<Option<IpAddr>, CoreError> {
        Ok(Some("192.168.1.1".parse().unwrap()))
    }

    async fn spoof(&self, _: IpAddr, _: IpAddr) -> Result<(), CoreError> {
        Ok(())
    }

    async fn stop_spoofing(&self, _: IpAddr) -> Result<(), CoreError> {
        Ok(())
    }

    async fn restore_binding(
        &self,
        _: IpAddr,
        _: IpAddr,
        _: &MacAddress,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    async fn apply_firewall_rule(&self, args: &[String]) -> Result<(), CoreError> {
        self.firewall.lock().unwrap().push(args.to_vec());
        Ok(())
    }

    async fn capture_packets(
        &self,
        _: IpAddr,
        _: usize,
        _: Duration,
    ) -> Result<Vec<String>, CoreError> {
        Ok(self.capture.clone())
    }
}

/// Counts directives; refuses to block addresses in `refuse`.
#[derive(Default)]
struct FakeBackend {
    refuse: Mutex<HashSet<IpAddr>>,
    attempts: AtomicUsize,
    blocks: AtomicUsize,
    unblocks: AtomicUsize,
}

impl FakeBackend {
    fn refuse(&self, ip: &str) {
        self.refuse.lock().unwrap().insert(ip.parse().unwrap());
    }

    fn accept_all(&self) {
        self.refuse.lock().unwrap().clear();
    }
}

#[async_trait]
impl BlockBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn block(&self, device: &Device) -> Result<(), CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.lock().unwrap().contains(&device.ip) {
            return Err(CoreError::ActuationFailed {
                operation: "spoof",
                reason: "arpspoof exited with 1".into(),
            });
        }
        self.blocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unblock(&self, _: &Device) -> Result<(), CoreError> {
        self.unblocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 10 MB and 8 Mbps per tick for every online device.
struct FixedMeter;

impl UsageMeter for FixedMeter {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn sample(&self, _: &Device) -> UsageSample {
        UsageSample {
            throughput_mbps: 8.0,
            increment_mb: 10.0,
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────────

const LAPTOP: (&str, &str) = ("192.168.1.10", "00:1a:2b:00:00:10");
const PHONE: (&str, &str) = ("192.168.1.20", "3c:2e:f9:00:00:20");

struct Harness {
    engine: Engine,
    lan: Arc<FakeLan>,
    backend: Arc<FakeBackend>,
    dir: TempDir,
}

async fn harness_with(lan: FakeLan, tune: impl FnOnce(&mut EngineConfig)) -> Harness {
    harness_with_router(lan, None, tune).await
}

async fn harness_with_router(
    lan: FakeLan,
    router: Option<Arc<RouterSession>>,
    tune: impl FnOnce(&mut EngineConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig {
        hosts_file: dir.path().join("hosts"),
        ..EngineConfig::default().oneshot()
    };
    tune(&mut config);

    let lan = Arc::new(lan);
    let backend = Arc::new(FakeBackend::default());
    let tools: Arc<dyn NetworkTools> = lan.clone();
    let actuator = AccessActuator::new(
        backend.clone(),
        router,
        Arc::clone(&tools),
        DomainBlocklist::new(config.hosts_file.clone()),
    );
    let engine = Engine::with_parts(
        config,
        EngineParts {
            tools,
            actuator,
            meter: Arc::new(FixedMeter),
        },
    )
    .unwrap();
    engine.start().await.unwrap();

    Harness {
        engine,
        lan,
        backend,
        dir,
    }
}

async fn harness() -> Harness {
    harness_with(FakeLan::with_hosts(&[LAPTOP, PHONE]), |_| {}).await
}

/// Two passes: the first registers everything as `unknown`, the second
/// confirms liveness.
async fn discover_online(engine: &Engine) {
    for _ in 0..2 {
        engine.execute(Command::DiscoverNow).await.unwrap();
    }
}

fn by_ip(engine: &Engine, ip: &str) -> Arc<Device> {
    engine.find_by_ip(ip.parse().unwrap()).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<Arc<EngineEvent>>) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
    }
    kinds
}

fn create_request(name: &str, ip: &str, mac: &str) -> CreateDeviceRequest {
    CreateDeviceRequest {
        name: name.into(),
        ip: ip.parse().unwrap(),
        mac: mac.parse().unwrap(),
        class: DeviceClass::Tv,
        quota_limit_mb: None,
        quota_period: QuotaPeriod::Daily,
        breach_action: BreachAction::Block,
        priority: None,
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn start_and_shutdown_update_state_without_watchers() {
    let h = harness().await;
    assert_eq!(*h.engine.state().borrow(), EngineState::Running);
    assert!(h.engine.execute(Command::DiscoverNow).await.is_ok());

    h.engine.shutdown().await;
    assert_eq!(*h.engine.state().borrow(), EngineState::Stopped);
}

#[tokio::test]
async fn commands_rejected_once_stopped() {
    let h = harness().await;
    h.engine.shutdown().await;

    let err = h.engine.execute(Command::DiscoverNow).await.unwrap_err();
    assert!(matches!(err, CoreError::EngineStopped));

    // Restart reuses the fresh command channel.
    h.engine.start().await.unwrap();
    assert!(h.engine.execute(Command::DiscoverNow).await.is_ok());
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn first_pass_registers_unknown_devices_with_alerts() {
    let h = harness().await;
    let mut rx = h.engine.events();

    let result = h.engine.execute(Command::DiscoverNow).await.unwrap();
    assert!(matches!(result, CommandResult::Discovered { count: 2, added: 2 }));

    let kinds = drain(&mut rx);
    assert_eq!(kinds.iter().filter(|k| **k == "device_added").count(), 2);
    assert_eq!(kinds.last(), Some(&"devices_discovered"));

    let laptop = by_ip(&h.engine, LAPTOP.0);
    assert_eq!(laptop.status, DeviceStatus::Unknown);
    assert_eq!(laptop.name, "Device-192.168.1.10");
    assert_eq!(laptop.open_ports, vec![23, 80]);

    let alerts = h.engine.alerts();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.kind == AlertKind::NewDevice));
}

#[tokio::test]
async fn second_pass_updates_in_place() {
    let h = harness().await;
    h.engine.execute(Command::DiscoverNow).await.unwrap();
    let first_id = by_ip(&h.engine, LAPTOP.0).id;

    // The laptop moved to a new address; its hardware address is the key.
    h.lan.table.lock().unwrap()[0].ip = "192.168.1.11".parse().unwrap();
    let mut rx = h.engine.events();
    let result = h.engine.execute(Command::DiscoverNow).await.unwrap();

    assert!(matches!(result, CommandResult::Discovered { count: 2, added: 0 }));
    assert_eq!(
        drain(&mut rx),
        vec!["device_updated", "device_updated", "devices_discovered"]
    );
    let laptop = by_ip(&h.engine, "192.168.1.11");
    assert_eq!(laptop.id, first_id);
    assert_eq!(laptop.status, DeviceStatus::Online);
    assert_eq!(h.engine.list_devices().len(), 2);
    assert_eq!(h.engine.alerts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn overlapping_discovery_is_refused() {
    let lan = FakeLan {
        table_delay: Duration::from_secs(2),
        ..FakeLan::with_hosts(&[LAPTOP])
    };
    let h = harness_with(lan, |_| {}).await;

    let (a, b) = tokio::join!(
        h.engine.execute(Command::DiscoverNow),
        h.engine.execute(Command::DiscoverNow),
    );
    let refused = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(CoreError::DiscoveryInProgress)))
        .count();
    assert_eq!(refused, 1);
    assert_eq!(h.engine.list_devices().len(), 1);
}

// ── Device CRUD ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_rejects_duplicate_hardware_address() {
    let h = harness().await;
    let req = create_request("Kitchen TV", "192.168.1.30", "a4:5e:60:00:00:30");
    let created = h
        .engine
        .execute(Command::CreateDevice(req.clone()))
        .await
        .unwrap();
    let device = created.device().unwrap();
    assert_eq!(device.status, DeviceStatus::Unknown);
    assert!(h.engine.alerts().is_empty());

    let mut rx = h.engine.events();
    let err = h
        .engine
        .execute(Command::CreateDevice(CreateDeviceRequest {
            ip: "192.168.1.31".parse().unwrap(),
            ..req
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateMac { existing, .. } if existing == device.id));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.engine.list_devices().len(), 1);
}

#[tokio::test]
async fn malformed_payload_never_reaches_registry() {
    let h = harness().await;
    let mut rx = h.engine.events();

    let mut req = create_request("  ", "192.168.1.30", "a4:5e:60:00:00:30");
    let err = h
        .engine
        .execute(Command::CreateDevice(req.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));

    req.name = "Kitchen TV".into();
    req.quota_limit_mb = Some(-5.0);
    assert!(h.engine.execute(Command::CreateDevice(req)).await.is_err());

    assert!(h.engine.list_devices().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn unknown_ids_report_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .execute(Command::BlockDevice { id: DeviceId(99) })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { id } if id == DeviceId(99)));
}

#[tokio::test]
async fn update_edits_policy_fields_only() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;

    let result = h
        .engine
        .execute(Command::UpdateDevice {
            id,
            update: UpdateDeviceRequest {
                name: Some("Work laptop".into()),
                quota_limit_mb: Some(500.0),
                breach_action: Some(BreachAction::Notify),
                ..UpdateDeviceRequest::default()
            },
        })
        .await
        .unwrap();

    let device = result.device().unwrap();
    assert_eq!(device.name, "Work laptop");
    assert_eq!(device.quota_limit_mb, Some(500.0));
    assert_eq!(device.breach_action, BreachAction::Notify);
    assert_eq!(device.status, DeviceStatus::Online);
}

#[tokio::test]
async fn removing_blocked_device_lifts_block() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    h.engine.execute(Command::BlockDevice { id }).await.unwrap();

    let mut rx = h.engine.events();
    h.engine
        .execute(Command::RemoveDevice { id })
        .await
        .unwrap();

    assert_eq!(h.backend.unblocks.load(Ordering::SeqCst), 1);
    assert_eq!(drain(&mut rx), vec!["device_removed"]);
    assert!(h.engine.get_device(id).is_err());

    // The hardware address is free again: rediscovery registers a new id.
    h.engine.execute(Command::DiscoverNow).await.unwrap();
    assert_ne!(by_ip(&h.engine, LAPTOP.0).id, id);
}

// ── State machine ───────────────────────────────────────────────────

#[tokio::test]
async fn block_and_unblock_round_trip() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    let mut rx = h.engine.events();

    let blocked = h.engine.execute(Command::BlockDevice { id }).await.unwrap();
    let device = blocked.device().unwrap();
    assert_eq!(device.status, DeviceStatus::Blocked);
    assert!(device.is_blocked);

    let restored = h
        .engine
        .execute(Command::UnblockDevice { id })
        .await
        .unwrap();
    let device = restored.device().unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(!device.is_blocked);

    assert_eq!(drain(&mut rx), vec!["device_blocked", "device_unblocked"]);
    let kinds: Vec<AlertKind> = h.engine.alerts().iter().take(2).map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::DeviceUnblocked, AlertKind::DeviceBlocked]);
}

#[tokio::test]
async fn device_feed_follows_registry() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, PHONE.0).id;

    let all = h.engine.devices();
    assert_eq!(all.snapshot().len(), 2);

    let mut blocked = h.engine.devices().filtered(DeviceFilter::Blocked);
    assert!(blocked.snapshot().is_empty());

    h.engine.execute(Command::BlockDevice { id }).await.unwrap();
    let table = blocked.changed().await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].id, id);

    let online = h
        .engine
        .devices()
        .filtered(DeviceFilter::Status(DeviceStatus::Online));
    assert_eq!(online.snapshot().len(), 1);
}

#[tokio::test]
async fn pause_and_resume_raise_no_alerts() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, PHONE.0).id;
    let before = h.engine.alerts().len();
    let mut rx = h.engine.events();

    h.engine.execute(Command::PauseDevice { id }).await.unwrap();
    h.engine.execute(Command::ResumeDevice { id }).await.unwrap();

    assert_eq!(drain(&mut rx), vec!["device_paused", "device_resumed"]);
    assert_eq!(h.engine.alerts().len(), before);
}

#[tokio::test]
async fn invalid_transition_is_a_silent_no_op() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    let mut rx = h.engine.events();

    let result = h
        .engine
        .execute(Command::UnblockDevice { id })
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::NoOp { .. }));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.backend.unblocks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_actuation_leaves_device_untouched() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    h.backend.refuse(LAPTOP.0);
    let mut rx = h.engine.events();

    let err = h
        .engine
        .execute(Command::BlockDevice { id })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ActuationFailed { operation: "block", .. }));

    let device = h.engine.get_device(id).unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(!device.is_blocked);
    assert!(drain(&mut rx).is_empty());
}

// ── Bulk ────────────────────────────────────────────────────────────

#[tokio::test]
async fn pause_all_reports_each_outcome() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let laptop = by_ip(&h.engine, LAPTOP.0).id;
    let phone = by_ip(&h.engine, PHONE.0).id;
    h.backend.refuse(PHONE.0);
    let mut rx = h.engine.events();

    let result = h.engine.execute(Command::PauseAll).await.unwrap();
    let CommandResult::PauseAll { paused, failed } = result else {
        panic!("unexpected result {result:?}");
    };
    assert_eq!(paused, vec![laptop]);
    assert_eq!(failed, vec![phone]);

    assert_eq!(h.engine.get_device(laptop).unwrap().status, DeviceStatus::Blocked);
    assert_eq!(h.engine.get_device(phone).unwrap().status, DeviceStatus::Online);
    assert_eq!(drain(&mut rx), vec!["all_devices_paused"]);
}

#[tokio::test]
async fn reset_all_quotas_is_bookkeeping_only() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    h.engine.execute(Command::BlockDevice { id }).await.unwrap();
    let mut rx = h.engine.events();

    let result = h.engine.execute(Command::ResetAllQuotas).await.unwrap();
    assert!(matches!(result, CommandResult::Reset { device_count: 2 }));

    let device = h.engine.get_device(id).unwrap();
    assert!(device.data_used_mb.abs() < f64::EPSILON);
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(!device.is_blocked);
    assert_eq!(h.backend.unblocks.load(Ordering::SeqCst), 0);
    assert_eq!(drain(&mut rx), vec!["quotas_reset"]);
}

// ── Quota accounting ────────────────────────────────────────────────

async fn quota_harness(action: BreachAction) -> (Harness, DeviceId) {
    let h = harness_with(FakeLan::with_hosts(&[LAPTOP]), |c| {
        c.quota_interval = Duration::from_secs(10);
    })
    .await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    h.engine
        .execute(Command::UpdateDevice {
            id,
            update: UpdateDeviceRequest {
                quota_limit_mb: Some(15.0),
                breach_action: Some(action),
                ..UpdateDeviceRequest::default()
            },
        })
        .await
        .unwrap();
    (h, id)
}

#[tokio::test(start_paused = true)]
async fn quota_breach_blocks_exactly_once() {
    let (h, id) = quota_harness(BreachAction::Block).await;
    let mut rx = h.engine.events();

    tokio::time::sleep(Duration::from_secs(25)).await;
    let kinds = drain(&mut rx);
    assert_eq!(kinds, vec!["usage_updated", "usage_updated", "quota_exceeded"]);

    let device = h.engine.get_device(id).unwrap();
    assert_eq!(device.status, DeviceStatus::Blocked);
    assert!(device.quota_exceeded_at.is_some());
    assert!((device.data_used_mb - 20.0).abs() < f64::EPSILON);
    assert_eq!(
        h.engine.unread_alerts()[0].title,
        "Data Quota Exceeded"
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!drain(&mut rx).contains(&"quota_exceeded"));
    assert_eq!(h.backend.blocks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_quota_block_is_attempted_once_per_crossing() {
    let (h, id) = quota_harness(BreachAction::Block).await;
    h.backend.refuse(LAPTOP.0);
    let mut rx = h.engine.events();

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(h.backend.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.blocks.load(Ordering::SeqCst), 0);
    assert!(!drain(&mut rx).contains(&"quota_exceeded"));
    assert!(h.engine.alerts().iter().all(|a| a.kind != AlertKind::QuotaExceeded));

    let device = h.engine.get_device(id).unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(!device.is_blocked);
    assert!(device.quota_exceeded_at.is_some());

    // Accepting blocks later does not trigger a retry within the period.
    h.backend.accept_all();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.backend.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.get_device(id).unwrap().status, DeviceStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn throttle_without_router_falls_back_to_notify() {
    let (h, id) = quota_harness(BreachAction::Throttle).await;
    let mut rx = h.engine.events();

    tokio::time::sleep(Duration::from_secs(25)).await;
    let exceeded: Vec<Arc<EngineEvent>> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| e.kind() == "quota_exceeded")
        .collect();
    assert_eq!(exceeded.len(), 1);
    assert!(matches!(
        exceeded[0].as_ref(),
        EngineEvent::QuotaExceeded { action: BreachAction::Throttle, .. }
    ));

    let device = h.engine.get_device(id).unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(device.bandwidth_limit.is_none());
    assert!(device.quota_exceeded_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn raising_the_limit_rearms_breach_handling() {
    let (h, id) = quota_harness(BreachAction::Notify).await;
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(h.engine.get_device(id).unwrap().quota_exceeded_at.is_some());

    let result = h
        .engine
        .execute(Command::UpdateDevice {
            id,
            update: UpdateDeviceRequest {
                quota_limit_mb: Some(1000.0),
                ..UpdateDeviceRequest::default()
            },
        })
        .await
        .unwrap();
    assert!(result.device().unwrap().quota_exceeded_at.is_none());
}

// ── Scans and analysis ──────────────────────────────────────────────

#[tokio::test]
async fn scan_records_ports_and_flags_vulnerabilities() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, PHONE.0).id;
    let mut rx = h.engine.events();

    let result = h.engine.execute(Command::ScanDevice { id }).await.unwrap();
    let device = result.device().unwrap();
    assert_eq!(device.open_ports, vec![23, 80]);
    assert_eq!(device.vulnerabilities.len(), 1);

    assert_eq!(drain(&mut rx), vec!["device_scanned"]);
    let alert = &h.engine.alerts()[0];
    assert_eq!(alert.kind, AlertKind::SecurityVulnerability);
    assert_eq!(alert.device_id, Some(id));
}

#[tokio::test]
async fn traffic_analysis_tallies_capture() {
    let lan = FakeLan {
        capture: vec![
            "12:00:00.1 IP 192.168.1.10.5353 > 8.8.8.8.53: 1234+ A? example.com. (29)".into(),
            "12:00:00.2 IP 192.168.1.10.443 > 1.1.1.1.443: Flags [S], seq 1, length 0".into(),
        ],
        ..FakeLan::with_hosts(&[LAPTOP])
    };
    let h = harness_with(lan, |_| {}).await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;

    let result = h
        .engine
        .execute(Command::AnalyzeTraffic { id })
        .await
        .unwrap();
    let CommandResult::Traffic { analysis } = result else {
        panic!("unexpected result {result:?}");
    };
    assert_eq!(analysis.total_packets, 2);
    assert_eq!(analysis.device_id, Some(id));
}

// ── Policy layers ───────────────────────────────────────────────────

#[tokio::test]
async fn bandwidth_limit_without_router_is_unsupported() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;

    let err = h
        .engine
        .execute(Command::LimitBandwidth {
            id,
            limit: netwarden_core::BandwidthRequest {
                download_mbps: 5.0,
                upload_mbps: 1.0,
            },
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }));
    assert!(h.engine.get_device(id).unwrap().bandwidth_limit.is_none());
}

#[tokio::test]
async fn domain_blocks_are_global_and_tracked_per_device() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, LAPTOP.0).id;
    let mut rx = h.engine.events();

    let req = DomainRequest {
        domain: "www.Example.com".into(),
        device_id: Some(id),
    };
    let result = h
        .engine
        .execute(Command::BlockDomain(req.clone()))
        .await
        .unwrap();
    assert!(matches!(
        result,
        CommandResult::Domain { ref domain, changed: true } if domain == "example.com"
    ));
    let hosts = std::fs::read_to_string(h.dir.path().join("hosts")).unwrap();
    assert!(hosts.contains("0.0.0.0 example.com"));
    assert!(hosts.contains("0.0.0.0 www.example.com"));
    assert_eq!(
        h.engine.get_device(id).unwrap().blocked_domains,
        vec!["example.com".to_owned()]
    );

    // Repeating the block changes nothing and publishes nothing.
    let again = h.engine.execute(Command::BlockDomain(req)).await.unwrap();
    assert!(matches!(again, CommandResult::Domain { changed: false, .. }));

    h.engine
        .execute(Command::UnblockDomain(DomainRequest::new("example.com")))
        .await
        .unwrap();
    assert!(h.engine.get_device(id).unwrap().blocked_domains.is_empty());
    assert_eq!(drain(&mut rx), vec!["domain_blocked", "domain_unblocked"]);
}

#[tokio::test]
async fn firewall_rule_defaults_source_to_device_address() {
    let h = harness().await;
    discover_online(&h.engine).await;
    let id = by_ip(&h.engine, PHONE.0).id;

    let result = h
        .engine
        .execute(Command::CreateFirewallRule(FirewallRuleRequest {
            name: "no ssh".into(),
            source_ip: None,
            destination_ip: None,
            port: Some(22),
            protocol: None,
            action: FirewallAction::Block,
            priority: 10,
            device_id: Some(id),
        }))
        .await
        .unwrap();
    let CommandResult::Rule { rule } = result else {
        panic!("unexpected result {result:?}");
    };
    assert_eq!(rule.source_ip, Some(PHONE.0.parse().unwrap()));

    let applied = h.lan.firewall.lock().unwrap().clone();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].contains(&"DROP".to_owned()));
    assert_eq!(h.engine.firewall_rules().len(), 1);
}

// ── Alerts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn marking_alert_read_is_idempotent() {
    let h = harness().await;
    h.engine.execute(Command::DiscoverNow).await.unwrap();
    let alert_id = h.engine.alerts()[0].id;
    let mut rx = h.engine.events();

    for _ in 0..2 {
        let result = h
            .engine
            .execute(Command::MarkAlertRead { id: alert_id })
            .await
            .unwrap();
        assert!(matches!(result, CommandResult::Alert { ref alert } if alert.is_read));
    }
    assert_eq!(drain(&mut rx), vec!["alert_read"]);
    assert_eq!(h.engine.unread_alerts().len(), 1);
}

// ── Stats ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stats_snapshots_are_bounded() {
    let h = harness_with(FakeLan::with_hosts(&[LAPTOP, PHONE]), |c| {
        c.stats_interval = Duration::from_secs(30);
        c.stats_history = 3;
    })
    .await;
    discover_online(&h.engine).await;

    tokio::time::sleep(Duration::from_secs(150)).await;
    let history = h.engine.stats_history();
    assert_eq!(history.len(), 3);
    let latest = h.engine.latest_stats().unwrap();
    assert_eq!(latest.total_devices, 2);
    assert_eq!(latest.active_connections, 2);
}

// ── Router status ───────────────────────────────────────────────────

#[tokio::test]
async fn router_status_without_router_is_unconfigured() {
    let h = harness().await;
    let status = h.engine.router_status().await;
    assert!(!status.configured);
    assert!(!status.connected);
    assert_eq!(status.message.as_deref(), Some("no router configured"));
}

#[tokio::test]
async fn router_status_logs_in_and_reports_capabilities() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "capabilities": ["firewall", "qos"] }
        })))
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = RouterClient::new(
        endpoint,
        RouterBrand::TpLink,
        vec![RouterCapability::Firewall],
        &TransportConfig::default(),
    )
    .unwrap();
    let session = RouterSession::new(client, "admin".into(), "secret".to_owned().into());
    let h = harness_with_router(FakeLan::default(), Some(Arc::new(session)), |_| {}).await;

    let status = h.engine.router_status().await;
    assert!(status.configured);
    assert!(status.connected);
    assert_eq!(status.brand.as_deref(), Some("tp-link"));
    assert_eq!(status.capabilities, vec!["firewall", "qos"]);
    assert!(status.message.is_none());
}
