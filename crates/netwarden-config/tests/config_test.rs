#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use netwarden_config::{
    Config, ConfigError, load_config_from, resolve_router_password, save_config_to,
    to_engine_config,
};
use netwarden_core::{BlockBackendKind, UsageMeterKind};

const SAMPLE: &str = r#"
[engine]
interface = "wlan0"
gateway = "10.0.0.1"
discovery_interval = 120
quota_interval = 0
block_backend = "router"
usage_meter = "disabled"

[throttle]
download_mbps = 2.0
upload_mbps = 1.0

[router]
brand = "tp-link"
url = "http://10.0.0.1/api"
username = "netwarden-config-test"
password = "plaintext-secret"
password_env = "NETWARDEN_TEST_ROUTER_PASSWORD_UNSET"
capabilities = ["arp_control", "qos"]
insecure = true

[server]
listen = "0.0.0.0:9000"
"#;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.engine.interface, "eth0");
    assert_eq!(cfg.engine.discovery_interval, 60);
    assert!(cfg.router.is_none());
    assert_eq!(cfg.server.listen.port(), 7878);
}

#[test]
fn file_values_flow_into_engine_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let cfg = load_config_from(&path).unwrap();
    let engine = to_engine_config(&cfg).unwrap();

    assert_eq!(engine.interface, "wlan0");
    assert_eq!(engine.gateway, Some("10.0.0.1".parse().unwrap()));
    assert_eq!(engine.discovery_interval, Duration::from_secs(120));
    assert_eq!(engine.quota_interval, Duration::ZERO);
    assert_eq!(engine.block_backend, BlockBackendKind::Router);
    assert_eq!(engine.usage_meter, UsageMeterKind::Disabled);
    assert!((engine.throttle.download_mbps - 2.0).abs() < f64::EPSILON);

    let router = engine.router.unwrap();
    assert_eq!(router.brand.to_string(), "tp-link");
    assert_eq!(router.capabilities.len(), 2);
    assert_eq!(router.password.expose_secret(), "plaintext-secret");
}

#[test]
fn router_backend_without_router_is_rejected() {
    let mut cfg = Config::default();
    cfg.engine.block_backend = BlockBackendKind::Router;
    let err = to_engine_config(&cfg).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
}

#[test]
fn password_chain_reports_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let mut router = load_config_from(&path).unwrap().router.unwrap();
    router.password = None;

    let err = resolve_router_password(&router).unwrap_err();
    assert!(matches!(err, ConfigError::NoCredentials { ref username } if username == "netwarden-config-test"));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.engine.interface = "br0".into();
    cfg.engine.scan_ports = vec![22, 443];
    save_config_to(&cfg, &path).unwrap();

    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.engine.interface, "br0");
    assert_eq!(loaded.engine.scan_ports, vec![22, 443]);
}
