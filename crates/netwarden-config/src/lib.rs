//! Configuration for the netwarden daemon and CLI.
//!
//! TOML file, `NETWARDEN_`-prefixed environment overrides, router
//! credential resolution (env + keyring + plaintext), and translation to
//! `netwarden_core::EngineConfig`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use netwarden_api::{RouterBrand, RouterCapability, TlsMode};
use netwarden_core::config::{DISCOVERY_PORTS, SCAN_PORTS};
use netwarden_core::{BandwidthCap, BlockBackendKind, EngineConfig, RouterProfile, UsageMeterKind};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service name for stored router passwords.
const KEYRING_SERVICE: &str = "netwarden";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no router password configured for user '{username}'")]
    NoCredentials { username: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    /// Cap applied by the `throttle` breach action.
    #[serde(default)]
    pub throttle: ThrottleSection,

    /// Router control plane. Required by the `router` block backend and
    /// by bandwidth limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSection>,

    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Skip default-route detection and use this gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,

    /// Seconds between discovery passes. 0 disables.
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: u64,

    /// Seconds between quota ticks. 0 disables.
    #[serde(default = "default_quota_interval")]
    pub quota_interval: u64,

    /// Seconds between stats snapshots. 0 disables.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_candidate_timeout")]
    pub candidate_timeout: u64,

    #[serde(default = "default_concurrency")]
    pub discovery_concurrency: usize,

    #[serde(default = "default_discovery_ports")]
    pub discovery_ports: Vec<u16>,

    #[serde(default = "default_scan_ports")]
    pub scan_ports: Vec<u16>,

    #[serde(default)]
    pub block_backend: BlockBackendKind,

    #[serde(default)]
    pub usage_meter: UsageMeterKind,

    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,

    #[serde(default = "default_capture_packets")]
    pub capture_packets: usize,

    #[serde(default = "default_capture_timeout")]
    pub capture_timeout: u64,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_stats_history")]
    pub stats_history: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            gateway: None,
            discovery_interval: default_discovery_interval(),
            quota_interval: default_quota_interval(),
            stats_interval: default_stats_interval(),
            probe_timeout_ms: default_probe_timeout_ms(),
            candidate_timeout: default_candidate_timeout(),
            discovery_concurrency: default_concurrency(),
            discovery_ports: default_discovery_ports(),
            scan_ports: default_scan_ports(),
            block_backend: BlockBackendKind::default(),
            usage_meter: UsageMeterKind::default(),
            hosts_file: default_hosts_file(),
            capture_packets: default_capture_packets(),
            capture_timeout: default_capture_timeout(),
            event_capacity: default_event_capacity(),
            stats_history: default_stats_history(),
        }
    }
}

fn default_interface() -> String {
    "eth0".into()
}
fn default_discovery_interval() -> u64 {
    60
}
fn default_quota_interval() -> u64 {
    10
}
fn default_stats_interval() -> u64 {
    30
}
fn default_probe_timeout_ms() -> u64 {
    1000
}
fn default_candidate_timeout() -> u64 {
    5
}
fn default_concurrency() -> usize {
    16
}
fn default_discovery_ports() -> Vec<u16> {
    DISCOVERY_PORTS.to_vec()
}
fn default_scan_ports() -> Vec<u16> {
    SCAN_PORTS.to_vec()
}
fn default_hosts_file() -> PathBuf {
    PathBuf::from("/etc/hosts")
}
fn default_capture_packets() -> usize {
    100
}
fn default_capture_timeout() -> u64 {
    10
}
fn default_event_capacity() -> usize {
    256
}
fn default_stats_history() -> usize {
    288
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottleSection {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl Default for ThrottleSection {
    fn default() -> Self {
        Self {
            download_mbps: 1.0,
            upload_mbps: 0.5,
        }
    }
}

/// Router control-plane profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterSection {
    #[serde(default = "default_brand")]
    pub brand: RouterBrand,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// API root (e.g., "http://192.168.1.1/api").
    pub url: String,

    pub username: String,

    /// Password (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Directives the firmware accepts.
    #[serde(default)]
    pub capabilities: Vec<RouterCapability>,

    /// Request timeout in seconds.
    #[serde(default = "default_router_timeout")]
    pub timeout: u64,

    /// Accept self-signed certificates.
    #[serde(default)]
    pub insecure: bool,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

fn default_brand() -> RouterBrand {
    RouterBrand::Generic
}
fn default_router_timeout() -> u64 {
    10
}

/// Observer endpoint of the daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7878))
}

impl Config {
    /// A copy safe to print: plaintext secrets are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(router) = copy.router.as_mut() {
            if router.password.is_some() {
                router.password = Some("********".into());
            }
        }
        copy
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "netwarden", "netwarden").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("netwarden");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields defaults.
///
/// Environment keys nest with a double underscore:
/// `NETWARDEN_ENGINE__INTERFACE=wlan0`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETWARDEN_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the router password: env var named by `password_env`, then the
/// system keyring, then plaintext in the file.
pub fn resolve_router_password(router: &RouterSection) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = router.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("router/{}", router.username))
    {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = router.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        username: router.username.clone(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn router_profile(router: &RouterSection) -> Result<RouterProfile, ConfigError> {
    let url: url::Url = router.url.parse().map_err(|_| ConfigError::Validation {
        field: "router.url".into(),
        reason: format!("invalid URL: {}", router.url),
    })?;
    let password = resolve_router_password(router)?;

    let tls = if router.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = router.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(RouterProfile {
        brand: router.brand,
        model: router.model.clone(),
        url,
        username: router.username.clone(),
        password,
        capabilities: router.capabilities.clone(),
        timeout: Duration::from_secs(router.timeout),
        tls,
    })
}

/// Build a validated `EngineConfig`.
pub fn to_engine_config(cfg: &Config) -> Result<EngineConfig, ConfigError> {
    let engine = &cfg.engine;
    let router = cfg.router.as_ref().map(router_profile).transpose()?;

    let config = EngineConfig {
        interface: engine.interface.clone(),
        gateway: engine.gateway,
        discovery_interval: Duration::from_secs(engine.discovery_interval),
        quota_interval: Duration::from_secs(engine.quota_interval),
        stats_interval: Duration::from_secs(engine.stats_interval),
        probe_timeout: Duration::from_millis(engine.probe_timeout_ms),
        candidate_timeout: Duration::from_secs(engine.candidate_timeout),
        discovery_concurrency: engine.discovery_concurrency,
        discovery_ports: engine.discovery_ports.clone(),
        scan_ports: engine.scan_ports.clone(),
        block_backend: engine.block_backend,
        router,
        hosts_file: engine.hosts_file.clone(),
        throttle: BandwidthCap {
            download_mbps: cfg.throttle.download_mbps,
            upload_mbps: cfg.throttle.upload_mbps,
        },
        usage_meter: engine.usage_meter,
        capture_packets: engine.capture_packets,
        capture_timeout: Duration::from_secs(engine.capture_timeout),
        event_capacity: engine.event_capacity,
        stats_history: engine.stats_history,
    };

    config.validate().map_err(|e| ConfigError::Validation {
        field: "engine".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}
