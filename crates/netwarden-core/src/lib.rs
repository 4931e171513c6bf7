//! Device control engine for a local network.
//!
//! This crate owns the device registry, the background workers that keep
//! it current, and the actuators that enforce access decisions:
//!
//! - **[`Engine`]**: Central facade. [`start()`](Engine::start) spawns the
//!   command processor plus periodic discovery, quota and stats tasks;
//!   [`Engine::oneshot()`](Engine::oneshot) runs a single CLI operation with
//!   no background work.
//!
//! - **[`DeviceRegistry`]**: Lock-sharded storage built on
//!   `EntityCollection<T>` (`DashMap` + `tokio::sync::watch`), unique by
//!   hardware address. Also holds alerts, firewall rules and a bounded stats
//!   history.
//!
//! - **[`Command`]**: Typed mutation requests routed through an `mpsc`
//!   channel. Every successful mutation publishes one [`EngineEvent`] via the
//!   [`EventBroadcaster`].
//!
//! - **[`AccessActuator`]**: Block, unblock, throttle and sinkhole behind
//!   the [`BlockBackend`] trait, with ARP poisoning and router backends.
//!
//! - **[`NetworkTools`]**: The host-OS seam. [`SystemTools`] shells out to
//!   the usual Linux utilities.

pub mod actuator;
pub mod analysis;
pub mod command;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod quota;
pub mod store;
pub mod stream;
pub mod tools;

// ── Primary re-exports ──────────────────────────────────────────────
pub use actuator::{AccessActuator, ArpPoisonBackend, BlockBackend, RouterBackend, RouterSession};
pub use command::requests::*;
pub use command::{Command, CommandResult};
pub use config::{BlockBackendKind, EngineConfig, RouterProfile, UsageMeterKind};
pub use engine::{Engine, EngineParts, EngineState, ScanReport};
pub use error::{CoreError, ErrorKind};
pub use event::{EngineEvent, EventBroadcaster, ObserverReply, handle_inbound};
pub use quota::{UsageMeter, UsageSample};
pub use store::{DeviceRegistry, Reconciled};
pub use stream::{DeviceFeed, DeviceFilter};
pub use tools::{ArpEntry, NetworkTools, SystemTools};

pub use model::{
    Alert, AlertId, AlertKind, BandwidthCap, BreachAction, Device, DeviceClass, DeviceId,
    DeviceObservation, DeviceStatus, FirewallAction, FirewallRule, MacAddress, NetworkStats,
    Protocol, QuotaPeriod, RouterStatus, RuleId, TrafficAnalysis,
};
