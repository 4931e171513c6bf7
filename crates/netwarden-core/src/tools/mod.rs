// ── External tooling capability ──
//
// Everything the engine needs from the host OS, behind one trait so the
// registry logic never sees command syntax. `SystemTools` shells out to
// the usual Linux utilities; tests substitute in-memory fakes.

mod parse;
mod system;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::MacAddress;

pub use system::SystemTools;

/// One row of the address-resolution table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: IpAddr,
    pub mac: MacAddress,
}

/// Host-side network capabilities.
///
/// Every method is individually time-boxed by the implementation or by the
/// caller-supplied timeout, and none may be invoked while a registry lock
/// is held.
#[async_trait]
pub trait NetworkTools: Send + Sync {
    /// Snapshot of the local address-resolution table.
    async fn read_address_table(&self) -> Result<Vec<ArpEntry>, CoreError>;

    /// Reverse name lookup. `Ok(None)` when the name service has no answer.
    async fn reverse_lookup(&self, ip: IpAddr, timeout: Duration)
    -> Result<Option<String>, CoreError>;

    /// One echo request. `Ok(false)` for no reply within `timeout`.
    async fn ping(&self, ip: IpAddr, timeout: Duration) -> Result<bool, CoreError>;

    /// TCP connect probe. Any failure, including timeout, is `false`.
    async fn probe_port(&self, ip: IpAddr, port: u16, timeout: Duration) -> bool;

    /// The default IPv4 gateway, if the routing table has one.
    async fn default_gateway(&self) -> Result<Option<IpAddr>, CoreError>;

    /// Start telling `target` that `spoof_as` lives at this host's hardware
    /// address. Keeps running until [`stop_spoofing`](Self::stop_spoofing).
    async fn spoof(&self, target: IpAddr, spoof_as: IpAddr) -> Result<(), CoreError>;

    /// Stop every poisoning session that involves `address` on either end.
    async fn stop_spoofing(&self, address: IpAddr) -> Result<(), CoreError>;

    /// Tell `target` that `address` really lives at `mac`, undoing an
    /// earlier [`spoof`](Self::spoof) of that binding.
    async fn restore_binding(
        &self,
        target: IpAddr,
        address: IpAddr,
        mac: &MacAddress,
    ) -> Result<(), CoreError>;

    /// Append a rule to the host firewall (iptables argument vector).
    async fn apply_firewall_rule(&self, args: &[String]) -> Result<(), CoreError>;

    /// Capture a bounded packet sample for `ip`, returning one summary line
    /// per packet.
    async fn capture_packets(
        &self,
        ip: IpAddr,
        max_packets: usize,
        timeout: Duration,
    ) -> Result<Vec<String>, CoreError>;
}
