//! Async client for home-router control planes.
//!
//! Consumer routers (Huawei, TP-Link, ASUS, ...) expose a small JSON API
//! behind a session login. This crate wraps the subset the device control
//! engine needs:
//!
//! - **[`RouterClient`]**: session login/logout, capability listing,
//!   hardware-address block/unblock directives, and per-address QoS caps.
//! - **[`TransportConfig`]**: shared `reqwest::Client` construction
//!   (timeouts, TLS leniency, session cookies).
//! - **[`Error`]**: every failure mode of the control plane. Higher layers
//!   translate these into their own diagnostics.

pub mod error;
pub mod router;
pub mod transport;

pub use error::Error;
pub use router::models::{
    BlockAction, BlockDirective, QosDirective, RouterBrand, RouterCapability, RouterResponse,
};
pub use router::RouterClient;
pub use transport::{TlsMode, TransportConfig};
