// Router control-plane client
//
// Session login, capability gating, and the two policy directives the
// engine delegates to a router: hardware-address block/unblock and
// per-address QoS caps.

mod auth;
mod client;
mod control;
pub mod models;

pub use client::RouterClient;
