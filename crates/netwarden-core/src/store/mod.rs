// ── Authoritative in-memory state ──

mod collection;
mod registry;

pub use registry::{DeviceRegistry, Reconciled};
