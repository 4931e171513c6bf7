// ── Discovery ──
//
// Identity resolution, reachability probing and the coordinator that
// walks the address-resolution table and turns each row into a
// `DeviceObservation`.

pub mod classify;
mod coordinator;
pub mod oui;
mod prober;
mod resolver;

pub use coordinator::{Discovery, ObservationStream};
pub use prober::{Prober, vulnerabilities};
pub use resolver::{Identity, Resolver};
