// ── Domain model ──

pub mod alert;
pub mod device;
pub mod entity_id;
pub mod firewall;
pub mod stats;

pub use alert::{Alert, AlertKind, NewAlert};
pub use device::{
    BandwidthCap, BreachAction, Device, DeviceClass, DeviceObservation, DeviceStatus, QuotaPeriod,
};
pub use entity_id::{AlertId, DeviceId, MacAddress, MacParseError, RuleId};
pub use firewall::{FirewallAction, FirewallRule, Protocol};
pub use stats::{NetworkStats, RouterStatus, TrafficAnalysis};
