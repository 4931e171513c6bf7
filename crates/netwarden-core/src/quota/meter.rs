// Usage meters.
//
// The accountant asks a meter for one reading per device per tick. The
// simulated meter reproduces the dashboard's demo behaviour; a measured
// meter (router counters, nftables accounting) would slot in here.

use std::sync::Arc;

use rand::Rng;

use crate::config::UsageMeterKind;
use crate::model::Device;

/// One reading for one device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UsageSample {
    pub throughput_mbps: f64,
    /// Data transferred since the previous tick, MB.
    pub increment_mb: f64,
}

pub trait UsageMeter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reading for an online device. Not called for any other status.
    fn sample(&self, device: &Device) -> UsageSample;
}

/// Random throughput up to 50 Mbps and up to 10 MB per tick.
#[derive(Debug, Default)]
pub struct SimulatedMeter;

impl UsageMeter for SimulatedMeter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn sample(&self, _device: &Device) -> UsageSample {
        let mut rng = rand::rng();
        UsageSample {
            throughput_mbps: rng.random_range(0.0..50.0),
            increment_mb: rng.random_range(0.0..10.0),
        }
    }
}

/// Never accrues anything.
#[derive(Debug, Default)]
pub struct DisabledMeter;

impl UsageMeter for DisabledMeter {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn sample(&self, _device: &Device) -> UsageSample {
        UsageSample::default()
    }
}

pub fn meter_for(kind: UsageMeterKind) -> Arc<dyn UsageMeter> {
    match kind {
        UsageMeterKind::Simulated => Arc::new(SimulatedMeter),
        UsageMeterKind::Disabled => Arc::new(DisabledMeter),
    }
}
