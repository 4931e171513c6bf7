// ── Quota Accountant ──
//
// Per-tick usage accrual, period rollover and the breach policy. The
// functions here only touch a `&mut Device` handed in under the registry
// shard lock; actuation and alerting are driven by the engine's quota
// task.

mod meter;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::model::{AlertKind, BandwidthCap, Device, NewAlert, QuotaPeriod};

pub use meter::{DisabledMeter, SimulatedMeter, UsageMeter, UsageSample, meter_for};

/// Whether `now` falls in a later `period` window than `started`.
/// Windows are calendar-aligned in UTC; weeks are ISO weeks.
pub fn period_elapsed(period: QuotaPeriod, started: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    if now <= started {
        return false;
    }
    match period {
        QuotaPeriod::Daily => now.date_naive() != started.date_naive(),
        QuotaPeriod::Weekly => now.iso_week() != started.iso_week(),
        QuotaPeriod::Monthly => (now.year(), now.month()) != (started.year(), started.month()),
    }
}

pub struct QuotaAccountant {
    meter: Arc<dyn UsageMeter>,
    throttle: BandwidthCap,
}

impl QuotaAccountant {
    pub fn new(meter: Arc<dyn UsageMeter>, throttle: BandwidthCap) -> Self {
        Self { meter, throttle }
    }

    pub fn meter_name(&self) -> &'static str {
        self.meter.name()
    }

    /// Cap applied by the `throttle` breach action.
    pub fn throttle(&self) -> BandwidthCap {
        self.throttle
    }

    /// Fold one tick of usage into `device`. Online devices accrue; every
    /// other status reads zero throughput. Returns whether anything moved.
    pub fn accrue(&self, device: &mut Device) -> bool {
        let sample = if device.status.is_online() {
            self.meter.sample(device)
        } else {
            UsageSample::default()
        };
        let increment = sample.increment_mb.max(0.0);
        let throughput = sample.throughput_mbps.max(0.0);

        let changed =
            increment > 0.0 || (device.current_usage_mbps - throughput).abs() > f64::EPSILON;
        device.data_used_mb += increment;
        device.current_usage_mbps = throughput;
        changed
    }

    /// Reset `device` if its accounting period has ended.
    pub fn roll_over(&self, device: &mut Device, now: DateTime<Utc>) -> bool {
        if period_elapsed(device.quota_period, device.period_started, now) {
            device.roll_over(now);
            true
        } else {
            false
        }
    }
}

/// The alert raised once per quota crossing.
pub fn breach_alert(device: &Device) -> NewAlert {
    let limit = device.quota_limit_mb.unwrap_or_default();
    NewAlert::new(
        AlertKind::QuotaExceeded,
        "Data Quota Exceeded",
        format!(
            "{} has used {:.0} MB of its {} {:.0} MB quota",
            device.name, device.data_used_mb, device.quota_period, limit
        ),
        Some(device.id),
    )
}
