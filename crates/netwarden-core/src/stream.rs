// ── Device table feed ──
//
// Whole-table snapshots of the registry for consumers that redraw the
// device list instead of applying individual events. Backed by the
// collection's `watch` channel: a slow reader may skip intermediate
// snapshots but always lands on the newest one.

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Device, DeviceStatus};

type Snapshot = Arc<Vec<Arc<Device>>>;

/// Which devices a [`DeviceFeed`] yields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceFilter {
    #[default]
    All,
    Status(DeviceStatus),
    /// Block flag set, whatever the connectivity state says.
    Blocked,
    /// Usage at or past a configured limit.
    OverQuota,
}

impl DeviceFilter {
    pub fn matches(self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::Status(status) => device.status == status,
            Self::Blocked => device.is_blocked,
            Self::OverQuota => device.quota_crossed(),
        }
    }

    fn apply(self, snapshot: &Snapshot) -> Vec<Arc<Device>> {
        snapshot
            .iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect()
    }
}

/// Live view of the device table, optionally narrowed by a [`DeviceFilter`].
pub struct DeviceFeed {
    filter: DeviceFilter,
    receiver: watch::Receiver<Snapshot>,
}

impl DeviceFeed {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        Self {
            filter: DeviceFilter::All,
            receiver,
        }
    }

    #[must_use]
    pub fn filtered(mut self, filter: DeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Matching devices as of now, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        self.filter.apply(&self.receiver.borrow())
    }

    /// Wait for the next registry mutation. `None` once the engine is gone.
    pub async fn changed(&mut self) -> Option<Vec<Arc<Device>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        Some(self.filter.apply(&snap))
    }

    /// One filtered table per mutation, starting with the current one.
    pub fn into_stream(self) -> impl Stream<Item = Vec<Arc<Device>>> + Send + Unpin {
        let filter = self.filter;
        WatchStream::new(self.receiver).map(move |snap| filter.apply(&snap))
    }
}
