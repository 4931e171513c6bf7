//! Discovery Coordinator.
//!
//! Reads the address-resolution table once per pass, then resolves each
//! row concurrently (bounded) into a [`DeviceObservation`]. A candidate
//! that fails or overruns its deadline is still reported, in degraded
//! form.

use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::oui;
use super::prober::Prober;
use super::resolver::Resolver;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{DeviceObservation, MacAddress};
use crate::tools::{ArpEntry, NetworkTools};

/// Lazy, finite sequence of observations for one pass. Only the opening
/// table read can yield an `Err`, and it ends the pass.
pub type ObservationStream<'a> =
    Pin<Box<dyn Stream<Item = Result<DeviceObservation, CoreError>> + Send + 'a>>;

pub struct Discovery {
    tools: Arc<dyn NetworkTools>,
    resolver: Resolver,
    prober: Prober,
    ports: Vec<u16>,
    candidate_timeout: Duration,
    concurrency: usize,
}

impl Discovery {
    pub fn new(tools: Arc<dyn NetworkTools>, config: &EngineConfig) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&tools), config.probe_timeout),
            prober: Prober::new(Arc::clone(&tools), config.probe_timeout),
            tools,
            ports: config.discovery_ports.clone(),
            candidate_timeout: config.candidate_timeout,
            concurrency: config.discovery_concurrency.max(1),
        }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Start a fresh pass. Nothing runs until the stream is polled, and
    /// every call re-reads the table from scratch.
    pub fn discover(&self) -> ObservationStream<'_> {
        Box::pin(async_stream::stream! {
            let entries = match self.tools.read_address_table().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "address table unavailable; discovery pass aborted");
                    yield Err(e);
                    return;
                }
            };
            info!(candidates = entries.len(), "discovery pass started");

            let mut observations = futures_util::stream::iter(entries)
                .map(|entry| self.observe_bounded(entry))
                .buffer_unordered(self.concurrency);

            while let Some(obs) = observations.next().await {
                yield Ok(obs);
            }
        })
    }

    async fn observe_bounded(&self, entry: ArpEntry) -> DeviceObservation {
        let ArpEntry { ip, mac } = entry;
        match tokio::time::timeout(self.candidate_timeout, self.observe(ip, &mac)).await {
            Ok(Ok(obs)) => obs,
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "candidate degraded");
                DeviceObservation::degraded(ip, mac.clone(), oui::vendor_for(&mac).to_owned())
            }
            Err(_) => {
                debug!(%ip, timeout_ms = self.candidate_timeout.as_millis(), "candidate timed out");
                DeviceObservation::degraded(ip, mac.clone(), oui::vendor_for(&mac).to_owned())
            }
        }
    }

    async fn observe(&self, ip: IpAddr, mac: &MacAddress) -> Result<DeviceObservation, CoreError> {
        let (identity, alive, open_ports) = tokio::join!(
            self.resolver.resolve(ip, mac),
            self.prober.is_alive(ip),
            self.prober.open_ports(ip, &self.ports),
        );
        Ok(DeviceObservation {
            ip,
            mac: mac.clone(),
            vendor: identity.vendor,
            hostname: identity.hostname,
            open_ports,
            alive: alive?,
        })
    }
}
