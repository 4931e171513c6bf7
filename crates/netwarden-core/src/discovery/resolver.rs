//! Identity Resolver: vendor from the prefix table, hostname from a
//! reverse lookup with the address itself as fallback.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::oui;
use crate::model::MacAddress;
use crate::tools::NetworkTools;

/// Best-effort identity of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub vendor: String,
    pub hostname: String,
}

pub struct Resolver {
    tools: Arc<dyn NetworkTools>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(tools: Arc<dyn NetworkTools>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// Never fails: lookup errors and timeouts degrade the hostname to the
    /// textual address.
    pub async fn resolve(&self, ip: IpAddr, mac: &MacAddress) -> Identity {
        let vendor = oui::vendor_for(mac).to_owned();
        let hostname = match tokio::time::timeout(
            self.timeout,
            self.tools.reverse_lookup(ip, self.timeout),
        )
        .await
        {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => ip.to_string(),
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                ip.to_string()
            }
            Err(_) => {
                debug!(%ip, "reverse lookup timed out");
                ip.to_string()
            }
        };
        Identity { vendor, hostname }
    }
}
