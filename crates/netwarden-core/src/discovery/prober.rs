//! Reachability Prober: one echo request plus a bounded TCP port sweep.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::debug;

use crate::error::CoreError;
use crate::tools::NetworkTools;

pub struct Prober {
    tools: Arc<dyn NetworkTools>,
    timeout: Duration,
}

impl Prober {
    pub fn new(tools: Arc<dyn NetworkTools>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// Liveness via one echo request. A missed reply is `Ok(false)`; only a
    /// broken tool or an overrun deadline is an error.
    pub async fn is_alive(&self, ip: IpAddr) -> Result<bool, CoreError> {
        // Grace on top of the tool's own deadline for process start-up.
        let ceiling = self.timeout + Duration::from_secs(1);
        tokio::time::timeout(ceiling, self.tools.ping(ip, self.timeout))
            .await
            .map_err(|_| CoreError::tool("ping", "no answer before deadline"))?
    }

    /// Open ports among `ports`, in the order given. Every probe runs
    /// concurrently and is time-boxed independently.
    pub async fn open_ports(&self, ip: IpAddr, ports: &[u16]) -> Vec<u16> {
        let probes = ports.iter().map(|&port| async move {
            let open = tokio::time::timeout(
                self.timeout,
                self.tools.probe_port(ip, port, self.timeout),
            )
            .await
            .unwrap_or(false);
            open.then_some(port)
        });
        let open: Vec<u16> = join_all(probes).await.into_iter().flatten().collect();
        debug!(%ip, probed = ports.len(), open = open.len(), "port sweep finished");
        open
    }
}

/// Flag risky services among `open_ports`.
pub fn vulnerabilities(open_ports: &[u16]) -> Vec<String> {
    open_ports
        .iter()
        .filter_map(|port| {
            let finding = match port {
                21 => "FTP service exposed",
                22 => "SSH service detected - check for weak passwords",
                23 => "Telnet service exposed",
                135 => "RPC service exposed",
                445 => "SMB service exposed",
                3389 => "RDP service exposed",
                _ => return None,
            };
            Some(finding.to_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_remote_login_and_file_sharing() {
        let found = vulnerabilities(&[22, 80, 443, 445, 3389]);
        assert_eq!(
            found,
            vec![
                "SSH service detected - check for weak passwords",
                "SMB service exposed",
                "RDP service exposed",
            ]
        );
        assert!(vulnerabilities(&[80, 443]).is_empty());
    }
}
