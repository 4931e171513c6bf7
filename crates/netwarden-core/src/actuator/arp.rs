// ARP-poisoning block backend.
//
// Tells the target that the gateway lives at this host's hardware address
// and tells the gateway the same about the target. Success means both
// poisoning processes started; nothing verifies the target actually lost
// connectivity. Unblocking stops both processes and re-teaches each side
// the other's real hardware address.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::BlockBackend;
use crate::error::CoreError;
use crate::model::{Device, MacAddress};
use crate::tools::NetworkTools;

/// Used when neither configuration nor the routing table names a gateway.
const FALLBACK_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

pub struct ArpPoisonBackend {
    tools: Arc<dyn NetworkTools>,
    gateway: Option<IpAddr>,
}

impl ArpPoisonBackend {
    pub fn new(tools: Arc<dyn NetworkTools>, gateway: Option<IpAddr>) -> Self {
        Self { tools, gateway }
    }

    async fn gateway(&self) -> IpAddr {
        if let Some(gw) = self.gateway {
            return gw;
        }
        match self.tools.default_gateway().await {
            Ok(Some(gw)) => gw,
            Ok(None) => {
                warn!(fallback = %FALLBACK_GATEWAY, "no default route; using fallback gateway");
                FALLBACK_GATEWAY
            }
            Err(e) => {
                warn!(error = %e, fallback = %FALLBACK_GATEWAY, "gateway lookup failed");
                FALLBACK_GATEWAY
            }
        }
    }
}

impl ArpPoisonBackend {
    async fn gateway_mac(&self, gateway: IpAddr) -> Option<MacAddress> {
        match self.tools.read_address_table().await {
            Ok(table) => table.into_iter().find(|e| e.ip == gateway).map(|e| e.mac),
            Err(e) => {
                debug!(error = %e, "address table unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl BlockBackend for ArpPoisonBackend {
    fn name(&self) -> &'static str {
        "arp"
    }

    async fn block(&self, device: &Device) -> Result<(), CoreError> {
        let gateway = self.gateway().await;
        let target = device.ip;

        self.tools.spoof(target, gateway).await?;
        if let Err(e) = self.tools.spoof(gateway, target).await {
            // Half a poisoning is worse than none; undo the first leg.
            if let Err(undo) = self.tools.stop_spoofing(target).await {
                debug!(%target, error = %undo, "rollback of first poisoning leg failed");
            }
            return Err(e);
        }
        info!(device_id = %device.id, %target, %gateway, "ARP block started");
        Ok(())
    }

    async fn unblock(&self, device: &Device) -> Result<(), CoreError> {
        let gateway = self.gateway().await;
        let target = device.ip;
        self.tools.stop_spoofing(target).await?;

        // Gateway learns the target's real address first, then the target
        // learns the gateway's if the local table knows it.
        let to_gateway = self.tools.restore_binding(gateway, target, &device.mac).await;
        let to_target = match self.gateway_mac(gateway).await {
            Some(mac) => self.tools.restore_binding(target, gateway, &mac).await,
            None => {
                warn!(%gateway, "gateway hardware address unknown; relying on arpspoof cleanup");
                Ok(())
            }
        };
        to_gateway?;
        to_target?;

        info!(device_id = %device.id, %target, %gateway, "ARP block lifted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::tools::ArpEntry;

    /// Records poisoning calls; fails `spoof` when the target matches.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_spoof_target: Option<IpAddr>,
        table: Vec<ArpEntry>,
    }

    impl Recorder {
        fn log(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl NetworkTools for Recorder {
        async fn read_address_table(&self) -> Result<Vec<ArpEntry>, CoreError> {
            Ok(self.table.clone())
        }
        async fn reverse_lookup(&self, _: IpAddr, _: Duration) -> Result<Option<String>, CoreError> {
            Ok(None)
        }
        async fn ping(&self, _: IpAddr, _: Duration) -> Result<bool, CoreError> {
            Ok(true)
        }
        async fn probe_port(&self, _: IpAddr, _: u16, _: Duration) -> bool {
            false
        }
        async fn default_gateway(&self) -> Result<Option<IpAddr>, CoreError> {
            Ok(Some("10.0.0.1".parse().unwrap()))
        }
        async fn spoof(&self, target: IpAddr, spoof_as: IpAddr) -> Result<(), CoreError> {
            self.log(format!("spoof {target} {spoof_as}"));
            if self.fail_spoof_target == Some(target) {
                return Err(CoreError::tool("arpspoof", "exited immediately"));
            }
            Ok(())
        }
        async fn stop_spoofing(&self, address: IpAddr) -> Result<(), CoreError> {
            self.log(format!("stop {address}"));
            Ok(())
        }
        async fn restore_binding(
            &self,
            target: IpAddr,
            address: IpAddr,
            mac: &MacAddress,
        ) -> Result<(), CoreError> {
            self.log(format!("restore {target} {address} {mac}"));
            Ok(())
        }
        async fn apply_firewall_rule(&self, _: &[String]) -> Result<(), CoreError> {
            Ok(())
        }
        async fn capture_packets(
            &self,
            _: IpAddr,
            _: usize,
            _: Duration,
        ) -> Result<Vec<String>, CoreError> {
            Ok(vec![])
        }
    }

    fn device(ip: &str) -> Device {
        Device::fixture(7, ip, "aa:bb:cc:dd:ee:ff")
    }

    #[tokio::test]
    async fn block_poisons_both_directions_via_routing_table_gateway() {
        let tools = Arc::new(Recorder::default());
        let backend = ArpPoisonBackend::new(tools.clone(), None);

        backend.block(&device("10.0.0.42")).await.unwrap();
        assert_eq!(
            *tools.calls.lock().unwrap(),
            vec!["spoof 10.0.0.42 10.0.0.1", "spoof 10.0.0.1 10.0.0.42"]
        );
    }

    #[tokio::test]
    async fn failed_second_leg_rolls_back_first() {
        let tools = Arc::new(Recorder {
            fail_spoof_target: Some("192.168.0.1".parse().unwrap()),
            ..Recorder::default()
        });
        let backend = ArpPoisonBackend::new(tools.clone(), Some("192.168.0.1".parse().unwrap()));

        assert!(backend.block(&device("192.168.0.9")).await.is_err());
        assert_eq!(
            *tools.calls.lock().unwrap(),
            vec![
                "spoof 192.168.0.9 192.168.0.1",
                "spoof 192.168.0.1 192.168.0.9",
                "stop 192.168.0.9"
            ]
        );
    }

    #[tokio::test]
    async fn unblock_restores_both_directions() {
        let tools = Arc::new(Recorder {
            table: vec![ArpEntry {
                ip: "10.0.0.1".parse().unwrap(),
                mac: "00:11:22:33:44:55".parse().unwrap(),
            }],
            ..Recorder::default()
        });
        let backend = ArpPoisonBackend::new(tools.clone(), None);

        backend.unblock(&device("10.0.0.42")).await.unwrap();
        assert_eq!(
            *tools.calls.lock().unwrap(),
            vec![
                "stop 10.0.0.42",
                "restore 10.0.0.1 10.0.0.42 aa:bb:cc:dd:ee:ff",
                "restore 10.0.0.42 10.0.0.1 00:11:22:33:44:55",
            ]
        );
    }

    #[tokio::test]
    async fn unblock_without_gateway_mac_still_fixes_gateway_side() {
        let tools = Arc::new(Recorder::default());
        let backend = ArpPoisonBackend::new(tools.clone(), None);

        backend.unblock(&device("10.0.0.42")).await.unwrap();
        assert_eq!(
            *tools.calls.lock().unwrap(),
            vec!["stop 10.0.0.42", "restore 10.0.0.1 10.0.0.42 aa:bb:cc:dd:ee:ff"]
        );
    }
}
