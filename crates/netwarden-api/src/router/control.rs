// Router policy directives
//
// Capability listing, block/unblock by hardware address (`firewall`
// capability) and per-address bandwidth caps (`qos` capability).
// Directives are fire-and-confirm: the router's `success` flag is the
// only acknowledgement.

use tracing::debug;

use crate::error::Error;
use crate::router::client::RouterClient;
use crate::router::models::{
    BlockAction, BlockDirective, CapabilityList, QosDirective, RouterCapability,
};

impl RouterClient {
    /// Ask the router to drop traffic from `mac`.
    pub async fn block_mac(&self, mac: &str) -> Result<(), Error> {
        self.firewall_directive(mac, BlockAction::Block).await
    }

    /// Lift a block previously placed with [`block_mac`](Self::block_mac).
    pub async fn unblock_mac(&self, mac: &str) -> Result<(), Error> {
        self.firewall_directive(mac, BlockAction::Unblock).await
    }

    async fn firewall_directive(&self, mac: &str, action: BlockAction) -> Result<(), Error> {
        self.require(RouterCapability::Firewall, "firewall")?;
        let url = self.url("firewall/block")?;
        debug!(mac, ?action, "sending firewall directive");

        let body = BlockDirective {
            mac_address: mac.to_owned(),
            action,
        };
        self.post::<serde_json::Value>(url, &body).await?;
        Ok(())
    }

    /// Cap throughput for `ip` to the given download/upload rates in Mbps.
    pub async fn limit_bandwidth(
        &self,
        ip: &str,
        download_mbps: f64,
        upload_mbps: f64,
    ) -> Result<(), Error> {
        self.require(RouterCapability::Qos, "qos")?;
        let url = self.url("qos/limit")?;
        debug!(ip, download_mbps, upload_mbps, "sending QoS directive");

        let body = QosDirective {
            ip_address: ip.to_owned(),
            download_limit: download_mbps,
            upload_limit: upload_mbps,
        };
        self.post::<serde_json::Value>(url, &body).await?;
        Ok(())
    }

    /// Features the router itself reports, which may differ from the
    /// configured set. An empty `data` payload means none.
    pub async fn fetch_capabilities(&self) -> Result<Vec<RouterCapability>, Error> {
        let url = self.url("capabilities")?;
        let list: Option<CapabilityList> = self.get(url).await?;
        Ok(list.unwrap_or_default().capabilities)
    }
}
