// Parsers for the text output of `arp`, `nslookup` and `ip route`.

use std::net::IpAddr;

use tracing::trace;

use super::ArpEntry;
use crate::model::MacAddress;

/// Parse BSD/net-tools style `arp -a` output:
///
/// ```text
/// router.lan (192.168.1.1) at d8:bb:c1:12:34:56 [ether] on eth0
/// ? (192.168.1.23) at <incomplete> on eth0
/// ```
///
/// Incomplete and broadcast entries are skipped.
pub(crate) fn arp_table(output: &str) -> Vec<ArpEntry> {
    output.lines().filter_map(arp_line).collect()
}

fn arp_line(line: &str) -> Option<ArpEntry> {
    let open = line.find('(')?;
    let close = open + line[open..].find(')')?;
    let ip: IpAddr = line[open + 1..close].trim().parse().ok()?;

    let rest = line[close + 1..].trim_start();
    let rest = rest.strip_prefix("at")?.trim_start();
    let raw_mac = rest.split_whitespace().next()?;
    let Ok(mac) = MacAddress::parse(raw_mac) else {
        trace!(line, "skipping arp entry without a usable hardware address");
        return None;
    };
    (!mac.is_placeholder()).then_some(ArpEntry { ip, mac })
}

/// Extract the PTR name from `nslookup <ip>` output:
///
/// ```text
/// 23.1.168.192.in-addr.arpa	name = laptop.lan.
/// ```
pub(crate) fn nslookup_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, name) = line.split_once("name =")?;
        let name = name.trim().trim_end_matches('.');
        (!name.is_empty()).then(|| name.to_owned())
    })
}

/// Find `default via <addr>` in `ip route` output.
pub(crate) fn default_route(output: &str) -> Option<IpAddr> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next()? != "default" || words.next()? != "via" {
            return None;
        }
        words.next()?.parse().ok()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ARP: &str = "\
router.lan (192.168.1.1) at d8:bb:c1:12:34:56 [ether] on eth0
? (192.168.1.23) at <incomplete> on eth0
? (192.168.1.40) at b8:27:eb:0:a:b [ether] on eth0
? (192.168.1.255) at ff:ff:ff:ff:ff:ff [ether] on eth0
garbage line
";

    #[test]
    fn arp_table_skips_incomplete_and_broadcast() {
        let entries = arp_table(ARP);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ip.to_string(), "192.168.1.1");
        assert_eq!(entries[0].mac.as_str(), "d8:bb:c1:12:34:56");
        assert_eq!(entries[1].mac.as_str(), "b8:27:eb:00:0a:0b");
    }

    #[test]
    fn nslookup_extracts_ptr_name() {
        let out = "Server:\t\t127.0.0.53\nAddress:\t127.0.0.53#53\n\n\
                   23.1.168.192.in-addr.arpa\tname = laptop.lan.\n";
        assert_eq!(nslookup_name(out).as_deref(), Some("laptop.lan"));
        assert_eq!(nslookup_name("** server can't find 23.1.168.192.in-addr.arpa: NXDOMAIN"), None);
    }

    #[test]
    fn default_route_found() {
        let out = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n\
                   192.168.1.0/24 dev eth0 proto kernel scope link src 192.168.1.5\n";
        assert_eq!(default_route(out).unwrap().to_string(), "192.168.1.1");
        assert!(default_route("192.168.1.0/24 dev eth0\n").is_none());
    }
}
