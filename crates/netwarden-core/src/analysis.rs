// ── Traffic analytics ──
//
// Protocol and domain tallies over a bounded `tcpdump -n` sample. Header
// fields only; payloads are never inspected beyond DNS question names.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::model::{DeviceId, TrafficAnalysis};

/// Query types whose question name is worth reporting.
const DNS_QUERY_MARKERS: &[&str] = &[" A? ", " AAAA? ", " CNAME? ", " MX? ", " HTTPS? "];

/// Summarize captured packet lines for one device.
pub fn tally(device_id: Option<DeviceId>, ip: IpAddr, lines: &[String]) -> TrafficAnalysis {
    let mut protocols: BTreeMap<String, usize> = BTreeMap::new();
    let mut domains: Vec<String> = Vec::new();
    let mut total_packets = 0;

    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        total_packets += 1;
        *protocols.entry(protocol_of(line).to_owned()).or_default() += 1;
        if let Some(domain) = dns_question(line) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
    }

    TrafficAnalysis {
        device_id,
        ip: Some(ip),
        total_packets,
        protocols,
        domains,
    }
}

fn protocol_of(line: &str) -> &'static str {
    if line.contains("ICMP") {
        "ICMP"
    } else if line.contains("Flags [") || line.contains(" tcp ") {
        "TCP"
    } else if line.contains("UDP") || dns_question(line).is_some() || line.contains(".53: ") {
        "UDP"
    } else {
        "Other"
    }
}

/// `... 1234+ A? example.com. (29)` -> `example.com`.
fn dns_question(line: &str) -> Option<String> {
    let (_, rest) = DNS_QUERY_MARKERS
        .iter()
        .find_map(|marker| line.split_once(marker))?;
    let name = rest.split_whitespace().next()?.trim_end_matches('.');
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}
