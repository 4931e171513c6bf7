//! Static hardware-address vendor prefix table.

use crate::model::MacAddress;

/// Vendor reported for prefixes missing from [`VENDORS`].
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// Upper-case `XX:XX:XX` prefix to vendor name.
const VENDORS: &[(&str, &str)] = &[
    ("00:1A:2B", "Apple"),
    ("D8:BB:C1", "Huawei"),
    ("AC:BC:32", "Samsung"),
    ("B8:27:EB", "Raspberry Pi"),
    ("00:50:56", "VMware"),
    ("08:00:27", "VirtualBox"),
    ("E4:5F:01", "TP-Link"),
    ("F0:9F:C2", "ASUS"),
    ("C8:3A:35", "Netgear"),
];

pub fn vendor_for(mac: &MacAddress) -> &'static str {
    let prefix = mac.oui();
    VENDORS
        .iter()
        .find(|(oui, _)| *oui == prefix)
        .map_or(UNKNOWN_VENDOR, |(_, vendor)| vendor)
}
