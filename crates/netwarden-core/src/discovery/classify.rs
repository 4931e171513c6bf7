//! Device class guessed from hostname and vendor keywords.

use crate::model::DeviceClass;

const RULES: &[(DeviceClass, &[&str])] = &[
    (
        DeviceClass::Mobile,
        &["phone", "iphone", "android", "pixel", "galaxy", "mobile"],
    ),
    (DeviceClass::Tablet, &["ipad", "tablet", "kindle"]),
    (
        DeviceClass::Tv,
        &["tv", "roku", "chromecast", "firetv", "appletv", "bravia"],
    ),
    (
        DeviceClass::Gaming,
        &["xbox", "playstation", "ps4", "ps5", "nintendo", "switch", "steamdeck"],
    ),
    (
        DeviceClass::Laptop,
        &["laptop", "macbook", "thinkpad", "desktop", "pc", "notebook"],
    ),
];

/// Vendors whose hardware is almost never a personal device.
const INFRASTRUCTURE_VENDORS: &[&str] = &["Raspberry Pi", "VMware", "VirtualBox"];

/// Best-effort class for a freshly discovered device.
///
/// Hostname tokens win; short keywords such as `tv` or `pc` must match a
/// whole token, longer ones may appear inside one (`johns-iphone12`).
pub fn classify(vendor: &str, hostname: Option<&str>) -> DeviceClass {
    if let Some(host) = hostname {
        let host = host.to_ascii_lowercase();
        let tokens: Vec<&str> = host
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        for (class, keywords) in RULES {
            if keywords.iter().any(|kw| matches_token(&tokens, kw)) {
                return *class;
            }
        }
    }
    if INFRASTRUCTURE_VENDORS.contains(&vendor) {
        return DeviceClass::Other;
    }
    DeviceClass::Unknown
}

fn matches_token(tokens: &[&str], keyword: &str) -> bool {
    tokens
        .iter()
        .any(|t| *t == keyword || (keyword.len() >= 4 && t.contains(keyword)))
}
