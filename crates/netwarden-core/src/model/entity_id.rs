// ── Core identity types ──
//
// Numeric identities are assigned by the registry on first registration and
// never reused. MacAddress is the stable de-duplication key for devices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Numeric ids ─────────────────────────────────────────────────────

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

numeric_id!(
    /// Registry-assigned device identity.
    DeviceId
);
numeric_id!(
    /// Registry-assigned alert identity.
    AlertId
);
numeric_id!(
    /// Registry-assigned firewall rule identity.
    RuleId
);

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hardware address: {0:?}")]
pub struct MacParseError(pub String);

impl MacAddress {
    /// Parse and normalize a MAC address.
    ///
    /// Accepts colon- or dash-separated octets, and tolerates single-digit
    /// octets (`0:1a:2b:...`) as printed by some `arp` builds.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, MacParseError> {
        let raw = raw.as_ref().trim();
        let octets: Vec<&str> = raw.split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(MacParseError(raw.to_owned()));
        }
        let mut normalized = String::with_capacity(17);
        for (i, octet) in octets.iter().enumerate() {
            let valid = (1..=2).contains(&octet.len()) && octet.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                return Err(MacParseError(raw.to_owned()));
            }
            if i > 0 {
                normalized.push(':');
            }
            if octet.len() == 1 {
                normalized.push('0');
            }
            normalized.push_str(&octet.to_ascii_lowercase());
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The vendor prefix (first three octets), upper-case: `00:1A:2B`.
    pub fn oui(&self) -> String {
        self.0.get(..8).unwrap_or_default().to_ascii_uppercase()
    }

    /// `ff:ff:ff:ff:ff:ff` and `00:00:00:00:00:00` show up in ARP tables for
    /// broadcast and incomplete entries.
    pub fn is_placeholder(&self) -> bool {
        self.0 == "ff:ff:ff:ff:ff:ff" || self.0 == "00:00:00:00:00:00"
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}
