use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::OdmrpError;

static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:[01]?\d\d?|2[0-4]\d|25[0-5])\.){3}(?:[01]?\d\d?|2[0-4]\d|25[0-5])$")
        .expect("static ipv4 regex is valid")
});

/// An IPv4 dotted-quad address, stored as four octets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 4]);

impl Address {
    pub const BROADCAST: Address = Address([255, 255, 255, 255]);

    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Address(octets)
    }

    pub fn octets(&self) -> [u8; 4] {
        self.0
    }

    /// Classifies this address by syntax, per the ODMRP address rules:
    /// first octet 224..=239 is multicast, the all-ones broadcast address is
    /// broadcast, everything else parseable is unicast.
    pub fn kind(&self) -> AddressKind {
        if *self == Address::BROADCAST {
            AddressKind::Broadcast
        } else if (224..=239).contains(&self.0[0]) {
            AddressKind::Multicast
        } else {
            AddressKind::Unicast
        }
    }

    pub fn is_multicast(&self) -> bool {
        self.kind() == AddressKind::Multicast
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Unicast,
    Multicast,
    Broadcast,
    None,
}

impl FromStr for Address {
    type Err = OdmrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !IPV4_RE.is_match(s) {
            return Err(OdmrpError::InputMismatch(format!(
                "'{s}' is not a valid IPv4 dotted-quad address"
            )));
        }
        let mut octets = [0u8; 4];
        for (i, part) in s.split('.').enumerate() {
            octets[i] = part.parse::<u8>().map_err(|_| {
                OdmrpError::InputMismatch(format!("'{s}' has an out-of-range octet"))
            })?;
        }
        Ok(Address(octets))
    }
}

/// Classifies a raw string without requiring it to already be a valid
/// [`Address`]; unparseable input (including IPv6 literals) classifies as
/// [`AddressKind::None`] rather than erroring, matching the control surface's
/// need to classify arbitrary destination strings.
pub fn classify(s: &str) -> AddressKind {
    match s.parse::<Address>() {
        Ok(addr) => addr.kind(),
        Err(_) => AddressKind::None,
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_address() {
        let a: Address = "192.168.0.101".parse().unwrap();
        assert_eq!(a.octets(), [192, 168, 0, 101]);
        assert_eq!(a.to_string(), "192.168.0.101");
    }

    #[test]
    fn rejects_malformed_address() {
        assert!("192.168.0.256".parse::<Address>().is_err());
        assert!("not.an.ip.addr".parse::<Address>().is_err());
        assert!("::1".parse::<Address>().is_err());
    }

    #[test]
    fn classifies_multicast_range_224_to_239() {
        assert_eq!(classify("224.0.0.1"), AddressKind::Multicast);
        assert_eq!(classify("239.255.255.255"), AddressKind::Multicast);
        // 240+ and 249 specifically must NOT classify as multicast: the
        // 224-249 pattern was a documented regression, the correct range
        // stops at 239.
        assert_eq!(classify("249.0.0.1"), AddressKind::Unicast);
        assert_eq!(classify("240.0.0.1"), AddressKind::Unicast);
    }

    #[test]
    fn classifies_broadcast_and_unicast() {
        assert_eq!(classify("255.255.255.255"), AddressKind::Broadcast);
        assert_eq!(classify("10.0.0.1"), AddressKind::Unicast);
    }

    #[test]
    fn classifies_garbage_as_none() {
        assert_eq!(classify("hello"), AddressKind::None);
        assert_eq!(classify("::1"), AddressKind::None);
    }
}
