//! IPv6 prefix type and the address derivations used by Neighbor Discovery.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// All-nodes link-local multicast group (ff02::1).
pub const ALL_NODES_MULTICAST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// All-routers link-local multicast group (ff02::2).
pub const ALL_ROUTERS_MULTICAST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

/// An IPv6 network prefix (address plus prefix length, CIDR notation).
///
/// The stored address is canonicalized: host bits beyond the prefix length
/// are always zero, so two nets constructed from different host addresses
/// inside the same network compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv6Net {
    addr: Ipv6Addr,
    prefix_len: u8,
}

impl Ipv6Net {
    /// Creates a new prefix, masking off host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix_len` exceeds 128.
    pub fn new(addr: Ipv6Addr, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > 128 {
            return Err(ParseError::InvalidPrefixLen(prefix_len));
        }
        Ok(Ipv6Net {
            addr: mask_addr(addr, prefix_len),
            prefix_len,
        })
    }

    /// The zero-length prefix `::/0`, matching every destination.
    pub const DEFAULT: Ipv6Net = Ipv6Net {
        addr: Ipv6Addr::UNSPECIFIED,
        prefix_len: 0,
    };

    /// Returns the (masked) network address.
    pub const fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if `ip` falls inside this prefix.
    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        mask_addr(ip, self.prefix_len) == self.addr
    }

    /// Returns true if this is the zero-length default prefix.
    pub const fn is_default(&self) -> bool {
        self.prefix_len == 0
    }
}

impl fmt::Display for Ipv6Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Ipv6Net {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;
        let addr: Ipv6Addr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        Ipv6Net::new(addr, prefix_len)
    }
}

impl TryFrom<String> for Ipv6Net {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv6Net> for String {
    fn from(net: Ipv6Net) -> String {
        net.to_string()
    }
}

/// Masks `addr` down to its first `prefix_len` bits.
fn mask_addr(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    if prefix_len >= 128 {
        return addr;
    }
    let value = u128::from_be_bytes(addr.octets());
    let mask = if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    };
    Ipv6Addr::from((value & mask).to_be_bytes())
}

/// Derives the solicited-node multicast group for an address
/// (ff02::1:ffXX:XXXX, RFC 4291 section 2.7.1).
pub fn solicited_node_multicast(addr: Ipv6Addr) -> Ipv6Addr {
    let o = addr.octets();
    Ipv6Addr::from([
        0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff, o[13], o[14], o[15],
    ])
}

/// Forms a SLAAC address by concatenating a 64-bit prefix with a 64-bit
/// interface identifier.
///
/// More generally, the first `prefix_len` bits come from `prefix` and the
/// remaining bits from `iid`; callers enforce `prefix_len + iid bits == 128`.
pub fn combine_prefix_and_iid(prefix: Ipv6Net, iid: [u8; 8]) -> Ipv6Addr {
    let prefix_bits = u128::from_be_bytes(prefix.addr().octets());
    let iid_bits = u64::from_be_bytes(iid) as u128;
    Ipv6Addr::from((prefix_bits | iid_bits).to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn net_masks_host_bits() {
        let a: Ipv6Net = "2001:db8::dead:beef/32".parse().unwrap();
        let b: Ipv6Net = "2001:db8::/32".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2001:db8::/32");
    }

    #[test]
    fn net_contains() {
        let net: Ipv6Net = "2001:db8:1::/48".parse().unwrap();
        assert!(net.contains("2001:db8:1::1".parse().unwrap()));
        assert!(!net.contains("2001:db8:2::1".parse().unwrap()));
        assert!(Ipv6Net::DEFAULT.contains("::1".parse().unwrap()));
    }

    #[test]
    fn net_rejects_bad_length() {
        assert!(Ipv6Net::new(Ipv6Addr::UNSPECIFIED, 129).is_err());
        assert!("2001:db8::/129".parse::<Ipv6Net>().is_err());
        assert!("2001:db8::".parse::<Ipv6Net>().is_err());
    }

    #[test]
    fn solicited_node_group() {
        let addr: Ipv6Addr = "fe80::0211:22ff:fe33:4455".parse().unwrap();
        let group = solicited_node_multicast(addr);
        assert_eq!(group, "ff02::1:ff33:4455".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn slaac_combination() {
        let prefix: Ipv6Net = "2001:db8::/64".parse().unwrap();
        let iid = [0x02, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55];
        let addr = combine_prefix_and_iid(prefix, iid);
        assert_eq!(
            addr,
            "2001:db8::211:22ff:fe33:4455".parse::<Ipv6Addr>().unwrap()
        );
    }
}
