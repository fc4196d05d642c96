//! The five NDP message kinds and their fixed headers.

use crate::option::NdOption;
use crate::{
    WireError, ICMP6_NEIGHBOR_ADVERT, ICMP6_NEIGHBOR_SOLICIT, ICMP6_REDIRECT, ICMP6_ROUTER_ADVERT,
    ICMP6_ROUTER_SOLICIT,
};
use nd6_types::MacAddress;
use std::net::Ipv6Addr;

/// Router Solicitation (RFC 4861 section 4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterSolicit {
    pub options: Vec<NdOption>,
}

/// Router Advertisement (RFC 4861 section 4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvert {
    pub cur_hop_limit: u8,
    /// M flag: addresses are available via stateful DHCPv6.
    pub managed: bool,
    /// O flag: other configuration is available via DHCPv6.
    pub other_config: bool,
    /// Default-router lifetime in seconds; 0 means "not a default router".
    pub router_lifetime: u16,
    pub reachable_time_ms: u32,
    pub retrans_timer_ms: u32,
    pub options: Vec<NdOption>,
}

/// Neighbor Solicitation (RFC 4861 section 4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicit {
    pub target: Ipv6Addr,
    pub options: Vec<NdOption>,
}

/// Neighbor Advertisement (RFC 4861 section 4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvert {
    pub router: bool,
    pub solicited: bool,
    pub override_flag: bool,
    pub target: Ipv6Addr,
    pub options: Vec<NdOption>,
}

/// Redirect (RFC 4861 section 4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// The better next hop for `destination`.
    pub target: Ipv6Addr,
    /// The destination being redirected.
    pub destination: Ipv6Addr,
    pub options: Vec<NdOption>,
}

/// A decoded NDP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpMessage {
    RouterSolicit(RouterSolicit),
    RouterAdvert(RouterAdvert),
    NeighborSolicit(NeighborSolicit),
    NeighborAdvert(NeighborAdvert),
    Redirect(Redirect),
}

impl NdpMessage {
    /// Returns the ICMPv6 type code of this message.
    pub fn icmp_type(&self) -> u8 {
        match self {
            NdpMessage::RouterSolicit(_) => ICMP6_ROUTER_SOLICIT,
            NdpMessage::RouterAdvert(_) => ICMP6_ROUTER_ADVERT,
            NdpMessage::NeighborSolicit(_) => ICMP6_NEIGHBOR_SOLICIT,
            NdpMessage::NeighborAdvert(_) => ICMP6_NEIGHBOR_ADVERT,
            NdpMessage::Redirect(_) => ICMP6_REDIRECT,
        }
    }

    fn options(&self) -> &[NdOption] {
        match self {
            NdpMessage::RouterSolicit(m) => &m.options,
            NdpMessage::RouterAdvert(m) => &m.options,
            NdpMessage::NeighborSolicit(m) => &m.options,
            NdpMessage::NeighborAdvert(m) => &m.options,
            NdpMessage::Redirect(m) => &m.options,
        }
    }

    /// Returns the source link-layer address option, if present.
    pub fn source_link_addr(&self) -> Option<MacAddress> {
        self.options().iter().find_map(|o| match o {
            NdOption::SourceLinkAddr(mac) => Some(*mac),
            _ => None,
        })
    }

    /// Returns the target link-layer address option, if present.
    pub fn target_link_addr(&self) -> Option<MacAddress> {
        self.options().iter().find_map(|o| match o {
            NdOption::TargetLinkAddr(mac) => Some(*mac),
            _ => None,
        })
    }

    /// Encodes the full ICMPv6 message: type, code 0, zero checksum, body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.icmp_type(), 0, 0, 0];
        match self {
            NdpMessage::RouterSolicit(m) => {
                out.extend_from_slice(&[0u8; 4]);
                encode_options(&mut out, &m.options);
            }
            NdpMessage::RouterAdvert(m) => {
                out.push(m.cur_hop_limit);
                let mut flags = 0u8;
                if m.managed {
                    flags |= 0x80;
                }
                if m.other_config {
                    flags |= 0x40;
                }
                out.push(flags);
                out.extend_from_slice(&m.router_lifetime.to_be_bytes());
                out.extend_from_slice(&m.reachable_time_ms.to_be_bytes());
                out.extend_from_slice(&m.retrans_timer_ms.to_be_bytes());
                encode_options(&mut out, &m.options);
            }
            NdpMessage::NeighborSolicit(m) => {
                out.extend_from_slice(&[0u8; 4]);
                out.extend_from_slice(&m.target.octets());
                encode_options(&mut out, &m.options);
            }
            NdpMessage::NeighborAdvert(m) => {
                let mut flags = 0u32;
                if m.router {
                    flags |= 0x8000_0000;
                }
                if m.solicited {
                    flags |= 0x4000_0000;
                }
                if m.override_flag {
                    flags |= 0x2000_0000;
                }
                out.extend_from_slice(&flags.to_be_bytes());
                out.extend_from_slice(&m.target.octets());
                encode_options(&mut out, &m.options);
            }
            NdpMessage::Redirect(m) => {
                out.extend_from_slice(&[0u8; 4]);
                out.extend_from_slice(&m.target.octets());
                out.extend_from_slice(&m.destination.octets());
                encode_options(&mut out, &m.options);
            }
        }
        out
    }

    /// Decodes a full ICMPv6 message (type, code, checksum, body).
    ///
    /// Rejects unknown types, non-zero codes, short bodies, and any
    /// malformed option. The checksum bytes are not interpreted.
    pub fn decode(bytes: &[u8]) -> Result<NdpMessage, WireError> {
        if bytes.len() < 4 {
            return Err(WireError::Truncated {
                need: 4,
                have: bytes.len(),
            });
        }
        let icmp_type = bytes[0];
        if bytes[1] != 0 {
            return Err(WireError::NonZeroCode(bytes[1]));
        }
        let body = &bytes[4..];
        match icmp_type {
            ICMP6_ROUTER_SOLICIT => {
                let rest = take(body, 4)?;
                Ok(NdpMessage::RouterSolicit(RouterSolicit {
                    options: NdOption::decode_all(rest)?,
                }))
            }
            ICMP6_ROUTER_ADVERT => {
                take(body, 12)?;
                Ok(NdpMessage::RouterAdvert(RouterAdvert {
                    cur_hop_limit: body[0],
                    managed: body[1] & 0x80 != 0,
                    other_config: body[1] & 0x40 != 0,
                    router_lifetime: u16::from_be_bytes(body[2..4].try_into().unwrap()),
                    reachable_time_ms: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                    retrans_timer_ms: u32::from_be_bytes(body[8..12].try_into().unwrap()),
                    options: NdOption::decode_all(&body[12..])?,
                }))
            }
            ICMP6_NEIGHBOR_SOLICIT => {
                take(body, 20)?;
                Ok(NdpMessage::NeighborSolicit(NeighborSolicit {
                    target: read_addr(&body[4..20]),
                    options: NdOption::decode_all(&body[20..])?,
                }))
            }
            ICMP6_NEIGHBOR_ADVERT => {
                take(body, 20)?;
                let flags = u32::from_be_bytes(body[0..4].try_into().unwrap());
                Ok(NdpMessage::NeighborAdvert(NeighborAdvert {
                    router: flags & 0x8000_0000 != 0,
                    solicited: flags & 0x4000_0000 != 0,
                    override_flag: flags & 0x2000_0000 != 0,
                    target: read_addr(&body[4..20]),
                    options: NdOption::decode_all(&body[20..])?,
                }))
            }
            ICMP6_REDIRECT => {
                take(body, 36)?;
                Ok(NdpMessage::Redirect(Redirect {
                    target: read_addr(&body[4..20]),
                    destination: read_addr(&body[20..36]),
                    options: NdOption::decode_all(&body[36..])?,
                }))
            }
            other => Err(WireError::UnknownType(other)),
        }
    }
}

fn encode_options(out: &mut Vec<u8>, options: &[NdOption]) {
    for opt in options {
        opt.encode(out);
    }
}

/// Checks `body` holds at least `fixed` bytes and returns the option area.
fn take(body: &[u8], fixed: usize) -> Result<&[u8], WireError> {
    if body.len() < fixed {
        return Err(WireError::Truncated {
            need: fixed,
            have: body.len(),
        });
    }
    Ok(&body[fixed..])
}

fn read_addr(bytes: &[u8]) -> Ipv6Addr {
    let octets: [u8; 16] = bytes.try_into().unwrap();
    Ipv6Addr::from(octets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::PrefixInfo;
    use pretty_assertions::assert_eq;

    fn roundtrip(msg: NdpMessage) {
        let bytes = msg.encode();
        assert_eq!(NdpMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn router_advert_roundtrip() {
        roundtrip(NdpMessage::RouterAdvert(RouterAdvert {
            cur_hop_limit: 64,
            managed: true,
            other_config: false,
            router_lifetime: 1800,
            reachable_time_ms: 30_000,
            retrans_timer_ms: 1000,
            options: vec![
                NdOption::SourceLinkAddr(MacAddress::new([0, 0x11, 0x22, 0x33, 0x44, 0x55])),
                NdOption::PrefixInfo(PrefixInfo {
                    prefix_len: 64,
                    on_link: true,
                    autonomous: true,
                    valid_lifetime: 86400,
                    preferred_lifetime: 14400,
                    prefix: "2001:db8::".parse().unwrap(),
                }),
                NdOption::Mtu(1500),
            ],
        }));
    }

    #[test]
    fn neighbor_solicit_layout() {
        let msg = NdpMessage::NeighborSolicit(NeighborSolicit {
            target: "2001:db8::1".parse().unwrap(),
            options: vec![],
        });
        let bytes = msg.encode();
        assert_eq!(bytes[0], ICMP6_NEIGHBOR_SOLICIT);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[8..24], &"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        roundtrip(msg);
    }

    #[test]
    fn neighbor_advert_flags() {
        let msg = NdpMessage::NeighborAdvert(NeighborAdvert {
            router: true,
            solicited: true,
            override_flag: false,
            target: "fe80::1".parse().unwrap(),
            options: vec![NdOption::TargetLinkAddr(MacAddress::new([1, 2, 3, 4, 5, 6]))],
        });
        let bytes = msg.encode();
        assert_eq!(bytes[4], 0xc0); // R | S
        roundtrip(msg);
    }

    #[test]
    fn redirect_roundtrip() {
        roundtrip(NdpMessage::Redirect(Redirect {
            target: "fe80::2".parse().unwrap(),
            destination: "2001:db8::99".parse().unwrap(),
            options: vec![NdOption::RedirectedHeader(vec![0x60, 0, 0, 0, 0, 0, 0, 40])],
        }));
    }

    #[test]
    fn router_solicit_roundtrip() {
        roundtrip(NdpMessage::RouterSolicit(RouterSolicit {
            options: vec![NdOption::SourceLinkAddr(MacAddress::new([9, 8, 7, 6, 5, 4]))],
        }));
    }

    #[test]
    fn rejects_nonzero_code() {
        let mut bytes = NdpMessage::RouterSolicit(RouterSolicit::default()).encode();
        bytes[1] = 1;
        assert_eq!(NdpMessage::decode(&bytes), Err(WireError::NonZeroCode(1)));
    }

    #[test]
    fn rejects_short_body() {
        let bytes = [ICMP6_ROUTER_ADVERT, 0, 0, 0, 64, 0];
        assert!(matches!(
            NdpMessage::decode(&bytes),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = [128u8, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(NdpMessage::decode(&bytes), Err(WireError::UnknownType(128)));
    }

    #[test]
    fn rejects_bad_option_in_valid_header() {
        let mut bytes = NdpMessage::NeighborSolicit(NeighborSolicit {
            target: "fe80::1".parse().unwrap(),
            options: vec![],
        })
        .encode();
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]); // zero-length option
        assert_eq!(
            NdpMessage::decode(&bytes),
            Err(WireError::ZeroLengthOption)
        );
    }
}
