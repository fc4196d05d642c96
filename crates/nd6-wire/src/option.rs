//! NDP option TLVs: type(1) + length-in-8-byte-units(1) + data.

use crate::WireError;
use nd6_types::MacAddress;
use std::net::Ipv6Addr;

const OPT_SOURCE_LINK_ADDR: u8 = 1;
const OPT_TARGET_LINK_ADDR: u8 = 2;
const OPT_PREFIX_INFO: u8 = 3;
const OPT_REDIRECTED_HEADER: u8 = 4;
const OPT_MTU: u8 = 5;

/// Prefix Information option body (RFC 4861 section 4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixInfo {
    pub prefix_len: u8,
    /// L flag: prefix is on-link.
    pub on_link: bool,
    /// A flag: prefix can be used for stateless address autoconfiguration.
    pub autonomous: bool,
    /// Valid lifetime in seconds; 0xffff_ffff means infinite.
    pub valid_lifetime: u32,
    /// Preferred lifetime in seconds; 0xffff_ffff means infinite.
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Addr,
}

/// A single NDP option.
///
/// Unrecognized option types are preserved as [`NdOption::Unknown`] with
/// their raw body (including padding) so a decoded message re-encodes
/// bit-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdOption {
    SourceLinkAddr(MacAddress),
    TargetLinkAddr(MacAddress),
    PrefixInfo(PrefixInfo),
    /// Redirected Header: the raw bytes after the 6 reserved octets.
    RedirectedHeader(Vec<u8>),
    Mtu(u32),
    Unknown { kind: u8, body: Vec<u8> },
}

impl NdOption {
    /// Appends the encoded option (padded to an 8-octet boundary) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            NdOption::SourceLinkAddr(mac) => {
                out.extend_from_slice(&[OPT_SOURCE_LINK_ADDR, 1]);
                out.extend_from_slice(mac.as_bytes());
            }
            NdOption::TargetLinkAddr(mac) => {
                out.extend_from_slice(&[OPT_TARGET_LINK_ADDR, 1]);
                out.extend_from_slice(mac.as_bytes());
            }
            NdOption::PrefixInfo(info) => {
                out.extend_from_slice(&[OPT_PREFIX_INFO, 4, info.prefix_len, 0]);
                let flags = out.len() - 1;
                if info.on_link {
                    out[flags] |= 0x80;
                }
                if info.autonomous {
                    out[flags] |= 0x40;
                }
                out.extend_from_slice(&info.valid_lifetime.to_be_bytes());
                out.extend_from_slice(&info.preferred_lifetime.to_be_bytes());
                out.extend_from_slice(&[0u8; 4]);
                out.extend_from_slice(&info.prefix.octets());
            }
            NdOption::RedirectedHeader(data) => {
                let total = 8 + data.len();
                let units = total.div_ceil(8);
                out.extend_from_slice(&[OPT_REDIRECTED_HEADER, units as u8]);
                out.extend_from_slice(&[0u8; 6]);
                out.extend_from_slice(data);
                out.resize(out.len() + (units * 8 - total), 0);
            }
            NdOption::Mtu(mtu) => {
                out.extend_from_slice(&[OPT_MTU, 1, 0, 0]);
                out.extend_from_slice(&mtu.to_be_bytes());
            }
            NdOption::Unknown { kind, body } => {
                let total = 2 + body.len();
                let units = total.div_ceil(8);
                out.extend_from_slice(&[*kind, units as u8]);
                out.extend_from_slice(body);
                out.resize(out.len() + (units * 8 - total), 0);
            }
        }
    }

    /// Walks the option area, decoding every option.
    ///
    /// Zero-length options and options whose declared length overruns the
    /// buffer abort the whole walk; the caller discards the packet.
    pub fn decode_all(mut data: &[u8]) -> Result<Vec<NdOption>, WireError> {
        let mut options = Vec::new();
        while !data.is_empty() {
            if data.len() < 2 {
                return Err(WireError::Truncated {
                    need: 2,
                    have: data.len(),
                });
            }
            let kind = data[0];
            let len = data[1];
            if len == 0 {
                return Err(WireError::ZeroLengthOption);
            }
            let total = len as usize * 8;
            if total > data.len() {
                return Err(WireError::OptionOverrun {
                    declared: total,
                    remaining: data.len(),
                });
            }
            options.push(Self::decode_one(kind, len, &data[2..total])?);
            data = &data[total..];
        }
        Ok(options)
    }

    fn decode_one(kind: u8, len: u8, body: &[u8]) -> Result<NdOption, WireError> {
        match kind {
            OPT_SOURCE_LINK_ADDR | OPT_TARGET_LINK_ADDR => {
                // Ethernet link-layer addresses are exactly one unit.
                if len != 1 {
                    return Err(WireError::BadOptionLength {
                        kind: "link-layer address",
                        len,
                    });
                }
                let mac = MacAddress::new(body[..6].try_into().unwrap());
                Ok(if kind == OPT_SOURCE_LINK_ADDR {
                    NdOption::SourceLinkAddr(mac)
                } else {
                    NdOption::TargetLinkAddr(mac)
                })
            }
            OPT_PREFIX_INFO => {
                if len != 4 {
                    return Err(WireError::BadOptionLength {
                        kind: "prefix information",
                        len,
                    });
                }
                let prefix: [u8; 16] = body[14..30].try_into().unwrap();
                Ok(NdOption::PrefixInfo(PrefixInfo {
                    prefix_len: body[0],
                    on_link: body[1] & 0x80 != 0,
                    autonomous: body[1] & 0x40 != 0,
                    valid_lifetime: u32::from_be_bytes(body[2..6].try_into().unwrap()),
                    preferred_lifetime: u32::from_be_bytes(body[6..10].try_into().unwrap()),
                    prefix: Ipv6Addr::from(prefix),
                }))
            }
            OPT_REDIRECTED_HEADER => Ok(NdOption::RedirectedHeader(body[6..].to_vec())),
            OPT_MTU => {
                if len != 1 {
                    return Err(WireError::BadOptionLength { kind: "MTU", len });
                }
                Ok(NdOption::Mtu(u32::from_be_bytes(
                    body[2..6].try_into().unwrap(),
                )))
            }
            _ => Ok(NdOption::Unknown {
                kind,
                body: body.to_vec(),
            }),
        }
    }
}
