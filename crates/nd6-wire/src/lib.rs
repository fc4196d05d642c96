//! Bit-exact ICMPv6 Neighbor Discovery message codecs.
//!
//! Encodes and decodes the five NDP message kinds (Router Solicitation,
//! Router Advertisement, Neighbor Solicitation, Neighbor Advertisement,
//! Redirect) and their option TLVs, per RFC 4861. Messages are decoded once
//! at the boundary into a tagged [`NdpMessage`] enum; the engine never
//! touches raw wire bytes.
//!
//! The ICMPv6 checksum is carried opaquely: [`NdpMessage::encode`] writes a
//! zero checksum for the packet-output collaborator to fill in, and decode
//! ignores the field (verification happens before the bytes reach nd6).

mod message;
mod option;

pub use message::{
    NdpMessage, NeighborAdvert, NeighborSolicit, Redirect, RouterAdvert, RouterSolicit,
};
pub use option::{NdOption, PrefixInfo};

/// ICMPv6 message type: Router Solicitation.
pub const ICMP6_ROUTER_SOLICIT: u8 = 133;
/// ICMPv6 message type: Router Advertisement.
pub const ICMP6_ROUTER_ADVERT: u8 = 134;
/// ICMPv6 message type: Neighbor Solicitation.
pub const ICMP6_NEIGHBOR_SOLICIT: u8 = 135;
/// ICMPv6 message type: Neighbor Advertisement.
pub const ICMP6_NEIGHBOR_ADVERT: u8 = 136;
/// ICMPv6 message type: Redirect.
pub const ICMP6_REDIRECT: u8 = 137;

/// Decode failures. Any of these means the packet is silently dropped by
/// the engine (RFC 4861 section 6.1: "silently discard").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown NDP message type: {0}")]
    UnknownType(u8),

    #[error("non-zero ICMP code: {0}")]
    NonZeroCode(u8),

    #[error("option with zero length")]
    ZeroLengthOption,

    #[error("option overruns message: declared {declared} bytes, {remaining} remain")]
    OptionOverrun { declared: usize, remaining: usize },

    #[error("malformed {kind} option: bad length {len}")]
    BadOptionLength { kind: &'static str, len: u8 },
}
