//! Shared value types for the nd6 Neighbor Discovery engine.
//!
//! This crate provides the network primitives used throughout nd6:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses, including the NDP
//!   derivations (EUI-64 interface identifiers, multicast MAC mapping)
//! - [`Ipv6Net`]: IPv6 network prefixes with masked containment checks
//! - Address helpers: solicited-node multicast derivation, SLAAC address
//!   formation from a prefix and an interface identifier

mod mac;
mod net;

pub use mac::MacAddress;
pub use net::{
    combine_prefix_and_iid, solicited_node_multicast, Ipv6Net, ALL_NODES_MULTICAST,
    ALL_ROUTERS_MULTICAST,
};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IPv6 address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IPv6 prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid prefix length: {0} (must be 0-128)")]
    InvalidPrefixLen(u8),
}
