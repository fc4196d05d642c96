//! Collaborator interfaces and the frame/completion types that cross them.
//!
//! The engine never touches the link or builds full IPv6 packets itself;
//! it hands work to these traits, held as `Arc<dyn ...>` by the engine.

use nd6_types::MacAddress;
use nd6_wire::NdpMessage;
use std::fmt;
use std::net::Ipv6Addr;

/// Final disposition of an outbound frame handed to [`crate::Engine::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Transmitted on the link.
    Sent,
    /// Address resolution exhausted its retries; the neighbor is unreachable.
    Unreachable,
    /// Purged before transmission (entry deleted, interface torn down, or
    /// queue overflow).
    Cancelled,
}

/// Completion callback for a queued frame. Invoked exactly once.
pub type FrameCompletion = Box<dyn FnOnce(TxStatus) + Send>;

/// Verdict callback for a DAD candidate. Invoked exactly once, with the
/// final verdict only.
pub type DadCallback = Box<dyn FnOnce(DadVerdict) + Send>;

/// Outcome of duplicate address detection for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DadVerdict {
    pub addr: Ipv6Addr,
    pub passed: bool,
}

/// An outbound link frame waiting on address resolution.
pub struct PendingFrame {
    /// Opaque originator token, matched by cancel predicates.
    pub originator: u64,
    /// The frame payload, ready to transmit once the link address is known.
    pub payload: Vec<u8>,
    /// Invoked with the final disposition.
    pub completion: FrameCompletion,
}

impl PendingFrame {
    pub fn complete(self, status: TxStatus) {
        (self.completion)(status);
    }
}

impl fmt::Debug for PendingFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFrame")
            .field("originator", &self.originator)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// An NDP message the engine wants on the wire.
///
/// `src == None` asks the packet-output collaborator to perform source
/// address selection. The collaborator also fills in the ICMPv6 checksum.
#[derive(Debug, Clone)]
pub struct OutboundNdp {
    pub src: Option<Ipv6Addr>,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    pub message: NdpMessage,
}

/// Metadata accompanying an inbound NDP message.
#[derive(Debug, Clone, Copy)]
pub struct PacketMeta {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    /// True when the packet arrived through an authenticated channel;
    /// consulted by the two-hour rule only.
    pub secured: bool,
}

/// Address assignment policy exposed by the config collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPolicy {
    /// SLAAC plus RA-driven DHCPv6.
    Automatic,
    /// Only administratively configured addresses.
    Manual,
}

/// The link layer below the engine.
pub trait LinkLayer: Send + Sync {
    /// The interface's own MAC address.
    fn mac_address(&self) -> MacAddress;

    /// Transmits a prepared frame to `dst`. Returns false on a local
    /// transmit failure.
    fn send_frame(&self, dst: MacAddress, frame: &[u8]) -> bool;

    /// Joins a solicited-node (or other link-scope) multicast group.
    fn join_group(&self, group: Ipv6Addr);

    /// Leaves a previously joined group.
    fn leave_group(&self, group: Ipv6Addr);
}

/// The IPv6 output path: wraps an NDP message in an IPv6 header, selects a
/// source address when asked to, computes the checksum, and transmits.
pub trait PacketOutput: Send + Sync {
    fn send_ndp(&self, packet: OutboundNdp);
}

/// Policy and DHCPv6 hooks owned by the configuration collaborator.
pub trait ConfigHooks: Send + Sync {
    /// Current address assignment policy.
    fn address_policy(&self) -> AddressPolicy;

    /// Number of DAD transmissions per candidate; 0 disables DAD.
    fn dad_transmits(&self) -> u8;

    /// Starts the DHCPv6 client. `stateful` distinguishes full address
    /// assignment (RA M flag) from other-configuration only (O flag).
    fn start_dhcp6(&self, stateful: bool);

    /// Stops the DHCPv6 client.
    fn stop_dhcp6(&self);
}
