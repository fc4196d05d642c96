//! Duplicate address detection (RFC 4862 section 5.4).
//!
//! A candidate address is tentative until the configured number of
//! Neighbor Solicitations has gone out unanswered. Solicits for the
//! candidate looped back from the link count against it: DAD fails when
//! the loopback count catches up with our own transmit count, and fails
//! immediately when another node advertises the address as its own.

use crate::config::MAX_SOLICITATION_DELAY_TICKS;
use crate::iface::{DadCallback, DadVerdict};
use log::{debug, info, warn};
use rand::Rng;
use std::net::Ipv6Addr;

/// A candidate address under detection.
pub struct DadEntry {
    pub addr: Ipv6Addr,
    /// Prefix length carried through to address activation.
    pub prefix_len: u8,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    /// Solicitations still to send; the initial value comes from the
    /// config collaborator.
    max_transmit: u8,
    transmit_count: u8,
    /// Solicits for this candidate seen on the wire (our own, looped back,
    /// or a competing node's).
    receive_count: u8,
    /// Countdown to the next transmit, or to the verdict after the last.
    ticks: u32,
    callback: Option<DadCallback>,
}

impl DadEntry {
    fn deliver(&mut self, passed: bool) {
        if let Some(cb) = self.callback.take() {
            cb(DadVerdict {
                addr: self.addr,
                passed,
            });
        }
    }
}

/// Transmit request produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DadSolicit {
    pub target: Ipv6Addr,
}

/// Verdict produced by a tick, for the engine to act on after delivering
/// the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DadResolved {
    pub addr: Ipv6Addr,
    pub prefix_len: u8,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub passed: bool,
}

/// All candidates currently under detection.
#[derive(Default)]
pub struct DadTable {
    entries: Vec<DadEntry>,
}

impl DadTable {
    pub fn is_tentative(&self, addr: Ipv6Addr) -> bool {
        self.entries.iter().any(|e| e.addr == addr)
    }

    /// Starts detection for a candidate. The first solicit goes out after
    /// a random delay of at most MAX_RTR_SOLICITATION_DELAY, per RFC 4862.
    pub fn start(
        &mut self,
        addr: Ipv6Addr,
        prefix_len: u8,
        valid_lifetime: u32,
        preferred_lifetime: u32,
        max_transmit: u8,
        callback: Option<DadCallback>,
        rng: &mut impl Rng,
    ) {
        debug_assert!(max_transmit > 0, "callers bypass DAD when transmits is 0");
        let delay = rng.gen_range(1..=MAX_SOLICITATION_DELAY_TICKS);
        debug!("dad: {addr} tentative, first solicit in {delay} ticks");
        self.entries.push(DadEntry {
            addr,
            prefix_len,
            valid_lifetime,
            preferred_lifetime,
            max_transmit,
            transmit_count: 0,
            receive_count: 0,
            ticks: delay,
            callback,
        });
    }

    /// Records a Neighbor Solicitation for a tentative address. Both our
    /// own looped-back solicits and a competing node's count.
    pub fn on_solicit(&mut self, target: Ipv6Addr) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == target) {
            entry.receive_count = entry.receive_count.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// A Neighbor Advertisement for a tentative address means another node
    /// already owns it; detection fails on the spot.
    pub fn on_advert(&mut self, target: Ipv6Addr) -> Option<DadResolved> {
        let pos = self.entries.iter().position(|e| e.addr == target)?;
        let mut entry = self.entries.remove(pos);
        warn!("dad: {target} is claimed by another node, detection failed");
        entry.deliver(false);
        Some(DadResolved {
            addr: entry.addr,
            prefix_len: entry.prefix_len,
            valid_lifetime: entry.valid_lifetime,
            preferred_lifetime: entry.preferred_lifetime,
            passed: false,
        })
    }

    /// Abandons detection for an address (teardown or explicit delete).
    pub fn cancel(&mut self, addr: Ipv6Addr) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.addr == addr) else {
            return false;
        };
        let mut entry = self.entries.remove(pos);
        entry.deliver(false);
        true
    }

    /// Advances every candidate by one fast tick.
    pub fn tick(&mut self, retrans_ticks: u32) -> (Vec<DadSolicit>, Vec<DadResolved>) {
        let mut solicits = Vec::new();
        let mut resolved = Vec::new();
        let mut done = Vec::new();

        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if entry.ticks > 1 {
                entry.ticks -= 1;
                continue;
            }
            if entry.transmit_count < entry.max_transmit {
                entry.transmit_count += 1;
                entry.ticks = retrans_ticks;
                solicits.push(DadSolicit { target: entry.addr });
            } else {
                // The full round is out and the retransmission window after
                // the last solicit has elapsed. Detection fails when every
                // one of our transmits was matched on the wire.
                let passed = entry.receive_count < entry.transmit_count;
                done.push((idx, passed));
            }
        }

        for (idx, passed) in done.into_iter().rev() {
            let mut entry = self.entries.remove(idx);
            if passed {
                info!("dad: {} passed", entry.addr);
            } else {
                warn!(
                    "dad: {} failed ({} solicits seen for {} sent)",
                    entry.addr, entry.receive_count, entry.transmit_count
                );
            }
            entry.deliver(passed);
            resolved.push(DadResolved {
                addr: entry.addr,
                prefix_len: entry.prefix_len,
                valid_lifetime: entry.valid_lifetime,
                preferred_lifetime: entry.preferred_lifetime,
                passed,
            });
        }
        (solicits, resolved)
    }
}
