//! Neighbor cache with the RFC 4861 reachability state machine.
//!
//! Each entry tracks a neighbor through
//! `Incomplete -> {Reachable | Stale} -> Delay -> Probe -> removed` and owns
//! the outbound frames queued while its link-layer address is unknown.
//!
//! The cache itself performs no I/O: mutating calls return
//! [`NeighborAction`]s that the owning engine executes (sending
//! solicitations, transmitting flushed frames, delivering completion
//! statuses). That keeps every transmit outside the cache borrow and makes
//! the state machine testable without a link.

use crate::config::{
    DELAY_FIRST_PROBE_TICKS, MAX_MULTICAST_SOLICIT, MAX_UNICAST_SOLICIT, TICKS_PER_SECOND,
};
use crate::error::{EngineError, Result};
use crate::iface::PendingFrame;
use log::debug;
use nd6_types::MacAddress;
use nd6_wire::NeighborAdvert;
use std::collections::VecDeque;
use std::net::Ipv6Addr;

/// Reachability state of a cached neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Address resolution in flight; frames queue here.
    Incomplete,
    /// Link address confirmed within the last ReachableTime.
    Reachable,
    /// Confirmation has lapsed; usable, re-probed on next outbound use.
    Stale,
    /// First outbound use after Stale; waiting before probing.
    Delay,
    /// Unicast solicitations in flight.
    Probe,
}

/// A single neighbor cache entry.
#[derive(Debug)]
pub struct NeighborEntry {
    pub addr: Ipv6Addr,
    /// Known link-layer address; `MacAddress::ZERO` while Incomplete.
    pub mac: MacAddress,
    pub state: NeighborState,
    pub is_router: bool,
    /// True for entries inserted administratively with a TTL; these are
    /// destroyed when the TTL lapses instead of going Stale.
    pub dynamic: bool,
    /// Solicitations sent in the current Incomplete/Probe round.
    transmit_count: u8,
    /// Countdown in fast ticks; `None` disables the timer (static entries,
    /// and Stale entries which only move on use).
    ticks: Option<u32>,
    queue: VecDeque<PendingFrame>,
}

impl NeighborEntry {
    fn take_queue(&mut self) -> Vec<PendingFrame> {
        self.queue.drain(..).collect()
    }
}

/// Deferred I/O produced by cache mutations.
#[derive(Debug)]
pub enum NeighborAction {
    /// Send a multicast Neighbor Solicitation for `target` (resolution).
    MulticastSolicit { target: Ipv6Addr },
    /// Send a unicast Neighbor Solicitation to `target` (probe).
    UnicastSolicit { target: Ipv6Addr },
    /// The entry was destroyed. `unreachable` selects the completion
    /// status delivered to the drained frames.
    Remove {
        addr: Ipv6Addr,
        frames: Vec<PendingFrame>,
        unreachable: bool,
    },
}

/// Outcome of an outbound resolution attempt.
#[derive(Debug)]
pub enum ResolveOutcome {
    /// The link address is known; transmit `frame` to `mac` now.
    Resolved { mac: MacAddress, frame: PendingFrame },
    /// Resolution already in flight; the frame was queued.
    Queued,
    /// A new Incomplete entry was created and the frame queued; the
    /// accompanying action carries the first solicitation.
    Started,
    /// The entry's queue (or the cache) is full; the frame is handed back.
    Rejected { frame: PendingFrame },
}

/// Result of applying a Neighbor Advertisement.
#[derive(Debug)]
pub struct AdvertOutcome {
    /// Frames released by the resolution; transmit each to `mac`.
    pub flush: Vec<PendingFrame>,
    pub mac: MacAddress,
    /// The advertisement cleared a previously set router flag; the engine
    /// drops the neighbor from the default router list.
    pub router_cleared: bool,
}

/// The neighbor cache. Most-recently-used entries stay at the front.
pub struct NeighborCache {
    entries: Vec<NeighborEntry>,
    capacity: usize,
    max_pending: usize,
}

impl NeighborCache {
    pub fn new(capacity: usize, max_pending: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            max_pending,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, addr: Ipv6Addr) -> Option<&NeighborEntry> {
        self.entries.iter().find(|e| e.addr == addr)
    }

    /// Looks up an entry and moves it to the front (most recently used).
    pub fn touch(&mut self, addr: Ipv6Addr) -> Option<&mut NeighborEntry> {
        let pos = self.entries.iter().position(|e| e.addr == addr)?;
        let entry = self.entries.remove(pos);
        self.entries.insert(0, entry);
        Some(&mut self.entries[0])
    }

    fn insert_front(&mut self, entry: NeighborEntry) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(EngineError::OutOfResources("neighbor cache full"));
        }
        self.entries.insert(0, entry);
        Ok(())
    }

    /// Resolves `addr` for an outbound frame.
    ///
    /// A `Stale` entry is advanced to `Delay` on this first use, per RFC
    /// 4861 section 7.3.3; the frame still transmits with the cached
    /// address.
    pub fn resolve(&mut self, addr: Ipv6Addr, frame: PendingFrame) -> ResolveOutcome {
        let max_pending = self.max_pending;
        if let Some(entry) = self.touch(addr) {
            match entry.state {
                NeighborState::Incomplete => {
                    if entry.queue.len() >= max_pending {
                        return ResolveOutcome::Rejected { frame };
                    }
                    entry.queue.push_back(frame);
                    ResolveOutcome::Queued
                }
                NeighborState::Stale => {
                    entry.state = NeighborState::Delay;
                    entry.ticks = Some(DELAY_FIRST_PROBE_TICKS);
                    ResolveOutcome::Resolved {
                        mac: entry.mac,
                        frame,
                    }
                }
                _ => ResolveOutcome::Resolved {
                    mac: entry.mac,
                    frame,
                },
            }
        } else {
            if self.entries.len() >= self.capacity {
                return ResolveOutcome::Rejected { frame };
            }
            let mut queue = VecDeque::with_capacity(max_pending);
            queue.push_back(frame);
            self.entries.insert(
                0,
                NeighborEntry {
                    addr,
                    mac: MacAddress::ZERO,
                    state: NeighborState::Incomplete,
                    is_router: false,
                    dynamic: false,
                    transmit_count: 1,
                    ticks: None, // armed by arm_incomplete once the solicit is out
                    queue,
                },
            );
            ResolveOutcome::Started
        }
    }

    /// Arms the retransmission countdown of a freshly started resolution.
    pub fn arm_incomplete(&mut self, addr: Ipv6Addr, retrans_ticks: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            if entry.state == NeighborState::Incomplete {
                entry.ticks = Some(retrans_ticks);
            }
        }
    }

    /// Creates or refreshes an entry from a source link-layer address
    /// option (NS/RS/RA). Returns frames released if the entry was
    /// Incomplete, paired with the address to transmit them to.
    pub fn refresh_from_source(
        &mut self,
        addr: Ipv6Addr,
        mac: MacAddress,
        is_router: Option<bool>,
    ) -> Vec<PendingFrame> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            if let Some(router) = is_router {
                entry.is_router = router;
            }
            match entry.state {
                NeighborState::Incomplete => {
                    entry.mac = mac;
                    entry.state = NeighborState::Stale;
                    entry.ticks = None;
                    entry.transmit_count = 0;
                    debug!("neighbor {addr}: resolved to {mac} via solicitation option");
                    entry.take_queue()
                }
                _ => {
                    if entry.mac != mac {
                        debug!("neighbor {addr}: link address changed to {mac}, now Stale");
                        entry.mac = mac;
                        entry.state = NeighborState::Stale;
                        entry.ticks = None;
                    }
                    Vec::new()
                }
            }
        } else {
            let entry = NeighborEntry {
                addr,
                mac,
                state: NeighborState::Stale,
                is_router: is_router.unwrap_or(false),
                dynamic: false,
                transmit_count: 0,
                ticks: None,
                queue: VecDeque::new(),
            };
            if self.insert_front(entry).is_err() {
                debug!("neighbor cache full, ignoring {addr}");
            }
            Vec::new()
        }
    }

    /// Applies a Neighbor Advertisement per the RFC 4861 section 7.2.5
    /// override rules. Returns `None` when the advertisement is ignored.
    pub fn apply_advert(
        &mut self,
        na: &NeighborAdvert,
        link_addr: Option<MacAddress>,
        reachable_ticks: u32,
    ) -> Option<AdvertOutcome> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.addr == na.target) else {
            // Unknown neighbor: learn it as Stale if it told us its address.
            let mac = link_addr?;
            let entry = NeighborEntry {
                addr: na.target,
                mac,
                state: NeighborState::Stale,
                is_router: na.router,
                dynamic: false,
                transmit_count: 0,
                ticks: None,
                queue: VecDeque::new(),
            };
            let _ = self.insert_front(entry);
            return None;
        };

        if entry.state == NeighborState::Incomplete {
            // Resolution completes only with a target link-layer address.
            let mac = link_addr?;
            entry.mac = mac;
            entry.transmit_count = 0;
            let was_router = entry.is_router;
            entry.is_router = na.router;
            if na.solicited {
                entry.state = NeighborState::Reachable;
                entry.ticks = Some(reachable_ticks);
            } else {
                entry.state = NeighborState::Stale;
                entry.ticks = None;
            }
            return Some(AdvertOutcome {
                flush: entry.take_queue(),
                mac,
                router_cleared: was_router && !na.router,
            });
        }

        let differs = matches!(link_addr, Some(mac) if mac != entry.mac);
        if !na.override_flag && differs {
            // Conflicting address without Override: only demote Reachable.
            if entry.state == NeighborState::Reachable {
                entry.state = NeighborState::Stale;
                entry.ticks = None;
            }
            return None;
        }

        if let Some(mac) = link_addr {
            entry.mac = mac;
        }
        if na.solicited {
            entry.state = NeighborState::Reachable;
            entry.ticks = Some(reachable_ticks);
        } else if differs {
            entry.state = NeighborState::Stale;
            entry.ticks = None;
        }
        let was_router = entry.is_router;
        entry.is_router = na.router;
        Some(AdvertOutcome {
            flush: Vec::new(),
            mac: entry.mac,
            router_cleared: was_router && !na.router,
        })
    }

    /// Reports the result of flushing released frames: a successful
    /// transmit while Stale advances the entry to Delay.
    pub fn note_flush(&mut self, addr: Ipv6Addr, any_success: bool) {
        if !any_success {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            if entry.state == NeighborState::Stale {
                entry.state = NeighborState::Delay;
                entry.ticks = Some(DELAY_FIRST_PROBE_TICKS);
            }
        }
    }

    /// Administrative insert. `ttl_secs == 0` creates a static entry that
    /// never expires; otherwise the entry is destroyed when the TTL lapses.
    pub fn add_admin(
        &mut self,
        addr: Ipv6Addr,
        mac: MacAddress,
        ttl_secs: u32,
        override_existing: bool,
    ) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            if !override_existing {
                return Err(EngineError::AlreadyExists(addr.to_string()));
            }
            entry.mac = mac;
            entry.state = NeighborState::Reachable;
            entry.dynamic = ttl_secs != 0;
            entry.ticks = if ttl_secs == 0 {
                None
            } else {
                Some(ttl_secs.saturating_mul(TICKS_PER_SECOND))
            };
            return Ok(());
        }
        self.insert_front(NeighborEntry {
            addr,
            mac,
            state: NeighborState::Reachable,
            is_router: false,
            dynamic: ttl_secs != 0,
            transmit_count: 0,
            ticks: if ttl_secs == 0 {
                None
            } else {
                Some(ttl_secs.saturating_mul(TICKS_PER_SECOND))
            },
            queue: VecDeque::new(),
        })
    }

    /// Administrative delete. The drained frames get a Cancelled status
    /// from the engine.
    pub fn remove(&mut self, addr: Ipv6Addr) -> Result<Vec<PendingFrame>> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.addr == addr)
            .ok_or_else(|| EngineError::NotFound(addr.to_string()))?;
        let mut entry = self.entries.remove(pos);
        Ok(entry.take_queue())
    }

    /// Purges queued frames matching `pred` from one entry, returning them
    /// for completion delivery. The entry itself survives.
    pub fn purge_queue(
        &mut self,
        addr: Ipv6Addr,
        pred: impl Fn(&PendingFrame) -> bool,
    ) -> Vec<PendingFrame> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) else {
            return Vec::new();
        };
        let mut purged = Vec::new();
        let mut kept = VecDeque::with_capacity(entry.queue.len());
        for frame in entry.queue.drain(..) {
            if pred(&frame) {
                purged.push(frame);
            } else {
                kept.push_back(frame);
            }
        }
        entry.queue = kept;
        purged
    }

    /// Tears the whole cache down, returning every queued frame.
    pub fn drain_all(&mut self) -> Vec<PendingFrame> {
        let mut frames = Vec::new();
        for mut entry in self.entries.drain(..) {
            frames.extend(entry.take_queue());
        }
        frames
    }

    /// Advances every countdown by one fast tick.
    pub fn tick(&mut self, retrans_ticks: u32) -> Vec<NeighborAction> {
        let mut actions = Vec::new();
        let mut removed = Vec::new();

        for entry in &mut self.entries {
            let Some(ticks) = entry.ticks else { continue };
            if ticks > 1 {
                entry.ticks = Some(ticks - 1);
                continue;
            }

            match entry.state {
                NeighborState::Incomplete => {
                    if entry.transmit_count >= MAX_MULTICAST_SOLICIT {
                        debug!("neighbor {}: resolution exhausted, removing", entry.addr);
                        removed.push((entry.addr, true));
                    } else {
                        entry.transmit_count += 1;
                        entry.ticks = Some(retrans_ticks);
                        actions.push(NeighborAction::MulticastSolicit { target: entry.addr });
                    }
                }
                NeighborState::Reachable => {
                    if entry.dynamic {
                        debug!("neighbor {}: TTL expired, removing", entry.addr);
                        removed.push((entry.addr, false));
                    } else {
                        entry.state = NeighborState::Stale;
                        entry.ticks = None;
                    }
                }
                NeighborState::Delay => {
                    entry.state = NeighborState::Probe;
                    entry.transmit_count = 1;
                    entry.ticks = Some(retrans_ticks);
                    actions.push(NeighborAction::UnicastSolicit { target: entry.addr });
                }
                NeighborState::Probe => {
                    if entry.transmit_count >= MAX_UNICAST_SOLICIT {
                        debug!("neighbor {}: probes exhausted, removing", entry.addr);
                        removed.push((entry.addr, true));
                    } else {
                        entry.transmit_count += 1;
                        entry.ticks = Some(retrans_ticks);
                        actions.push(NeighborAction::UnicastSolicit { target: entry.addr });
                    }
                }
                NeighborState::Stale => {
                    // Stale has no countdown; unreachable with ticks == Some.
                    entry.ticks = None;
                }
            }
        }

        for (addr, unreachable) in removed {
            if let Some(pos) = self.entries.iter().position(|e| e.addr == addr) {
                let mut entry = self.entries.remove(pos);
                actions.push(NeighborAction::Remove {
                    addr,
                    frames: entry.take_queue(),
                    unreachable,
                });
            }
        }
        actions
    }

    /// Restarts the Reachable countdowns after ReachableTime changed.
    pub fn rearm_reachable(&mut self, reachable_ticks: u32) {
        for entry in &mut self.entries {
            if entry.state == NeighborState::Reachable && !entry.dynamic && entry.ticks.is_some() {
                entry.ticks = Some(reachable_ticks);
            }
        }
    }
}
