//! Default router list, on-link prefix list, and the router
//! solicitation schedule (RFC 4861 sections 6.3.4/6.3.7, RFC 4862 5.5.3).

use crate::config::{
    INFINITE_LIFETIME, INFINITE_ROUTER_LIFETIME, MAX_RTR_SOLICITATIONS,
    MAX_SOLICITATION_DELAY_TICKS, RTR_SOLICITATION_INTERVAL_TICKS, TWO_HOURS_SECS,
};
use log::{debug, info};
use nd6_types::Ipv6Net;
use rand::Rng;
use std::net::Ipv6Addr;

/// A default router learned from a Router Advertisement.
#[derive(Debug, Clone)]
pub struct DefaultRouter {
    pub addr: Ipv6Addr,
    /// Remaining seconds; `INFINITE_ROUTER_LIFETIME` never decays.
    pub lifetime: u32,
}

/// The default router list.
#[derive(Debug, Default)]
pub struct RouterList {
    entries: Vec<DefaultRouter>,
}

impl RouterList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.entries.iter().any(|e| e.addr == addr)
    }

    /// Applies a Router Advertisement's router lifetime. Lifetime zero
    /// removes the router; returns true when a removal happened.
    pub fn update(&mut self, addr: Ipv6Addr, lifetime_secs: u16) -> bool {
        if lifetime_secs == 0 {
            let before = self.entries.len();
            self.entries.retain(|e| e.addr != addr);
            if self.entries.len() != before {
                info!("default router {addr} withdrawn");
                return true;
            }
            return false;
        }
        let lifetime = if lifetime_secs == INFINITE_ROUTER_LIFETIME {
            INFINITE_LIFETIME
        } else {
            u32::from(lifetime_secs)
        };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            entry.lifetime = lifetime;
        } else {
            info!("default router {addr} learned (lifetime {lifetime_secs}s)");
            self.entries.push(DefaultRouter { addr, lifetime });
        }
        false
    }

    /// Removes a router whose Neighbor Advertisement cleared its R flag.
    pub fn remove(&mut self, addr: Ipv6Addr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.addr != addr);
        self.entries.len() != before
    }

    /// Decays lifetimes by one second, returning expired routers.
    pub fn tick_second(&mut self) -> Vec<Ipv6Addr> {
        let mut expired = Vec::new();
        self.entries.retain_mut(|e| {
            if e.lifetime == INFINITE_LIFETIME {
                return true;
            }
            e.lifetime = e.lifetime.saturating_sub(1);
            if e.lifetime == 0 {
                info!("default router {} expired", e.addr);
                expired.push(e.addr);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// An on-link prefix learned from a Prefix Information option.
#[derive(Debug, Clone)]
pub struct OnLinkPrefix {
    pub prefix: Ipv6Net,
    /// Remaining seconds; `INFINITE_LIFETIME` never decays.
    pub valid_lifetime: u32,
    /// Autonomous addresses formed from this prefix keep it referenced;
    /// the prefix outlives its advertised lifetime while nonzero.
    pub ref_count: u32,
}

/// The on-link prefix list, ordered by descending prefix length so the
/// first containment match is the longest.
#[derive(Debug, Default)]
pub struct PrefixList {
    entries: Vec<OnLinkPrefix>,
}

impl PrefixList {
    pub fn get(&self, prefix: Ipv6Net) -> Option<&OnLinkPrefix> {
        self.entries.iter().find(|e| e.prefix == prefix)
    }

    /// True when `addr` falls inside any on-link prefix. Link-local
    /// destinations are always on-link.
    pub fn is_on_link(&self, addr: Ipv6Addr) -> bool {
        if addr.segments()[0] & 0xffc0 == 0xfe80 {
            return true;
        }
        self.entries.iter().any(|e| e.prefix.contains(addr))
    }

    /// Inserts or refreshes a prefix with the advertised valid lifetime.
    /// With `clamp` set the refresh is subject to the two-hour rule (RFC
    /// 4862 section 5.5.3 e): the remaining lifetime never drops below
    /// two hours. Autonomous refreshes from unauthenticated
    /// advertisements clamp; on-link refreshes apply verbatim.
    pub fn update(&mut self, prefix: Ipv6Net, valid_lifetime: u32, clamp: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.prefix == prefix) {
            entry.valid_lifetime = if clamp {
                clamp_two_hour(entry.valid_lifetime, valid_lifetime)
            } else {
                valid_lifetime
            };
            return;
        }
        if valid_lifetime == 0 {
            return;
        }
        debug!("on-link prefix {prefix} learned (valid {valid_lifetime}s)");
        let entry = OnLinkPrefix {
            prefix,
            valid_lifetime,
            ref_count: 0,
        };
        let pos = self
            .entries
            .iter()
            .position(|e| e.prefix.prefix_len() < prefix.prefix_len())
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Takes a reference for each autonomous address formed from the
    /// prefix. Creates the entry if the prefix is not yet listed.
    pub fn reference(&mut self, prefix: Ipv6Net, valid_lifetime: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.prefix == prefix) {
            entry.ref_count += 1;
            return;
        }
        let entry = OnLinkPrefix {
            prefix,
            valid_lifetime,
            ref_count: 1,
        };
        let pos = self
            .entries
            .iter()
            .position(|e| e.prefix.prefix_len() < prefix.prefix_len())
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Drops a reference when an autonomous address goes away.
    pub fn release(&mut self, prefix: Ipv6Net) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.prefix == prefix) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }

    /// Removes a prefix outright (advertised valid lifetime of zero).
    pub fn remove(&mut self, prefix: Ipv6Net) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.prefix != prefix);
        self.entries.len() != before
    }

    /// Decays lifetimes by one second, returning expired prefixes.
    /// Referenced prefixes survive at zero lifetime until released.
    pub fn tick_second(&mut self) -> Vec<Ipv6Net> {
        let mut expired = Vec::new();
        self.entries.retain_mut(|e| {
            if e.valid_lifetime == INFINITE_LIFETIME {
                return true;
            }
            e.valid_lifetime = e.valid_lifetime.saturating_sub(1);
            if e.valid_lifetime == 0 && e.ref_count == 0 {
                debug!("on-link prefix {} expired", e.prefix);
                expired.push(e.prefix);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Two-hour rule: an unauthenticated refresh may always extend the
/// lifetime, but may shorten it to no less than two hours of remaining
/// validity.
pub(crate) fn clamp_two_hour(remaining: u32, advertised: u32) -> u32 {
    if advertised > TWO_HOURS_SECS || advertised > remaining {
        advertised
    } else if remaining > TWO_HOURS_SECS {
        TWO_HOURS_SECS
    } else {
        remaining
    }
}

/// Schedule for the router solicitations sent after the link-local
/// address becomes usable.
#[derive(Debug, Default)]
pub struct SolicitSchedule {
    /// Locked until link-local DAD passes.
    unlocked: bool,
    transmits: u8,
    ticks: u32,
}

impl SolicitSchedule {
    /// Releases the schedule; the first solicitation goes out after a
    /// random delay of at most MAX_RTR_SOLICITATION_DELAY.
    pub fn unlock(&mut self, rng: &mut impl Rng) {
        if self.unlocked {
            return;
        }
        self.unlocked = true;
        self.transmits = 0;
        self.ticks = rng.gen_range(1..=MAX_SOLICITATION_DELAY_TICKS);
    }

    /// Stops further solicitations once a Router Advertisement arrives.
    pub fn stop(&mut self) {
        if self.unlocked && self.transmits < MAX_RTR_SOLICITATIONS {
            debug!("router advertisement received, stopping solicitations");
        }
        self.transmits = MAX_RTR_SOLICITATIONS;
    }

    /// One fast tick; true means a Router Solicitation should go out now.
    pub fn tick(&mut self) -> bool {
        if !self.unlocked || self.transmits >= MAX_RTR_SOLICITATIONS {
            return false;
        }
        if self.ticks > 1 {
            self.ticks -= 1;
            return false;
        }
        self.transmits += 1;
        self.ticks = RTR_SOLICITATION_INTERVAL_TICKS;
        true
    }
}
