//! Assigned interface addresses and their RFC 4862 lifetimes.
//!
//! Addresses land here only after DAD passes (or is skipped). Lifetimes
//! count down on the slow tick; a preferred address becomes deprecated
//! when its preferred lifetime lapses and is removed when its valid
//! lifetime does.

use crate::config::INFINITE_LIFETIME;
use crate::error::{EngineError, Result};
use log::info;
use nd6_types::solicited_node_multicast;
use std::net::Ipv6Addr;

/// An address assigned to the interface.
#[derive(Debug, Clone)]
pub struct InterfaceAddress {
    pub addr: Ipv6Addr,
    pub prefix_len: u8,
    /// Anycast addresses skip DAD and never answer solicits with the
    /// Override flag set.
    pub anycast: bool,
    /// Remaining seconds; `INFINITE_LIFETIME` never decays.
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
}

impl InterfaceAddress {
    pub fn is_deprecated(&self) -> bool {
        self.preferred_lifetime == 0
    }
}

/// The interface's assigned-address list.
#[derive(Debug, Default)]
pub struct AddressList {
    entries: Vec<InterfaceAddress>,
}

impl AddressList {
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.entries.iter().any(|e| e.addr == addr)
    }

    pub fn get(&self, addr: Ipv6Addr) -> Option<&InterfaceAddress> {
        self.entries.iter().find(|e| e.addr == addr)
    }

    /// The interface's link-local address, once one is assigned.
    pub fn link_local(&self) -> Option<Ipv6Addr> {
        self.entries
            .iter()
            .map(|e| e.addr)
            .find(|a| a.segments()[0] & 0xffc0 == 0xfe80)
    }

    /// Activates an address. Refreshing an existing assignment just
    /// updates the lifetimes. Returns the solicited-node group to join
    /// when the address is new.
    pub fn activate(&mut self, address: InterfaceAddress) -> Option<Ipv6Addr> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.addr == address.addr) {
            existing.valid_lifetime = address.valid_lifetime;
            existing.preferred_lifetime = address.preferred_lifetime;
            return None;
        }
        info!(
            "address {}/{} active (valid {}s)",
            address.addr, address.prefix_len, address.valid_lifetime
        );
        let group = solicited_node_multicast(address.addr);
        self.entries.push(address);
        Some(group)
    }

    /// Removes an address. Returns the solicited-node group to leave.
    pub fn remove(&mut self, addr: Ipv6Addr) -> Result<Ipv6Addr> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.addr == addr)
            .ok_or_else(|| EngineError::NotFound(addr.to_string()))?;
        self.entries.remove(pos);
        Ok(solicited_node_multicast(addr))
    }

    /// Refreshes the lifetimes of an address formed from `prefix`
    /// when a matching Prefix Information option arrives again.
    pub fn refresh_lifetimes(&mut self, addr: Ipv6Addr, valid: u32, preferred: u32) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            entry.valid_lifetime = valid;
            entry.preferred_lifetime = preferred;
            true
        } else {
            false
        }
    }

    /// Decays lifetimes by one second. Returns the addresses whose valid
    /// lifetime lapsed, already removed from the list; the caller leaves
    /// their solicited-node groups.
    pub fn tick_second(&mut self) -> Vec<InterfaceAddress> {
        for entry in &mut self.entries {
            if entry.preferred_lifetime != INFINITE_LIFETIME && entry.preferred_lifetime > 0 {
                entry.preferred_lifetime -= 1;
                if entry.preferred_lifetime == 0 {
                    info!("address {} deprecated", entry.addr);
                }
            }
            if entry.valid_lifetime != INFINITE_LIFETIME && entry.valid_lifetime > 0 {
                entry.valid_lifetime -= 1;
            }
        }
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if e.valid_lifetime == 0 {
                info!("address {} expired", e.addr);
                expired.push(e.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Clears the list on teardown, returning every address.
    pub fn drain(&mut self) -> Vec<InterfaceAddress> {
        self.entries.drain(..).collect()
    }
}
