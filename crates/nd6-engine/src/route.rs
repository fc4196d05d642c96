//! Destination route table and the per-flow route cache.
//!
//! The table buckets routes by prefix length (129 buckets, /0 through
//! /128); longest-prefix match walks the buckets downward and takes the
//! first containing route. Resolved lookups are materialized in a small
//! hashed cache keyed by (destination, source); cache entries carry the
//! tag of the route that produced them so a route delete can invalidate
//! exactly its own cache entries.

use crate::config::{ROUTE_CACHE_BUCKETS, ROUTE_CACHE_MAX_PER_BUCKET};
use crate::error::{EngineError, Result};
use log::debug;
use nd6_types::Ipv6Net;
use std::collections::VecDeque;
use std::net::Ipv6Addr;

/// A configured route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub dest: Ipv6Net,
    /// Next hop; ignored for direct routes.
    pub gateway: Ipv6Addr,
    /// Direct routes deliver on-link; indirect routes go via the gateway.
    pub direct: bool,
    /// Identity used for cache invalidation.
    tag: u64,
}

impl RouteEntry {
    pub fn tag(&self) -> u64 {
        self.tag
    }
}

/// One materialized (destination, source) lookup.
#[derive(Debug, Clone)]
pub struct CachedRoute {
    pub dest: Ipv6Addr,
    pub src: Ipv6Addr,
    /// The address to resolve at the link layer: the destination itself
    /// for on-link delivery, the gateway otherwise.
    pub next_hop: Ipv6Addr,
    /// Tag of the originating route, zero for redirect-created entries.
    pub tag: u64,
}

fn cache_bucket(dest: Ipv6Addr, src: Ipv6Addr) -> usize {
    let mut fold = 0u8;
    for b in dest.octets().iter().chain(src.octets().iter()) {
        fold ^= b;
    }
    usize::from(fold) % ROUTE_CACHE_BUCKETS
}

/// The route cache. Each bucket keeps its most recent entries at the
/// front; the slow tick trims overgrown buckets from the tail.
#[derive(Debug)]
pub struct RouteCache {
    buckets: [VecDeque<CachedRoute>; ROUTE_CACHE_BUCKETS],
}

impl Default for RouteCache {
    fn default() -> Self {
        Self {
            buckets: [const { VecDeque::new() }; ROUTE_CACHE_BUCKETS],
        }
    }
}

impl RouteCache {
    pub fn get(&mut self, dest: Ipv6Addr, src: Ipv6Addr) -> Option<&CachedRoute> {
        let bucket = &mut self.buckets[cache_bucket(dest, src)];
        let pos = bucket.iter().position(|e| e.dest == dest && e.src == src)?;
        if pos != 0 {
            let entry = bucket.remove(pos).unwrap();
            bucket.push_front(entry);
        }
        bucket.front()
    }

    /// Inserts at the bucket head, replacing a stale entry for the same
    /// flow. Buckets grow past their cap between trims.
    pub fn insert(&mut self, entry: CachedRoute) {
        let bucket = &mut self.buckets[cache_bucket(entry.dest, entry.src)];
        bucket.retain(|e| !(e.dest == entry.dest && e.src == entry.src));
        bucket.push_front(entry);
    }

    /// Redirect processing: repoints cached flows to `dest` that currently
    /// go via `old_hop`. Returns the number of flows updated.
    pub fn repoint(&mut self, dest: Ipv6Addr, old_hop: Ipv6Addr, next_hop: Ipv6Addr) -> usize {
        let mut updated = 0;
        for bucket in &mut self.buckets {
            for entry in bucket
                .iter_mut()
                .filter(|e| e.dest == dest && e.next_hop == old_hop)
            {
                entry.next_hop = next_hop;
                entry.tag = 0;
                updated += 1;
            }
        }
        updated
    }

    /// Drops every entry materialized from the route with `tag`.
    pub fn invalidate_tag(&mut self, tag: u64) {
        for bucket in &mut self.buckets {
            bucket.retain(|e| e.tag != tag);
        }
    }

    /// Drops every entry whose next hop is `next_hop` (neighbor removal).
    pub fn invalidate_next_hop(&mut self, next_hop: Ipv6Addr) {
        for bucket in &mut self.buckets {
            bucket.retain(|e| e.next_hop != next_hop);
        }
    }

    /// Trims each bucket back to its cap, dropping the least recently
    /// used tail entries. Runs on the slow tick.
    pub fn trim(&mut self) {
        for bucket in &mut self.buckets {
            bucket.truncate(ROUTE_CACHE_MAX_PER_BUCKET);
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    #[cfg(test)]
    fn bucket_len(&self, dest: Ipv6Addr, src: Ipv6Addr) -> usize {
        self.buckets[cache_bucket(dest, src)].len()
    }
}

/// The destination route table.
pub struct RouteTable {
    /// Bucket index is the prefix length.
    buckets: [Vec<RouteEntry>; 129],
    next_tag: u64,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            buckets: [const { Vec::new() }; 129],
            next_tag: 1,
        }
    }
}

impl RouteTable {
    /// Adds a route. Two routes to the same destination prefix may
    /// coexist only with different gateways.
    pub fn add(&mut self, dest: Ipv6Net, gateway: Ipv6Addr, direct: bool) -> Result<u64> {
        let bucket = &mut self.buckets[usize::from(dest.prefix_len())];
        if bucket
            .iter()
            .any(|e| e.dest == dest && e.gateway == gateway)
        {
            return Err(EngineError::AlreadyExists(dest.to_string()));
        }
        let tag = self.next_tag;
        self.next_tag += 1;
        debug!("route {dest} via {gateway} added (direct: {direct})");
        bucket.push(RouteEntry {
            dest,
            gateway,
            direct,
            tag,
        });
        Ok(tag)
    }

    /// Deletes a route, returning its tag for cache invalidation.
    pub fn delete(&mut self, dest: Ipv6Net, gateway: Ipv6Addr) -> Result<u64> {
        let bucket = &mut self.buckets[usize::from(dest.prefix_len())];
        let pos = bucket
            .iter()
            .position(|e| e.dest == dest && e.gateway == gateway)
            .ok_or_else(|| EngineError::NotFound(dest.to_string()))?;
        let entry = bucket.remove(pos);
        debug!("route {dest} via {gateway} deleted");
        Ok(entry.tag)
    }

    /// Longest-prefix match: first containing route in the longest
    /// matching bucket.
    pub fn lookup(&self, dest: Ipv6Addr) -> Option<&RouteEntry> {
        for bucket in self.buckets.iter().rev() {
            if let Some(entry) = bucket.iter().find(|e| e.dest.contains(dest)) {
                return Some(entry);
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.buckets.iter().flat_map(|b| b.iter())
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        // Tags stay unique across clears.
    }

    /// Deletes every route whose gateway is `gateway` (default router
    /// expiry), returning their tags.
    pub fn delete_via(&mut self, gateway: Ipv6Addr) -> Vec<u64> {
        let mut tags = Vec::new();
        for bucket in &mut self.buckets {
            bucket.retain(|e| {
                if !e.direct && e.gateway == gateway {
                    tags.push(e.tag);
                    false
                } else {
                    true
                }
            });
        }
        tags
    }
}
