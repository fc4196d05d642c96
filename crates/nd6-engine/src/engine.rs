//! The Neighbor Discovery engine: inbound dispatch, the two periodic
//! ticks, and the administrative surface.
//!
//! One `Engine` owns all per-interface NDP state (neighbor cache, DAD
//! table, address/router/prefix lists, route table and cache). Every
//! mutation path runs to completion while the caller holds the engine
//! exclusively; the engine itself never re-enters its own mutation path.
//! I/O goes through the three collaborator traits in [`crate::iface`].

use crate::addr::{AddressList, InterfaceAddress};
use crate::config::{ms_to_ticks, EngineConfig, MAX_RANDOM_FACTOR, MIN_RANDOM_FACTOR};
use crate::dad::{DadResolved, DadTable};
use crate::error::{EngineError, Result};
use crate::iface::{
    AddressPolicy, ConfigHooks, DadCallback, LinkLayer, OutboundNdp, PacketMeta, PacketOutput,
    PendingFrame, TxStatus,
};
use crate::neighbor::{NeighborAction, NeighborCache, NeighborState, ResolveOutcome};
use crate::route::{CachedRoute, RouteCache, RouteTable};
use crate::router::{clamp_two_hour, PrefixList, RouterList, SolicitSchedule};
use log::{debug, info, warn};
use nd6_types::{solicited_node_multicast, Ipv6Net, ALL_NODES_MULTICAST, ALL_ROUTERS_MULTICAST};
use nd6_wire::{
    NdOption, NdpMessage, NeighborAdvert, NeighborSolicit, PrefixInfo, Redirect, RouterAdvert,
    RouterSolicit,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv6Addr;
use std::sync::Arc;

const NDP_HOP_LIMIT: u8 = 255;

fn is_link_local(addr: Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// The per-interface Neighbor Discovery engine.
pub struct Engine {
    config: EngineConfig,
    link: Arc<dyn LinkLayer>,
    output: Arc<dyn PacketOutput>,
    hooks: Arc<dyn ConfigHooks>,

    neighbors: NeighborCache,
    dad: DadTable,
    addrs: AddressList,
    routers: RouterList,
    prefixes: PrefixList,
    routes: RouteTable,
    cache: RouteCache,
    solicit: SolicitSchedule,

    /// Randomized ReachableTime in fast ticks.
    reachable_ticks: u32,
    /// Latched after a duplicate link-local address; never clears.
    disabled: bool,
    dhcp6_running: bool,
    rng: StdRng,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        link: Arc<dyn LinkLayer>,
        output: Arc<dyn PacketOutput>,
        hooks: Arc<dyn ConfigHooks>,
    ) -> Self {
        let mut engine = Self {
            neighbors: NeighborCache::new(config.neighbor_capacity, config.max_pending_frames),
            config,
            link,
            output,
            hooks,
            dad: DadTable::default(),
            addrs: AddressList::default(),
            routers: RouterList::default(),
            prefixes: PrefixList::default(),
            routes: RouteTable::default(),
            cache: RouteCache::default(),
            solicit: SolicitSchedule::default(),
            reachable_ticks: 0,
            disabled: false,
            dhcp6_running: false,
            rng: StdRng::from_entropy(),
        };
        engine.recompute_reachable();
        engine
    }

    /// True after a duplicate link-local address shut the interface down.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn neighbor_state(&self, addr: Ipv6Addr) -> Option<NeighborState> {
        self.neighbors.get(addr).map(|e| e.state)
    }

    pub fn has_address(&self, addr: Ipv6Addr) -> bool {
        self.addrs.contains(addr)
    }

    pub fn has_default_router(&self, addr: Ipv6Addr) -> bool {
        self.routers.contains(addr)
    }

    fn recompute_reachable(&mut self) {
        let factor = self.rng.gen_range(MIN_RANDOM_FACTOR..MAX_RANDOM_FACTOR);
        let ms = (f64::from(self.config.base_reachable_time_ms) * factor) as u32;
        self.reachable_ticks = ms_to_ticks(ms);
    }

    // ---- inbound dispatch ----

    /// Feeds one received ICMPv6 NDP payload into the engine. Malformed
    /// or invalid messages are dropped silently.
    pub fn handle_packet(&mut self, payload: &[u8], meta: PacketMeta) {
        if self.disabled {
            return;
        }
        if meta.hop_limit != NDP_HOP_LIMIT {
            debug!("ndp: dropping packet with hop limit {}", meta.hop_limit);
            return;
        }
        let message = match NdpMessage::decode(payload) {
            Ok(m) => m,
            Err(err) => {
                debug!("ndp: dropping undecodable packet: {err}");
                return;
            }
        };
        match message {
            NdpMessage::NeighborSolicit(ns) => self.on_neighbor_solicit(&ns, &meta),
            NdpMessage::NeighborAdvert(na) => self.on_neighbor_advert(&na, &meta),
            NdpMessage::RouterAdvert(ra) => self.on_router_advert(&ra, &meta),
            NdpMessage::RouterSolicit(rs) => self.on_router_solicit(&rs, &meta),
            NdpMessage::Redirect(rd) => self.on_redirect(&rd, &meta),
        }
    }

    fn on_neighbor_solicit(&mut self, ns: &NeighborSolicit, meta: &PacketMeta) {
        if ns.target.is_multicast() {
            return;
        }
        let slla = ns
            .options
            .iter()
            .find_map(|o| match o {
                NdOption::SourceLinkAddr(mac) => Some(*mac),
                _ => None,
            });

        if meta.src.is_unspecified() {
            // DAD solicit, ours looped back or a competing node's. It must
            // not carry a source link-layer address.
            if slla.is_some() {
                return;
            }
            if self.dad.on_solicit(ns.target) {
                return;
            }
            if self.addrs.contains(ns.target) {
                // Defend the address: unsolicited advertisement to all nodes.
                self.send_neighbor_advert(ns.target, ALL_NODES_MULTICAST, false);
            }
            return;
        }

        // Resolution or probe from a specified source.
        if self.dad.is_tentative(ns.target) {
            return;
        }
        if let Some(mac) = slla {
            let flush = self.neighbors.refresh_from_source(meta.src, mac, None);
            self.transmit_flush(meta.src, mac, flush);
        }
        if self.addrs.contains(ns.target) {
            self.send_neighbor_advert(ns.target, meta.src, true);
        }
    }

    fn on_neighbor_advert(&mut self, na: &NeighborAdvert, meta: &PacketMeta) {
        if na.target.is_multicast() {
            return;
        }
        if na.solicited && meta.dst.is_multicast() {
            return;
        }
        if self.dad.is_tentative(na.target) {
            // Another node owns the candidate.
            if let Some(resolved) = self.dad.on_advert(na.target) {
                self.finish_dad(resolved);
            }
            return;
        }
        let tlla = na.options.iter().find_map(|o| match o {
            NdOption::TargetLinkAddr(mac) => Some(*mac),
            _ => None,
        });
        let reachable = self.reachable_ticks;
        if let Some(outcome) = self.neighbors.apply_advert(na, tlla, reachable) {
            self.transmit_flush(na.target, outcome.mac, outcome.flush);
            if outcome.router_cleared {
                self.remove_router(na.target);
            }
        }
    }

    fn on_router_advert(&mut self, ra: &RouterAdvert, meta: &PacketMeta) {
        if !is_link_local(meta.src) {
            return;
        }
        self.solicit.stop();

        if self.routers.update(meta.src, ra.router_lifetime) {
            self.drop_routes_via(meta.src);
        } else if ra.router_lifetime != 0 {
            // A learned router spawns (or keeps) the default route.
            match self.routes.add(Ipv6Net::DEFAULT, meta.src, false) {
                Ok(_) | Err(EngineError::AlreadyExists(_)) => {}
                Err(err) => warn!("default route via {}: {err}", meta.src),
            }
        }

        if ra.cur_hop_limit != 0 {
            self.config.cur_hop_limit = ra.cur_hop_limit;
        }
        if (ra.managed || ra.other_config)
            && !self.dhcp6_running
            && self.hooks.address_policy() == AddressPolicy::Automatic
        {
            info!(
                "router advertisement requests dhcpv6 (stateful: {})",
                ra.managed
            );
            self.hooks.start_dhcp6(ra.managed);
            self.dhcp6_running = true;
        }
        if ra.reachable_time_ms != 0 && ra.reachable_time_ms != self.config.base_reachable_time_ms {
            self.config.base_reachable_time_ms = ra.reachable_time_ms;
            self.recompute_reachable();
            let reachable = self.reachable_ticks;
            self.neighbors.rearm_reachable(reachable);
        }
        if ra.retrans_timer_ms != 0 {
            self.config.retrans_timer_ms = ra.retrans_timer_ms;
        }

        for option in &ra.options {
            match option {
                NdOption::SourceLinkAddr(mac) => {
                    let flush = self.neighbors.refresh_from_source(meta.src, *mac, Some(true));
                    self.transmit_flush(meta.src, *mac, flush);
                }
                NdOption::PrefixInfo(pi) => self.process_prefix_info(pi, meta.secured),
                // MTU is accepted but unused; packets stay at the minimum
                // link MTU. Unknown options are skipped.
                _ => {}
            }
        }
    }

    fn process_prefix_info(&mut self, pi: &PrefixInfo, secured: bool) {
        if is_link_local(pi.prefix) {
            return;
        }
        let Ok(net) = Ipv6Net::new(pi.prefix, pi.prefix_len) else {
            return;
        };

        if pi.on_link {
            if pi.valid_lifetime == 0 {
                if self.prefixes.remove(net) {
                    self.drop_direct_route(net);
                }
            } else {
                self.prefixes.update(net, pi.valid_lifetime, false);
                self.ensure_direct_route(net);
            }
        }

        if pi.autonomous && pi.preferred_lifetime <= pi.valid_lifetime && pi.prefix_len == 64 {
            let iid = self.link.mac_address().eui64_interface_id();
            let formed = nd6_types::combine_prefix_and_iid(net, iid);
            if self.addrs.contains(formed) {
                // Refresh the spawned address under the two-hour rule. A
                // zero advertised validity clamps the remaining lifetime
                // like any other shortening; it never removes the address
                // outright.
                let remaining = self
                    .addrs
                    .get(formed)
                    .map(|a| a.valid_lifetime)
                    .unwrap_or(0);
                let valid = if secured {
                    pi.valid_lifetime
                } else {
                    clamp_two_hour(remaining, pi.valid_lifetime)
                };
                self.addrs
                    .refresh_lifetimes(formed, valid, pi.preferred_lifetime.min(valid));
                self.prefixes.update(net, valid, !secured);
            } else if pi.valid_lifetime != 0
                && !self.dad.is_tentative(formed)
                && self.hooks.address_policy() == AddressPolicy::Automatic
            {
                info!("slaac: forming {formed} from {net}");
                self.start_dad(
                    formed,
                    pi.prefix_len,
                    pi.valid_lifetime,
                    pi.preferred_lifetime,
                    None,
                );
            }
        }
    }

    fn on_router_solicit(&mut self, rs: &RouterSolicit, meta: &PacketMeta) {
        // Hosts do not answer solicitations, but a specified source with a
        // link-layer option still updates the neighbor cache.
        if meta.src.is_unspecified() {
            return;
        }
        if let Some(NdOption::SourceLinkAddr(mac)) = rs
            .options
            .iter()
            .find(|o| matches!(o, NdOption::SourceLinkAddr(_)))
        {
            let flush = self.neighbors.refresh_from_source(meta.src, *mac, None);
            self.transmit_flush(meta.src, *mac, flush);
        }
    }

    fn on_redirect(&mut self, rd: &Redirect, meta: &PacketMeta) {
        if !is_link_local(meta.src) {
            return;
        }
        if !self.addrs.contains(meta.dst) {
            return;
        }
        if rd.target.is_multicast() || rd.destination.is_multicast() {
            return;
        }
        // The redirect target is either a better first-hop router
        // (link-local) or the destination itself (on-link).
        if !is_link_local(rd.target) && rd.target != rd.destination {
            return;
        }

        if let Some(NdOption::TargetLinkAddr(mac)) = rd
            .options
            .iter()
            .find(|o| matches!(o, NdOption::TargetLinkAddr(_)))
        {
            let flush = self.neighbors.refresh_from_source(rd.target, *mac, None);
            self.transmit_flush(rd.target, *mac, flush);
        }

        let updated = self.cache.repoint(rd.destination, meta.src, rd.target);
        if updated == 0 {
            // No cached flow via the redirecting router: pin a host route.
            let Ok(host) = Ipv6Net::new(rd.destination, 128) else {
                return;
            };
            let tag = match self.routes.add(host, rd.target, false) {
                Ok(tag) => tag,
                Err(_) => return,
            };
            self.cache.insert(CachedRoute {
                dest: rd.destination,
                src: meta.dst,
                next_hop: rd.target,
                tag,
            });
        }
        debug!(
            "redirect: {} now via {} ({} cached flows)",
            rd.destination, rd.target, updated
        );
    }

    // ---- address management ----

    /// Assigns an address, scheduling DAD unless the address is anycast or
    /// DAD is disabled. The callback fires exactly once with the verdict.
    pub fn set_address(
        &mut self,
        addr: Ipv6Addr,
        prefix_len: u8,
        anycast: bool,
        valid_lifetime: u32,
        preferred_lifetime: u32,
        callback: Option<DadCallback>,
    ) -> Result<()> {
        if self.disabled {
            return Err(EngineError::InterfaceDisabled);
        }
        if preferred_lifetime > valid_lifetime {
            return Err(EngineError::InvalidArgument(
                "preferred lifetime exceeds valid lifetime".into(),
            ));
        }
        if self.dad.is_tentative(addr) {
            return Err(EngineError::AlreadyExists(addr.to_string()));
        }
        if self.addrs.contains(addr) {
            self.addrs
                .refresh_lifetimes(addr, valid_lifetime, preferred_lifetime);
            if let Some(cb) = callback {
                cb(crate::iface::DadVerdict { addr, passed: true });
            }
            return Ok(());
        }

        if anycast {
            // Anycast skips DAD outright (RFC 4862 section 5.4).
            self.activate_address(
                InterfaceAddress {
                    addr,
                    prefix_len,
                    anycast: true,
                    valid_lifetime,
                    preferred_lifetime,
                },
                true,
            );
            if let Some(cb) = callback {
                cb(crate::iface::DadVerdict { addr, passed: true });
            }
            return Ok(());
        }
        self.start_dad(addr, prefix_len, valid_lifetime, preferred_lifetime, callback);
        Ok(())
    }

    /// Removes an assigned address, or abandons a tentative one.
    pub fn delete_address(&mut self, addr: Ipv6Addr) -> Result<()> {
        if self.dad.cancel(addr) {
            self.link.leave_group(solicited_node_multicast(addr));
            return Ok(());
        }
        let assigned = self
            .addrs
            .get(addr)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(addr.to_string()))?;
        let group = self.addrs.remove(addr)?;
        self.link.leave_group(group);
        self.release_covering_prefix(&assigned);
        Ok(())
    }

    /// Starts detection for a candidate, or activates it on the spot when
    /// detection is disabled (zero configured transmits).
    fn start_dad(
        &mut self,
        addr: Ipv6Addr,
        prefix_len: u8,
        valid_lifetime: u32,
        preferred_lifetime: u32,
        callback: Option<DadCallback>,
    ) {
        let transmits = self.hooks.dad_transmits();
        if transmits == 0 {
            self.activate_address(
                InterfaceAddress {
                    addr,
                    prefix_len,
                    anycast: false,
                    valid_lifetime,
                    preferred_lifetime,
                },
                true,
            );
            if let Some(cb) = callback {
                cb(crate::iface::DadVerdict { addr, passed: true });
            }
            return;
        }
        self.link.join_group(solicited_node_multicast(addr));
        self.dad.start(
            addr,
            prefix_len,
            valid_lifetime,
            preferred_lifetime,
            transmits,
            callback,
            &mut self.rng,
        );
    }

    fn finish_dad(&mut self, resolved: DadResolved) {
        if resolved.passed {
            // The solicited-node group was joined when DAD started.
            self.activate_address(
                InterfaceAddress {
                    addr: resolved.addr,
                    prefix_len: resolved.prefix_len,
                    anycast: false,
                    valid_lifetime: resolved.valid_lifetime,
                    preferred_lifetime: resolved.preferred_lifetime,
                },
                false,
            );
            return;
        }
        self.link
            .leave_group(solicited_node_multicast(resolved.addr));
        if is_link_local(resolved.addr) && self.addrs.link_local().is_none() {
            self.disable_interface();
        }
    }

    /// `join_group` is false when DAD already joined the solicited-node
    /// group at detection start.
    fn activate_address(&mut self, address: InterfaceAddress, join_group: bool) {
        let link_local = is_link_local(address.addr);
        let covering = Ipv6Net::new(address.addr, address.prefix_len).ok();
        if let Some(group) = self.addrs.activate(address.clone()) {
            if join_group {
                self.link.join_group(group);
            }
        }
        if let Some(net) = covering {
            self.prefixes.reference(net, address.valid_lifetime);
            self.ensure_direct_route(net);
        }
        if link_local {
            // The interface is usable: router discovery may begin.
            self.solicit.unlock(&mut self.rng);
        }
    }

    fn release_covering_prefix(&mut self, address: &InterfaceAddress) {
        if let Ok(net) = Ipv6Net::new(address.addr, address.prefix_len) {
            self.prefixes.release(net);
        }
    }

    fn disable_interface(&mut self) {
        warn!("duplicate link-local address, disabling interface");
        self.disabled = true;
        if self.dhcp6_running {
            self.hooks.stop_dhcp6();
            self.dhcp6_running = false;
        }
        for frame in self.neighbors.drain_all() {
            frame.complete(TxStatus::Cancelled);
        }
        for address in self.addrs.drain() {
            self.link
                .leave_group(solicited_node_multicast(address.addr));
        }
        self.routers.clear();
        self.prefixes.clear();
        self.routes.clear();
        self.cache.clear();
    }

    /// Tears the interface down, cancelling everything indiscriminately.
    pub fn teardown(&mut self) {
        for frame in self.neighbors.drain_all() {
            frame.complete(TxStatus::Cancelled);
        }
        for address in self.addrs.drain() {
            self.link
                .leave_group(solicited_node_multicast(address.addr));
        }
        self.dad = DadTable::default();
        self.routers.clear();
        self.prefixes.clear();
        self.routes.clear();
        self.cache.clear();
        self.solicit = SolicitSchedule::default();
        if self.dhcp6_running {
            self.hooks.stop_dhcp6();
            self.dhcp6_running = false;
        }
    }

    // ---- resolution and routing ----

    /// Resolves `next_hop` for an outbound frame. Known addresses transmit
    /// immediately; otherwise the frame queues behind a resolution and its
    /// completion fires when the outcome is known.
    pub fn resolve(&mut self, next_hop: Ipv6Addr, frame: PendingFrame) -> Result<NeighborState> {
        if self.disabled {
            frame.complete(TxStatus::Cancelled);
            return Err(EngineError::InterfaceDisabled);
        }
        match self.neighbors.resolve(next_hop, frame) {
            ResolveOutcome::Resolved { mac, frame } => {
                let ok = self.link.send_frame(mac, &frame.payload);
                frame.complete(if ok { TxStatus::Sent } else { TxStatus::Cancelled });
            }
            ResolveOutcome::Queued => {}
            ResolveOutcome::Started => {
                let retrans = self.config.retrans_ticks();
                self.neighbors.arm_incomplete(next_hop, retrans);
                self.send_neighbor_solicit(next_hop, None);
            }
            ResolveOutcome::Rejected { frame } => {
                frame.complete(TxStatus::Cancelled);
                return Err(EngineError::OutOfResources("resolution queue full"));
            }
        }
        // resolve above created the entry if it was absent
        Ok(self
            .neighbors
            .get(next_hop)
            .map(|e| e.state)
            .unwrap_or(NeighborState::Incomplete))
    }

    /// Cancels queued frames for `next_hop` belonging to `originator`.
    pub fn cancel_frames(&mut self, next_hop: Ipv6Addr, originator: u64) {
        let purged = self
            .neighbors
            .purge_queue(next_hop, |f| f.originator == originator);
        for frame in purged {
            frame.complete(TxStatus::Cancelled);
        }
    }

    /// The hot lookup path: next hop for `(dest, src)`, cache first, then
    /// longest-prefix match over the route table.
    pub fn route(&mut self, dest: Ipv6Addr, src: Ipv6Addr) -> Result<Ipv6Addr> {
        if self.disabled {
            return Err(EngineError::InterfaceDisabled);
        }
        if let Some(hit) = self.cache.get(dest, src) {
            return Ok(hit.next_hop);
        }
        let (next_hop, tag) = match self.routes.lookup(dest) {
            Some(entry) => {
                let hop = if entry.direct { dest } else { entry.gateway };
                (hop, entry.tag())
            }
            None if self.prefixes.is_on_link(dest) => (dest, 0),
            None => return Err(EngineError::NotFound(dest.to_string())),
        };
        self.cache.insert(CachedRoute {
            dest,
            src,
            next_hop,
            tag,
        });
        Ok(next_hop)
    }

    // ---- administrative surface ----

    /// Administrative neighbor insert. `ttl_secs == 0` means static.
    pub fn add_neighbor(
        &mut self,
        addr: Ipv6Addr,
        mac: nd6_types::MacAddress,
        ttl_secs: u32,
        override_existing: bool,
    ) -> Result<()> {
        self.neighbors.add_admin(addr, mac, ttl_secs, override_existing)
    }

    /// Administrative neighbor delete; queued frames are cancelled.
    pub fn delete_neighbor(&mut self, addr: Ipv6Addr) -> Result<()> {
        let frames = self.neighbors.remove(addr)?;
        for frame in frames {
            frame.complete(TxStatus::Cancelled);
        }
        self.cache.invalidate_next_hop(addr);
        if self.routers.remove(addr) {
            self.drop_routes_via(addr);
        }
        Ok(())
    }

    /// Administrative route insert. `gateway == None` adds a direct route.
    pub fn add_route(&mut self, dest: Ipv6Net, gateway: Option<Ipv6Addr>) -> Result<()> {
        match gateway {
            Some(gw) => self.routes.add(dest, gw, false).map(|_| ()),
            None => self.routes.add(dest, Ipv6Addr::UNSPECIFIED, true).map(|_| ()),
        }
    }

    /// Administrative route delete; cache entries it spawned go with it.
    pub fn delete_route(&mut self, dest: Ipv6Net, gateway: Option<Ipv6Addr>) -> Result<()> {
        let gw = gateway.unwrap_or(Ipv6Addr::UNSPECIFIED);
        let tag = self.routes.delete(dest, gw)?;
        self.cache.invalidate_tag(tag);
        Ok(())
    }

    // ---- timers ----

    /// The 100 ms tick: DAD and router solicitation first, then the
    /// neighbor cache sweep.
    pub fn tick_fast(&mut self) {
        if self.disabled {
            return;
        }
        let retrans = self.config.retrans_ticks();

        let (solicits, resolved) = self.dad.tick(retrans);
        for s in solicits {
            self.send_dad_solicit(s.target);
        }
        for r in resolved {
            self.finish_dad(r);
        }

        if self.solicit.tick() {
            self.send_router_solicit();
        }

        for action in self.neighbors.tick(retrans) {
            match action {
                NeighborAction::MulticastSolicit { target } => {
                    self.send_neighbor_solicit(target, None);
                }
                NeighborAction::UnicastSolicit { target } => {
                    self.send_neighbor_solicit(target, Some(target));
                }
                NeighborAction::Remove {
                    addr,
                    frames,
                    unreachable,
                } => {
                    let status = if unreachable {
                        TxStatus::Unreachable
                    } else {
                        TxStatus::Cancelled
                    };
                    for frame in frames {
                        frame.complete(status);
                    }
                    self.cache.invalidate_next_hop(addr);
                    if unreachable && self.routers.remove(addr) {
                        // An unreachable router takes its routes with it.
                        self.drop_routes_via(addr);
                    }
                }
            }
        }
    }

    /// The 1 s tick: lifetime decay and route cache trimming.
    pub fn tick_slow(&mut self) {
        if self.disabled {
            return;
        }
        for router in self.routers.tick_second() {
            self.drop_routes_via(router);
        }
        for prefix in self.prefixes.tick_second() {
            self.drop_direct_route(prefix);
        }
        for address in self.addrs.tick_second() {
            self.link
                .leave_group(solicited_node_multicast(address.addr));
            self.release_covering_prefix(&address);
        }
        self.cache.trim();
    }

    // ---- outbound helpers ----

    fn drop_routes_via(&mut self, gateway: Ipv6Addr) {
        for tag in self.routes.delete_via(gateway) {
            self.cache.invalidate_tag(tag);
        }
    }

    fn ensure_direct_route(&mut self, net: Ipv6Net) {
        match self.routes.add(net, Ipv6Addr::UNSPECIFIED, true) {
            Ok(_) | Err(EngineError::AlreadyExists(_)) => {}
            Err(err) => warn!("direct route {net}: {err}"),
        }
    }

    fn drop_direct_route(&mut self, net: Ipv6Net) {
        if let Ok(tag) = self.routes.delete(net, Ipv6Addr::UNSPECIFIED) {
            self.cache.invalidate_tag(tag);
        }
    }

    fn remove_router(&mut self, addr: Ipv6Addr) {
        if self.routers.remove(addr) {
            self.drop_routes_via(addr);
        }
    }

    fn transmit_flush(&mut self, addr: Ipv6Addr, mac: nd6_types::MacAddress, flush: Vec<PendingFrame>) {
        if flush.is_empty() {
            return;
        }
        let mut any_success = false;
        for frame in flush {
            let ok = self.link.send_frame(mac, &frame.payload);
            any_success |= ok;
            frame.complete(if ok { TxStatus::Sent } else { TxStatus::Cancelled });
        }
        self.neighbors.note_flush(addr, any_success);
    }

    /// Multicast (resolution) or unicast (probe) Neighbor Solicitation.
    fn send_neighbor_solicit(&mut self, target: Ipv6Addr, unicast_dst: Option<Ipv6Addr>) {
        let dst = unicast_dst.unwrap_or_else(|| solicited_node_multicast(target));
        let message = NdpMessage::NeighborSolicit(NeighborSolicit {
            target,
            options: vec![NdOption::SourceLinkAddr(self.link.mac_address())],
        });
        self.output.send_ndp(OutboundNdp {
            src: None,
            dst,
            hop_limit: NDP_HOP_LIMIT,
            message,
        });
    }

    /// DAD Neighbor Solicitation: unspecified source, no options.
    fn send_dad_solicit(&mut self, target: Ipv6Addr) {
        let message = NdpMessage::NeighborSolicit(NeighborSolicit {
            target,
            options: vec![],
        });
        self.output.send_ndp(OutboundNdp {
            src: Some(Ipv6Addr::UNSPECIFIED),
            dst: solicited_node_multicast(target),
            hop_limit: NDP_HOP_LIMIT,
            message,
        });
    }

    fn send_neighbor_advert(&mut self, target: Ipv6Addr, dst: Ipv6Addr, solicited: bool) {
        let anycast = self.addrs.get(target).map(|a| a.anycast).unwrap_or(false);
        let message = NdpMessage::NeighborAdvert(NeighborAdvert {
            router: false,
            solicited,
            // Anycast assignments never claim to override (RFC 4861 7.2.4).
            override_flag: !anycast,
            target,
            options: vec![NdOption::TargetLinkAddr(self.link.mac_address())],
        });
        self.output.send_ndp(OutboundNdp {
            src: Some(target),
            dst,
            hop_limit: NDP_HOP_LIMIT,
            message,
        });
    }

    fn send_router_solicit(&mut self) {
        let src = self.addrs.link_local();
        let options = if src.is_some() {
            vec![NdOption::SourceLinkAddr(self.link.mac_address())]
        } else {
            vec![]
        };
        let message = NdpMessage::RouterSolicit(RouterSolicit { options });
        self.output.send_ndp(OutboundNdp {
            src,
            dst: ALL_ROUTERS_MULTICAST,
            hop_limit: NDP_HOP_LIMIT,
            message,
        });
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("neighbors", &self.neighbors.len())
            .field("disabled", &self.disabled)
            .finish()
    }
}
