//! End-to-end engine tests: wire-format messages in, collaborator calls
//! and state transitions out.

use nd6_engine::iface::{
    AddressPolicy, ConfigHooks, LinkLayer, OutboundNdp, PacketMeta, PacketOutput, PendingFrame,
    TxStatus,
};
use nd6_engine::{Engine, EngineConfig, EngineError, NeighborState};
use nd6_types::{combine_prefix_and_iid, Ipv6Net, MacAddress, ALL_NODES_MULTICAST};
use nd6_wire::{
    NdOption, NdpMessage, NeighborAdvert, NeighborSolicit, PrefixInfo, Redirect, RouterAdvert,
};
use pretty_assertions::assert_eq;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const OUR_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const ROUTER: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
const ROUTER_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0xaa]);

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct MockLink {
    sent: Mutex<Vec<(MacAddress, Vec<u8>)>>,
    joined: Mutex<Vec<Ipv6Addr>>,
    left: Mutex<Vec<Ipv6Addr>>,
}

impl LinkLayer for MockLink {
    fn mac_address(&self) -> MacAddress {
        OUR_MAC
    }
    fn send_frame(&self, dst: MacAddress, frame: &[u8]) -> bool {
        self.sent.lock().unwrap().push((dst, frame.to_vec()));
        true
    }
    fn join_group(&self, group: Ipv6Addr) {
        self.joined.lock().unwrap().push(group);
    }
    fn leave_group(&self, group: Ipv6Addr) {
        self.left.lock().unwrap().push(group);
    }
}

#[derive(Default)]
struct MockOutput {
    sent: Mutex<Vec<OutboundNdp>>,
}

impl MockOutput {
    fn count<F: Fn(&OutboundNdp) -> bool>(&self, pred: F) -> usize {
        self.sent.lock().unwrap().iter().filter(|p| pred(p)).count()
    }
}

impl PacketOutput for MockOutput {
    fn send_ndp(&self, packet: OutboundNdp) {
        self.sent.lock().unwrap().push(packet);
    }
}

struct MockHooks {
    policy: AddressPolicy,
    transmits: u8,
    dhcp_started: Mutex<Vec<bool>>,
}

impl ConfigHooks for MockHooks {
    fn address_policy(&self) -> AddressPolicy {
        self.policy
    }
    fn dad_transmits(&self) -> u8 {
        self.transmits
    }
    fn start_dhcp6(&self, stateful: bool) {
        self.dhcp_started.lock().unwrap().push(stateful);
    }
    fn stop_dhcp6(&self) {}
}

fn build(
    policy: AddressPolicy,
    transmits: u8,
) -> (Engine, Arc<MockLink>, Arc<MockOutput>, Arc<MockHooks>) {
    init_logs();
    let link = Arc::new(MockLink::default());
    let output = Arc::new(MockOutput::default());
    let hooks = Arc::new(MockHooks {
        policy,
        transmits,
        dhcp_started: Mutex::new(Vec::new()),
    });
    let engine = Engine::new(
        EngineConfig::default(),
        link.clone(),
        output.clone(),
        hooks.clone(),
    );
    (engine, link, output, hooks)
}

fn meta(src: Ipv6Addr, dst: Ipv6Addr) -> PacketMeta {
    PacketMeta {
        src,
        dst,
        hop_limit: 255,
        secured: false,
    }
}

fn ra(lifetime: u16, options: Vec<NdOption>) -> Vec<u8> {
    NdpMessage::RouterAdvert(RouterAdvert {
        cur_hop_limit: 64,
        managed: false,
        other_config: false,
        router_lifetime: lifetime,
        reachable_time_ms: 0,
        retrans_timer_ms: 0,
        options,
    })
    .encode()
}

fn counting_frame(unreachable: Arc<AtomicUsize>) -> PendingFrame {
    PendingFrame {
        originator: 1,
        payload: vec![0xde, 0xad],
        completion: Box::new(move |status| {
            if status == TxStatus::Unreachable {
                unreachable.fetch_add(1, Ordering::SeqCst);
            }
        }),
    }
}

fn is_dad_solicit(p: &OutboundNdp) -> bool {
    matches!(p.message, NdpMessage::NeighborSolicit(_)) && p.src == Some(Ipv6Addr::UNSPECIFIED)
}

fn run_fast(engine: &mut Engine, ticks: u32) {
    for _ in 0..ticks {
        engine.tick_fast();
    }
}

#[test]
fn router_lifetime_zero_withdraws_router_and_routes() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let dst = ALL_NODES_MULTICAST;

    engine.handle_packet(&ra(1800, vec![]), meta(ROUTER, dst));
    assert!(engine.has_default_router(ROUTER));

    let dest = Ipv6Addr::new(0x2600, 0, 0, 0, 0, 0, 0, 1);
    let src = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    assert_eq!(engine.route(dest, src).unwrap(), ROUTER);

    engine.handle_packet(&ra(0, vec![]), meta(ROUTER, dst));
    assert!(!engine.has_default_router(ROUTER));
    // The default route and the cached flow went with it.
    assert!(matches!(
        engine.route(dest, src),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn ra_from_non_link_local_source_is_dropped() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let bogus = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
    engine.handle_packet(&ra(1800, vec![]), meta(bogus, ALL_NODES_MULTICAST));
    assert!(!engine.has_default_router(bogus));
}

#[test]
fn wrong_hop_limit_is_dropped() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let mut m = meta(ROUTER, ALL_NODES_MULTICAST);
    m.hop_limit = 64;
    engine.handle_packet(&ra(1800, vec![]), m);
    assert!(!engine.has_default_router(ROUTER));
}

#[test]
fn slaac_forms_address_without_duplicate_dad() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Automatic, 1);
    let prefix: Ipv6Net = "2001:db8::/64".parse().unwrap();
    let pio = NdOption::PrefixInfo(PrefixInfo {
        prefix_len: 64,
        on_link: true,
        autonomous: true,
        valid_lifetime: 3600,
        preferred_lifetime: 1800,
        prefix: prefix.addr(),
    });

    engine.handle_packet(&ra(1800, vec![pio.clone()]), meta(ROUTER, ALL_NODES_MULTICAST));
    run_fast(&mut engine, 60);

    let formed = combine_prefix_and_iid(prefix, OUR_MAC.eui64_interface_id());
    assert!(engine.has_address(formed));
    let dad_solicits = output.count(is_dad_solicit);
    assert_eq!(dad_solicits, 1);

    // The same advertisement again refreshes; no second round of DAD.
    engine.handle_packet(&ra(1800, vec![pio]), meta(ROUTER, ALL_NODES_MULTICAST));
    run_fast(&mut engine, 60);
    assert_eq!(output.count(is_dad_solicit), dad_solicits);
}

#[test]
fn manual_policy_ignores_autonomous_prefixes() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Manual, 1);
    let prefix: Ipv6Net = "2001:db8::/64".parse().unwrap();
    let pio = NdOption::PrefixInfo(PrefixInfo {
        prefix_len: 64,
        on_link: false,
        autonomous: true,
        valid_lifetime: 3600,
        preferred_lifetime: 1800,
        prefix: prefix.addr(),
    });
    engine.handle_packet(&ra(1800, vec![pio]), meta(ROUTER, ALL_NODES_MULTICAST));
    run_fast(&mut engine, 60);
    assert_eq!(output.count(is_dad_solicit), 0);
}

#[test]
fn resolution_exhaustion_fails_queued_frames() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Manual, 1);
    let target = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 5);
    let unreachable = Arc::new(AtomicUsize::new(0));

    let state = engine
        .resolve(target, counting_frame(unreachable.clone()))
        .unwrap();
    assert_eq!(state, NeighborState::Incomplete);
    engine
        .resolve(target, counting_frame(unreachable.clone()))
        .unwrap();

    // Three multicast solicits at RetransTimer, then removal.
    run_fast(&mut engine, 50);
    assert_eq!(engine.neighbor_state(target), None);
    assert_eq!(unreachable.load(Ordering::SeqCst), 2);
    let solicits = output.count(|p| {
        matches!(&p.message, NdpMessage::NeighborSolicit(ns) if ns.target == target)
    });
    assert_eq!(solicits, 3);
}

#[test]
fn solicited_advert_flushes_queue_to_link() {
    let (mut engine, link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let target = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 5);
    let sent = Arc::new(AtomicUsize::new(0));
    let counter = sent.clone();
    engine
        .resolve(
            target,
            PendingFrame {
                originator: 1,
                payload: vec![0x01, 0x02, 0x03],
                completion: Box::new(move |status| {
                    assert_eq!(status, TxStatus::Sent);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
        )
        .unwrap();

    let na = NdpMessage::NeighborAdvert(NeighborAdvert {
        router: false,
        solicited: true,
        override_flag: true,
        target,
        options: vec![NdOption::TargetLinkAddr(ROUTER_MAC)],
    });
    let our = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    engine.handle_packet(&na.encode(), meta(target, our));

    assert_eq!(engine.neighbor_state(target), Some(NeighborState::Reachable));
    assert_eq!(sent.load(Ordering::SeqCst), 1);
    let frames = link.sent.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, ROUTER_MAC);
    assert_eq!(frames[0].1, vec![0x01, 0x02, 0x03]);
}

#[test]
fn dad_loopback_fails_the_candidate() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Manual, 1);
    let candidate = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x42);
    let verdicts = Arc::new(Mutex::new(Vec::new()));
    let sink = verdicts.clone();
    engine
        .set_address(
            candidate,
            64,
            false,
            3600,
            1800,
            Some(Box::new(move |v| sink.lock().unwrap().push(v.passed))),
        )
        .unwrap();

    // Tick until the single DAD solicit is on the wire, then loop it back.
    let mut echoed = false;
    for _ in 0..200 {
        engine.tick_fast();
        if !echoed && output.count(is_dad_solicit) == 1 {
            let ns = NdpMessage::NeighborSolicit(NeighborSolicit {
                target: candidate,
                options: vec![],
            });
            engine.handle_packet(
                &ns.encode(),
                meta(Ipv6Addr::UNSPECIFIED, ALL_NODES_MULTICAST),
            );
            echoed = true;
        }
    }

    assert_eq!(verdicts.lock().unwrap().as_slice(), &[false]);
    assert!(!engine.has_address(candidate));
    // A global duplicate does not disable the interface.
    assert!(!engine.is_disabled());
}

#[test]
fn duplicate_link_local_disables_the_interface() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let candidate = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x42);
    engine
        .set_address(candidate, 64, false, u32::MAX, u32::MAX, None)
        .unwrap();

    // Another node claims the address outright.
    let na = NdpMessage::NeighborAdvert(NeighborAdvert {
        router: false,
        solicited: false,
        override_flag: true,
        target: candidate,
        options: vec![NdOption::TargetLinkAddr(ROUTER_MAC)],
    });
    engine.handle_packet(&na.encode(), meta(ROUTER, ALL_NODES_MULTICAST));

    assert!(engine.is_disabled());
    assert!(matches!(
        engine.set_address(candidate, 64, false, u32::MAX, u32::MAX, None),
        Err(EngineError::InterfaceDisabled)
    ));
}

#[test]
fn link_local_dad_pass_triggers_router_solicitations() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Automatic, 1);
    let ll = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x42);
    engine
        .set_address(ll, 64, false, u32::MAX, u32::MAX, None)
        .unwrap();

    // DAD with a quiet wire, then the solicitation schedule.
    run_fast(&mut engine, 300);
    assert!(engine.has_address(ll));
    let rs_count = output.count(|p| matches!(p.message, NdpMessage::RouterSolicit(_)));
    assert_eq!(rs_count, 3);
}

#[test]
fn ra_managed_flag_starts_stateful_dhcp6_once() {
    let (mut engine, _link, _output, hooks) = build(AddressPolicy::Automatic, 1);
    let mut advert = RouterAdvert {
        cur_hop_limit: 0,
        managed: true,
        other_config: false,
        router_lifetime: 1800,
        reachable_time_ms: 0,
        retrans_timer_ms: 0,
        options: vec![],
    };
    let payload = NdpMessage::RouterAdvert(advert.clone()).encode();
    engine.handle_packet(&payload, meta(ROUTER, ALL_NODES_MULTICAST));
    // Repeats and flag changes do not restart the client.
    advert.managed = false;
    advert.other_config = true;
    let payload = NdpMessage::RouterAdvert(advert).encode();
    engine.handle_packet(&payload, meta(ROUTER, ALL_NODES_MULTICAST));

    assert_eq!(hooks.dhcp_started.lock().unwrap().as_slice(), &[true]);
}

#[test]
fn delete_route_is_idempotent_not_found() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let dest: Ipv6Net = "2001:db8::/64".parse().unwrap();
    engine.add_route(dest, Some(ROUTER)).unwrap();
    assert_eq!(
        engine.add_route(dest, Some(ROUTER)),
        Err(EngineError::AlreadyExists(dest.to_string()))
    );
    engine.delete_route(dest, Some(ROUTER)).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            engine.delete_route(dest, Some(ROUTER)),
            Err(EngineError::NotFound(_))
        ));
    }
}

#[test]
fn longest_prefix_match_prefers_the_more_specific_route() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let gw48 = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x48);
    engine
        .add_route("2001:db8::/32".parse().unwrap(), Some(ROUTER))
        .unwrap();
    engine
        .add_route("2001:db8:1::/48".parse().unwrap(), Some(gw48))
        .unwrap();

    let dest = Ipv6Addr::new(0x2001, 0xdb8, 1, 0, 0, 0, 0, 1);
    let src = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    assert_eq!(engine.route(dest, src).unwrap(), gw48);
}

#[test]
fn redirect_repoints_flow_and_learns_neighbor() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 0);
    let our = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    // DAD transmits 0: the address activates immediately.
    engine.set_address(our, 64, false, u32::MAX, u32::MAX, None).unwrap();

    engine.handle_packet(&ra(1800, vec![]), meta(ROUTER, ALL_NODES_MULTICAST));
    let dest = Ipv6Addr::new(0x2600, 0, 0, 0, 0, 0, 0, 7);
    assert_eq!(engine.route(dest, our).unwrap(), ROUTER);

    let better = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 9);
    let better_mac = MacAddress::new([0x02, 0, 0, 0, 0, 0x09]);
    let redirect = NdpMessage::Redirect(Redirect {
        target: better,
        destination: dest,
        options: vec![NdOption::TargetLinkAddr(better_mac)],
    });
    engine.handle_packet(&redirect.encode(), meta(ROUTER, our));

    assert_eq!(engine.route(dest, our).unwrap(), better);
    assert_eq!(engine.neighbor_state(better), Some(NeighborState::Stale));
}

#[test]
fn neighbor_solicit_is_answered_for_our_address() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Manual, 0);
    let our = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    engine.set_address(our, 64, false, u32::MAX, u32::MAX, None).unwrap();

    let peer = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x20);
    let ns = NdpMessage::NeighborSolicit(NeighborSolicit {
        target: our,
        options: vec![NdOption::SourceLinkAddr(ROUTER_MAC)],
    });
    engine.handle_packet(&ns.encode(), meta(peer, our));

    // The solicit's link-layer option seeded the cache.
    assert_eq!(engine.neighbor_state(peer), Some(NeighborState::Stale));
    let answered = output.count(|p| {
        matches!(&p.message,
            NdpMessage::NeighborAdvert(na) if na.target == our && na.solicited)
            && p.dst == peer
    });
    assert_eq!(answered, 1);
}

#[test]
fn admin_neighbor_lifecycle() -> anyhow::Result<()> {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let peer = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x20);
    let mac = MacAddress::new([0x02, 0, 0, 0, 0, 0x20]);

    engine.add_neighbor(peer, mac, 0, false)?;
    assert_eq!(engine.neighbor_state(peer), Some(NeighborState::Reachable));
    assert_eq!(
        engine.add_neighbor(peer, mac, 0, false),
        Err(EngineError::AlreadyExists(peer.to_string()))
    );
    engine.add_neighbor(peer, mac, 30, true)?;
    engine.delete_neighbor(peer)?;
    assert!(matches!(
        engine.delete_neighbor(peer),
        Err(EngineError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn on_link_prefix_routes_directly() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let prefix: Ipv6Net = "2001:db8:5::/64".parse().unwrap();
    let pio = NdOption::PrefixInfo(PrefixInfo {
        prefix_len: 64,
        on_link: true,
        autonomous: false,
        valid_lifetime: 3600,
        preferred_lifetime: 1800,
        prefix: prefix.addr(),
    });
    engine.handle_packet(&ra(0, vec![pio]), meta(ROUTER, ALL_NODES_MULTICAST));

    let dest = Ipv6Addr::new(0x2001, 0xdb8, 5, 0, 0, 0, 0, 0x33);
    let src = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10);
    // On-link: the next hop is the destination itself.
    assert_eq!(engine.route(dest, src).unwrap(), dest);

    // Lifetime zero withdraws the prefix and its direct route.
    let gone = NdOption::PrefixInfo(PrefixInfo {
        prefix_len: 64,
        on_link: true,
        autonomous: false,
        valid_lifetime: 0,
        preferred_lifetime: 0,
        prefix: prefix.addr(),
    });
    engine.handle_packet(&ra(0, vec![gone]), meta(ROUTER, ALL_NODES_MULTICAST));
    assert!(matches!(
        engine.route(dest, src),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn disabled_dad_activates_slaac_address_immediately() {
    let (mut engine, _link, output, _hooks) = build(AddressPolicy::Automatic, 0);
    let prefix: Ipv6Net = "2001:db8::/64".parse().unwrap();
    let pio = NdOption::PrefixInfo(PrefixInfo {
        prefix_len: 64,
        on_link: false,
        autonomous: true,
        valid_lifetime: 3600,
        preferred_lifetime: 1800,
        prefix: prefix.addr(),
    });
    engine.handle_packet(&ra(1800, vec![pio]), meta(ROUTER, ALL_NODES_MULTICAST));

    // No detection round: the formed address is usable before any tick.
    let formed = combine_prefix_and_iid(prefix, OUR_MAC.eui64_interface_id());
    assert!(engine.has_address(formed));
    run_fast(&mut engine, 60);
    assert_eq!(output.count(is_dad_solicit), 0);
}

#[test]
fn zero_lifetime_autonomous_refresh_clamps_to_two_hours() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Automatic, 0);
    let prefix: Ipv6Net = "2001:db8::/64".parse().unwrap();
    let pio = |valid, preferred| {
        NdOption::PrefixInfo(PrefixInfo {
            prefix_len: 64,
            on_link: false,
            autonomous: true,
            valid_lifetime: valid,
            preferred_lifetime: preferred,
            prefix: prefix.addr(),
        })
    };
    engine.handle_packet(
        &ra(1800, vec![pio(86_400, 14_400)]),
        meta(ROUTER, ALL_NODES_MULTICAST),
    );
    let formed = combine_prefix_and_iid(prefix, OUR_MAC.eui64_interface_id());
    assert!(engine.has_address(formed));

    // An unauthenticated advertisement shortening the validity to zero
    // clamps the remaining lifetime to two hours instead of being ignored.
    engine.handle_packet(&ra(1800, vec![pio(0, 0)]), meta(ROUTER, ALL_NODES_MULTICAST));
    for _ in 0..7_199 {
        engine.tick_slow();
    }
    assert!(engine.has_address(formed));
    engine.tick_slow();
    assert!(!engine.has_address(formed));
}

#[test]
fn cancel_frames_matches_originator_only() {
    let (mut engine, _link, _output, _hooks) = build(AddressPolicy::Manual, 1);
    let target = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 5);
    let cancelled = Arc::new(AtomicUsize::new(0));

    for originator in [7u64, 8] {
        let counter = cancelled.clone();
        engine
            .resolve(
                target,
                PendingFrame {
                    originator,
                    payload: vec![0],
                    completion: Box::new(move |status| {
                        if status == TxStatus::Cancelled {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
                },
            )
            .unwrap();
    }
    engine.cancel_frames(target, 7);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    // The entry itself is still resolving.
    assert_eq!(engine.neighbor_state(target), Some(NeighborState::Incomplete));
}
