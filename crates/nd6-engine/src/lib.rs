//! nd6-engine - IPv6 Neighbor Discovery engine
//!
//! The timer-driven core of an IPv6 host stack: duplicate address
//! detection, neighbor reachability tracking, router and prefix
//! discovery, SLAAC, and the route table/route cache answering next-hop
//! queries for the outbound path.
//!
//! # Architecture
//!
//! ```text
//! [inbound NDP] ──> [Engine] ──> Neighbor Cache ─┐
//! [tick 100ms/1s] ──>  │  └────> DAD / Routers / Prefixes / Routes
//!                      │
//!                      └──> LinkLayer / PacketOutput / ConfigHooks
//! ```
//!
//! One [`Engine`] owns all per-interface state; every mutation entry
//! point (packet dispatch, ticks, administrative calls) runs to
//! completion under exclusive access, provided by [`EngineRunner`]'s
//! mutex. Components perform no I/O themselves: they return action
//! values the engine executes through the collaborator traits.
//!
//! # Key Components
//!
//! - [`Engine`]: inbound dispatch, timers, administrative surface
//! - [`neighbor::NeighborCache`]: the RFC 4861 reachability state machine
//! - [`dad::DadTable`]: duplicate address detection
//! - [`route::RouteTable`] / [`route::RouteCache`]: longest-prefix match
//!   with a hashed per-flow cache
//! - [`EngineRunner`]: tokio timer driver serializing all mutation

pub mod addr;
pub mod config;
pub mod dad;
pub mod engine;
pub mod error;
pub mod iface;
pub mod neighbor;
pub mod route;
pub mod router;
pub mod runner;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use iface::{
    AddressPolicy, ConfigHooks, DadCallback, DadVerdict, FrameCompletion, LinkLayer, OutboundNdp,
    PacketMeta, PacketOutput, PendingFrame, TxStatus,
};
pub use neighbor::NeighborState;
pub use runner::EngineRunner;
