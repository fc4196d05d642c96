//! Engine configuration and the RFC 4861 protocol constants.

use serde::{Deserialize, Serialize};

/// Milliseconds per fast tick.
pub const FAST_TICK_MS: u64 = 100;

/// Fast ticks per second (the slow-tick period).
pub const TICKS_PER_SECOND: u32 = 10;

/// Maximum multicast Neighbor Solicitations during address resolution
/// (RFC 4861 section 10: MAX_MULTICAST_SOLICIT).
pub const MAX_MULTICAST_SOLICIT: u8 = 3;

/// Maximum unicast Neighbor Solicitations while probing (MAX_UNICAST_SOLICIT).
pub const MAX_UNICAST_SOLICIT: u8 = 3;

/// Delay before the first probe of a Stale entry, in fast ticks
/// (DELAY_FIRST_PROBE_TIME, 5 seconds).
pub const DELAY_FIRST_PROBE_TICKS: u32 = 50;

/// Maximum Router Solicitations sent after the link-local address is ready
/// (MAX_RTR_SOLICITATIONS).
pub const MAX_RTR_SOLICITATIONS: u8 = 3;

/// Interval between Router Solicitations, in fast ticks
/// (RTR_SOLICITATION_INTERVAL, 4 seconds).
pub const RTR_SOLICITATION_INTERVAL_TICKS: u32 = 40;

/// Upper bound of the random delay before the first DAD or router
/// solicitation transmit, in fast ticks (MAX_RTR_SOLICITATION_DELAY, 1 s).
pub const MAX_SOLICITATION_DELAY_TICKS: u32 = 10;

/// Randomization bounds for ReachableTime (MIN/MAX_RANDOM_FACTOR).
pub const MIN_RANDOM_FACTOR: f64 = 0.5;
pub const MAX_RANDOM_FACTOR: f64 = 1.5;

/// Infinite lifetime markers.
pub const INFINITE_LIFETIME: u32 = 0xffff_ffff;
pub const INFINITE_ROUTER_LIFETIME: u16 = 0xffff;

/// The two-hour floor used when refreshing autonomous prefix lifetimes
/// from unauthenticated advertisements (RFC 4862 section 5.5.3).
pub const TWO_HOURS_SECS: u32 = 7200;

/// Per-bucket cap of the route cache.
pub const ROUTE_CACHE_MAX_PER_BUCKET: usize = 32;

/// Number of route cache buckets.
pub const ROUTE_CACHE_BUCKETS: usize = 32;

/// Tunable engine configuration.
///
/// Defaults follow RFC 4861 section 10; the timer bases can be overwritten
/// at runtime by Router Advertisements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// BaseReachableTime in milliseconds (default 30 000).
    pub base_reachable_time_ms: u32,
    /// RetransTimer in milliseconds (default 1 000).
    pub retrans_timer_ms: u32,
    /// Default hop limit for originated packets until an RA overrides it.
    pub cur_hop_limit: u8,
    /// Maximum neighbor cache entries.
    pub neighbor_capacity: usize,
    /// Maximum frames queued on an entry awaiting resolution.
    pub max_pending_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_reachable_time_ms: 30_000,
            retrans_timer_ms: 1_000,
            cur_hop_limit: 64,
            neighbor_capacity: 256,
            max_pending_frames: 4,
        }
    }
}

impl EngineConfig {
    /// RetransTimer converted to fast ticks, never below one tick.
    pub fn retrans_ticks(&self) -> u32 {
        ms_to_ticks(self.retrans_timer_ms)
    }
}

/// Converts milliseconds to fast ticks, rounding up with a one-tick floor.
pub fn ms_to_ticks(ms: u32) -> u32 {
    (ms / FAST_TICK_MS as u32).max(1)
}
