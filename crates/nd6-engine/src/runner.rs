//! Timer driver for an [`Engine`].
//!
//! All engine mutation happens behind one async mutex, so inbound packet
//! dispatch, the two periodic ticks, and administrative calls serialize;
//! no state-machine mutation ever runs concurrently with another.

use crate::config::FAST_TICK_MS;
use crate::engine::Engine;
use crate::iface::PacketMeta;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared handle to an engine plus the task driving its timers.
#[derive(Clone)]
pub struct EngineRunner {
    engine: Arc<Mutex<Engine>>,
    shutdown: Arc<AtomicBool>,
}

impl EngineRunner {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The engine handle, for packet dispatch and administrative calls.
    pub fn engine(&self) -> Arc<Mutex<Engine>> {
        self.engine.clone()
    }

    /// Feeds one received NDP payload into the engine.
    pub async fn dispatch(&self, payload: &[u8], meta: PacketMeta) {
        self.engine.lock().await.handle_packet(payload, meta);
    }

    /// Signals the timer loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Drives the fast (100 ms) and slow (1 s) ticks until shutdown.
    pub async fn run(&self) {
        let mut fast = tokio::time::interval(Duration::from_millis(FAST_TICK_MS));
        let mut slow = tokio::time::interval(Duration::from_secs(1));
        fast.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        slow.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("nd6: timer loop stopping");
                let mut engine = self.engine.lock().await;
                engine.teardown();
                return;
            }
            tokio::select! {
                _ = fast.tick() => {
                    self.engine.lock().await.tick_fast();
                }
                _ = slow.tick() => {
                    self.engine.lock().await.tick_slow();
                }
            }
        }
    }
}
