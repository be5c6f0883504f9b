//! Fixed-cadence server loop.
//!
//! This module provides [`run_server`], the top-level async function that
//! drives [`World::tick`] with support for:
//!
//! - **Fixed cadence**: each tick is followed by a sleep of whatever is left
//!   of the tick interval; an overrun is logged and the next tick starts
//!   immediately
//! - **Bounded runs**: stop after `max_ticks`
//! - **Variable tick speed**: the interval is adjustable at runtime
//! - **Clean shutdown**: a shared [`ShutdownSignal`] stops the loop between
//!   ticks and interrupts the sleep

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::tick::{TickError, TickSummary};
use crate::world::{World, WorldState};

/// Errors that can occur during the server run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// [`ShutdownSignal::request_stop`] was called.
    ShutdownRequested,
}

/// Result of a server run.
#[derive(Debug)]
pub struct RunResult {
    /// The reason the loop ended.
    pub stop_reason: StopReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed.
    pub total_ticks: u64,
    /// Ticks that took longer than the interval.
    pub overruns: u64,
}

/// Shared run controls: stop flag and tick interval.
#[derive(Debug)]
pub struct ShutdownSignal {
    stop_requested: AtomicBool,
    wake: Notify,
    tick_interval_ms: AtomicU64,
    max_ticks: u64,
}

impl ShutdownSignal {
    /// Controls for a run with the given interval and tick bound
    /// (`0` = unbounded).
    pub fn new(tick_interval_ms: u64, max_ticks: u64) -> Arc<Self> {
        Arc::new(Self {
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            max_ticks,
        })
    }

    /// Ask the loop to stop before its next tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the tick interval; takes effect after the current tick.
    pub fn set_tick_interval_ms(&self, ms: u64) {
        self.tick_interval_ms.store(ms, Ordering::Release);
        info!(tick_interval_ms = ms, "Tick interval changed");
    }

    /// Configured tick bound (`0` = unbounded).
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Whether `tick` is the last tick allowed.
    pub const fn tick_limit_reached(&self, tick: u64) -> bool {
        self.max_ticks > 0 && tick >= self.max_ticks
    }
}

/// Callback invoked after each tick completes.
///
/// Implementations can use this to export tick summaries, feed metrics, or
/// drive test assertions.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, state: &WorldState);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _state: &WorldState) {}
}

/// Run the tick loop until a stop condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails with a systemic error.
pub async fn run_server(
    world: &mut World,
    signal: &Arc<ShutdownSignal>,
    callback: &mut dyn TickCallback,
) -> Result<RunResult, RunnerError> {
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;
    let mut overruns: u64 = 0;

    info!(
        max_ticks = signal.max_ticks(),
        tick_interval_ms = signal.tick_interval_ms(),
        sync_workers = world.sync_workers(),
        "Server loop starting"
    );

    loop {
        // --- Check stop request (before tick) ---
        if signal.is_stop_requested() {
            info!("Shutdown requested");
            return Ok(RunResult {
                stop_reason: StopReason::ShutdownRequested,
                final_summary: last_summary,
                total_ticks,
                overruns,
            });
        }

        // --- Execute tick ---
        let started = Instant::now();
        let summary = world.tick()?;
        total_ticks = total_ticks.saturating_add(1);

        // --- Notify callback ---
        callback.on_tick(&summary, world.state());

        // --- Check tick limit (after tick) ---
        if signal.tick_limit_reached(summary.tick) {
            info!(tick = summary.tick, max_ticks = signal.max_ticks(), "Tick limit reached");
            return Ok(RunResult {
                stop_reason: StopReason::MaxTicksReached,
                final_summary: Some(summary),
                total_ticks,
                overruns,
            });
        }

        // --- Sleep for the rest of the interval ---
        let interval = Duration::from_millis(signal.tick_interval_ms());
        let elapsed = started.elapsed();
        match interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => {
                tokio::select! {
                    () = tokio::time::sleep(remaining) => {}
                    () = signal.wake.notified() => {}
                }
            }
            _ => {
                overruns = overruns.saturating_add(1);
                warn!(tick = summary.tick, ?elapsed, ?interval, "Tick overran its interval");
            }
        }

        last_summary = Some(summary);
    }
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.stop_reason,
        total_ticks = result.total_ticks,
        overruns = result.overruns,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        "Server loop ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            players = summary.players,
            npcs = summary.npcs,
            "Final tick summary"
        );
    } else {
        warn!("Server loop ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keystone_types::Position;

    use super::*;
    use crate::actor::Credentials;
    use crate::actor::Mob;
    use crate::collab::WorldContext;
    use crate::config::ServerConfig;

    fn world() -> World {
        let mut config = ServerConfig::default();
        config.sync.worker_threads = 2;
        let (context, _saves) = WorldContext::detached(16);
        World::new(&config, context).unwrap()
    }

    struct Counting(Vec<u64>);

    impl TickCallback for Counting {
        fn on_tick(&mut self, summary: &TickSummary, _state: &WorldState) {
            self.0.push(summary.tick);
        }
    }

    #[tokio::test]
    async fn stops_at_max_ticks() {
        let mut world = world();
        world.queue_login(Mob::player(Credentials::new("a", "b"), Position::new(3222, 3218, 0)));
        let signal = ShutdownSignal::new(1, 5);
        let mut callback = Counting(Vec::new());

        let result = run_server(&mut world, &signal, &mut callback).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(callback.0, vec![1, 2, 3, 4, 5]);
        assert_eq!(result.final_summary.unwrap().players, 1);
    }

    #[tokio::test]
    async fn stop_before_first_tick() {
        let mut world = world();
        let signal = ShutdownSignal::new(1, 0);
        signal.request_stop();

        let result = run_server(&mut world, &signal, &mut NoOpCallback).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::ShutdownRequested);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
    }

    #[tokio::test]
    async fn stop_interrupts_sleep() {
        struct StopAfter(Arc<ShutdownSignal>, u64);
        impl TickCallback for StopAfter {
            fn on_tick(&mut self, summary: &TickSummary, _state: &WorldState) {
                if summary.tick == self.1 {
                    self.0.request_stop();
                }
            }
        }

        let mut world = world();
        // A ten-minute interval would hang the test if the stop did not wake
        // the sleep.
        let signal = ShutdownSignal::new(600_000, 0);
        let mut callback = StopAfter(Arc::clone(&signal), 1);
        let result = run_server(&mut world, &signal, &mut callback).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::ShutdownRequested);
        assert_eq!(result.total_ticks, 1);
    }

    #[test]
    fn tick_limit() {
        let signal = ShutdownSignal::new(600, 3);
        assert!(!signal.tick_limit_reached(2));
        assert!(signal.tick_limit_reached(3));
        assert!(!ShutdownSignal::new(600, 0).tick_limit_reached(u64::MAX));
        signal.set_tick_interval_ms(100);
        assert_eq!(signal.tick_interval_ms(), 100);
    }
}
