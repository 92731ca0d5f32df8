//! Periodic task scheduling on the Tokio runtime.
//!
//! [`spawn_periodic`] drives any [`PeriodicTask`] at a fixed period until the
//! shutdown signal flips to `true`. Missed ticks are skipped rather than
//! bursted, so a late cycle never triggers a catch-up storm. A cycle that
//! runs longer than its period is logged as an overrun.
//!
//! The spawned future yields the task back when it stops, so callers can
//! read final counters after shutdown.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

/// A unit of work run once per period.
pub trait PeriodicTask: Send + 'static {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Run one cycle. Must not block for longer than a period.
    fn tick(&mut self);
}

/// Build a shutdown channel. Send `true` to stop every task holding a
/// receiver.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Spawn `task` on the current Tokio runtime, ticking it every `period`.
///
/// The first tick fires immediately. The task stops once `shutdown` carries
/// `true` or its sender is dropped.
pub fn spawn_periodic<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<T> {
    tokio::spawn(async move {
        let name = task.name();
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: u64 = 0;
        let mut overruns: u64 = 0;

        info!(task = name, period_ms = period.as_millis() as u64, "periodic task started");

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        task.tick();
                        cycles += 1;
                        let elapsed = started.elapsed();
                        if elapsed > period {
                            overruns += 1;
                            warn!(task = name, elapsed_us = elapsed.as_micros() as u64, "cycle overran its period");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        info!(task = name, cycles, overruns, "periodic task stopped");
        task
    })
}
