//! Fixed-interval cycle trigger
//!
//! The first cycle runs immediately. A cycle that overruns the interval delays
//! the next tick instead of queueing a burst, so cycles never overlap.
//! Shutdown is observed only between cycles.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `cycle` on every tick until `shutdown` resolves. Returns the number
    /// of cycles that ran.
    pub async fn run<F, Fut, S>(&self, mut cycle: F, shutdown: S) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycles, "Stopping monitor");
                    break;
                }
                _ = ticker.tick() => {}
            }

            cycles += 1;
            debug!(cycle = cycles, "Starting check cycle");
            cycle().await;
        }

        cycles
    }
}
