//! Keep-alive ticker that only exists while the connection is open.

use std::{future, time::Duration};

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Periodic heartbeat timer.
///
/// The ticker is created by [`start`](Self::start) and dropped by
/// [`stop`](Self::stop); while stopped, [`tick`](Self::tick) never
/// completes, so it can sit in a `select!` unconditionally.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    /// Start beating. The first beat is one period from now.
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Stop beating. Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Resolve at the next beat, or never if stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}
