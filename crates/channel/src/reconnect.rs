//! Retry pacing for the annotation channel.
//!
//! [`Backoff`] owns the retry state for one connection loop: the delay
//! grows exponentially while attempts keep failing and snaps back to
//! the initial delay once a connection survives. The owning session
//! calls [`Backoff::wait`] between attempts and [`Backoff::reset`]
//! after a successful connect.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Stateful retry pacing. One instance per connection loop.
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            delay,
            attempt: 0,
        }
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay the next [`wait`](Backoff::wait) will sleep for.
    pub fn next_delay(&self) -> Duration {
        self.delay
    }

    /// A connection survived; the next failure starts the ladder over.
    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.attempt = 0;
    }

    /// Sleep out the current delay and grow it for the next failure.
    ///
    /// Returns `false` when `cancel` fires before the delay elapses.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.advance();
        tracing::info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Waiting before annotation channel retry",
        );
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Take the current delay, bump the attempt counter, and grow the
    /// delay toward the cap.
    fn advance(&mut self) -> Duration {
        let delay = self.delay;
        self.attempt += 1;
        let grown = (self.delay.as_millis() as f64 * self.config.multiplier) as u64;
        self.delay = Duration::from_millis(grown).min(self.config.max_delay);
        delay
    }
}
