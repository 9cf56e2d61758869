use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff parameters for automatic reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial: Duration,
    /// Multiplier applied per subsequent attempt
    pub factor: f64,
    /// Hard ceiling on any single delay
    pub max: Duration,
    /// Give up after this many failed attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Jitter fraction: each delay is scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]` so a fleet of clients does not stampede
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Duration::from_millis(1000),
            factor: 2.0,
            max: Duration::from_millis(15_000),
            max_attempts: None,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// The undithered delay for attempt `n` (1-based):
    /// `initial * factor^(n-1)`, capped at `max`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis = self.initial.as_millis() as f64 * self.factor.powi(exponent as i32);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// The actual delay for attempt `n`, with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let scale = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_millis((base.as_millis() as f64 * scale) as u64)
    }
}

/// Observable connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveStatus {
    /// No connection and none wanted
    Off,
    /// A connect attempt is in flight
    Connecting,
    /// The link is up
    Connected,
    /// The link dropped; a retry is scheduled
    Retrying { attempt: u32, delay: Duration },
    /// Retries exhausted
    GaveUp,
}

/// Tracks reconnection attempts and computes when the next one runs.
///
/// Pure state machine: the owning event loop arms the actual sleep and calls
/// back in. A successful connection resets the attempt counter so the next
/// outage starts from the initial delay again.
#[derive(Debug)]
pub struct ReconnectController {
    config: BackoffConfig,
    attempt: u32,
    status: LiveStatus,
}

impl ReconnectController {
    pub fn new(config: BackoffConfig) -> Self {
        ReconnectController {
            config,
            attempt: 0,
            status: LiveStatus::Off,
        }
    }

    pub fn status(&self) -> LiveStatus {
        self.status
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn on_connecting(&mut self) {
        self.status = LiveStatus::Connecting;
    }

    pub fn on_connected(&mut self) {
        info!("link established");
        self.attempt = 0;
        self.status = LiveStatus::Connected;
    }

    /// The link dropped or a connect attempt failed. Returns the delay to
    /// sleep before retrying, or `None` when retries are exhausted.
    pub fn on_loss(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if let Some(max) = self.config.max_attempts {
            if self.attempt > max {
                warn!(attempts = max, "giving up on reconnection");
                self.status = LiveStatus::GaveUp;
                return None;
            }
        }

        let delay = self.config.delay(self.attempt);
        info!(attempt = self.attempt, ?delay, "retrying after backoff");
        self.status = LiveStatus::Retrying {
            attempt: self.attempt,
            delay,
        };
        Some(delay)
    }

    /// Skip the pending backoff delay. The caller cancels its timer and
    /// starts a connect attempt immediately.
    pub fn retry_now(&mut self) {
        self.status = LiveStatus::Connecting;
    }

    /// Stop retrying entirely and reset
    pub fn stop(&mut self) {
        self.attempt = 0;
        self.status = LiveStatus::Off;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            jitter: 0.0,
            ..BackoffConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = no_jitter();
        let expected = [1000u64, 2000, 4000, 8000, 15_000, 15_000, 15_000];
        for (i, millis) in expected.into_iter().enumerate() {
            assert_eq!(
                config.base_delay(i as u32 + 1),
                Duration::from_millis(millis),
                "attempt {}",
                i + 1
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let config = BackoffConfig::default();
        for _ in 0..100 {
            let delay = config.delay(2);
            assert!(delay >= Duration::from_millis(1800));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_success_resets_attempt_counter() {
        let mut controller = ReconnectController::new(no_jitter());
        controller.on_connecting();

        assert_eq!(controller.on_loss(), Some(Duration::from_millis(1000)));
        assert_eq!(controller.on_loss(), Some(Duration::from_millis(2000)));
        controller.on_connected();
        assert_eq!(controller.status(), LiveStatus::Connected);

        // Fresh outage starts over from the initial delay
        assert_eq!(controller.on_loss(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut controller = ReconnectController::new(BackoffConfig {
            max_attempts: Some(2),
            jitter: 0.0,
            ..BackoffConfig::default()
        });

        assert!(controller.on_loss().is_some());
        assert!(controller.on_loss().is_some());
        assert_eq!(controller.on_loss(), None);
        assert_eq!(controller.status(), LiveStatus::GaveUp);
    }

    #[test]
    fn test_retry_now_moves_to_connecting() {
        let mut controller = ReconnectController::new(no_jitter());
        controller.on_loss();
        assert!(matches!(
            controller.status(),
            LiveStatus::Retrying { attempt: 1, .. }
        ));

        controller.retry_now();
        assert_eq!(controller.status(), LiveStatus::Connecting);
    }

    #[test]
    fn test_stop_resets() {
        let mut controller = ReconnectController::new(no_jitter());
        controller.on_loss();
        controller.stop();
        assert_eq!(controller.status(), LiveStatus::Off);
        assert_eq!(controller.attempt(), 0);
    }
}
