use std::time::Duration;
use tokio::time::Instant;

/// Outcome of offering a value to the throttle
#[derive(Debug, Clone, PartialEq)]
pub enum Offer<T> {
    /// The window has already elapsed; the value comes back for immediate
    /// delivery
    Deliver(T),
    /// The value is held as latest-pending; arm a flush timer for this delay
    Schedule(Duration),
    /// The value replaced the pending one; a flush timer is already armed
    Coalesced,
}

/// Trailing-edge coalescing rate limiter for one channel.
///
/// Calls arriving inside the interval update the latest-pending value, which
/// is delivered at the next allowed tick - intermediate values coalesce, the
/// newest survives. A fresh throttle holds even its first value for one full
/// interval, so N rapid events always collapse to a single delivery.
///
/// Pure state machine over explicit `Instant`s; the caller owns the actual
/// timer. Tearing the state down (unsubscribe) simply drops the throttle and
/// aborts the caller's timer, leaving nothing behind.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
    scheduled: bool,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emit: None,
            pending: None,
            scheduled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offer a new value at time `now`.
    ///
    /// On `Offer::Deliver` the caller delivers the returned value right away
    /// (the throttle records the emission). Otherwise the value is stored as
    /// latest-pending for the trailing flush.
    pub fn offer(&mut self, value: T, now: Instant) -> Offer<T> {
        let deadline = match self.last_emit {
            Some(last) => last + self.interval,
            // First value after (re)subscription: hold for one interval
            None => now + self.interval,
        };

        if !self.scheduled && now >= deadline {
            self.last_emit = Some(now);
            return Offer::Deliver(value);
        }

        self.pending = Some(value);
        if self.scheduled {
            Offer::Coalesced
        } else {
            self.scheduled = true;
            Offer::Schedule(deadline.saturating_duration_since(now))
        }
    }

    /// Take the pending value if its flush time has come.
    ///
    /// Called by the flush timer. Returns `None` when nothing is due (e.g.
    /// the timer fired after the state was already drained).
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        self.scheduled = false;
        let value = self.pending.take()?;
        self.last_emit = Some(now);
        Some(value)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
