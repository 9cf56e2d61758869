use crate::throttle::{Offer, Throttle};
use pitwall_core::protocol::{decode_payload, Channel, ChannelPayload};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Opaque subscription handle, returned at subscribe time and required at
/// unsubscribe time. Identity lives in the handle, never in the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type SubscriberCallback = Arc<dyn Fn(&ChannelPayload) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: SubscriberCallback,
}

/// Scheduling request produced by a dispatch: the caller must arm a flush
/// timer for the channel after this delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushAfter {
    pub channel: Channel,
    pub delay: Duration,
}

/// What the caller must do with a routed payload.
///
/// Routing never invokes callbacks itself: deliveries come back as values so
/// the owner can release whatever lock guards the dispatcher first. A
/// subscriber may re-enter the client from its callback.
pub enum RouteAction {
    /// Run these subscribers now
    Deliver(Delivery),
    /// Arm a trailing-edge flush timer for the channel
    Schedule(FlushAfter),
}

/// One payload plus the subscriber snapshot taken at routing time
pub struct Delivery {
    channel: Channel,
    payload: ChannelPayload,
    subscribers: Vec<(SubscriptionId, SubscriberCallback)>,
}

impl Delivery {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Invoke every subscriber in registration order, isolating panics
    pub fn run(self) {
        for (id, callback) in &self.subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(&self.payload))).is_err() {
                error!(channel = %self.channel, subscription = %id, "subscriber panicked");
            }
        }
    }
}

/// Validates inbound payloads and routes them to per-channel subscriber
/// lists.
///
/// High-frequency channels pass through a trailing-edge throttle; control
/// channels are delivered immediately, always. Subscribers run in
/// registration order and are isolated from each other: one panicking
/// callback never prevents the rest from running.
pub struct Dispatcher {
    throttle_interval: Duration,
    subscribers: HashMap<Channel, Vec<Subscriber>>,
    throttles: HashMap<Channel, Throttle<ChannelPayload>>,
}

impl Dispatcher {
    pub fn new(throttle_interval: Duration) -> Self {
        Dispatcher {
            throttle_interval,
            subscribers: HashMap::new(),
            throttles: HashMap::new(),
        }
    }

    /// Register a callback for a channel, creating throttle state for
    /// high-frequency channels on first subscription
    pub fn subscribe(&mut self, channel: Channel, callback: SubscriberCallback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers
            .entry(channel)
            .or_default()
            .push(Subscriber { id, callback });

        if channel.is_throttled() {
            self.throttles
                .entry(channel)
                .or_insert_with(|| Throttle::new(self.throttle_interval));
        }

        debug!(%channel, subscription = %id, "subscribed");
        id
    }

    /// Remove a subscription. Removing the last subscriber of a channel
    /// clears the channel's throttle state entirely, so a later resubscribe
    /// starts fresh.
    pub fn unsubscribe(&mut self, channel: Channel, id: SubscriptionId) -> bool {
        let Some(list) = self.subscribers.get_mut(&channel) else {
            return false;
        };

        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() < before;

        if list.is_empty() {
            self.subscribers.remove(&channel);
            self.throttles.remove(&channel);
            debug!(%channel, "last subscriber removed, channel state cleared");
        }

        removed
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.subscribers.get(&channel).map_or(0, Vec::len)
    }

    pub fn has_throttle_state(&self, channel: Channel) -> bool {
        self.throttles.contains_key(&channel)
    }

    /// Validate and route one inbound payload.
    ///
    /// Validation failures drop the message with a diagnostic; no callback
    /// fires.
    pub fn dispatch(&mut self, channel: Channel, data: Value, now: Instant) -> Option<RouteAction> {
        let payload = match decode_payload(channel, data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%channel, error = %e, "dropping invalid payload");
                return None;
            }
        };
        self.route(payload, now)
    }

    /// Route an already-decoded payload (the facade decodes once to apply
    /// domain effects before fanning out)
    pub fn route(&mut self, payload: ChannelPayload, now: Instant) -> Option<RouteAction> {
        let channel = payload.channel();
        if channel.is_throttled() {
            // Throttle state exists only while someone is subscribed
            let throttle = self.throttles.get_mut(&channel)?;
            match throttle.offer(payload, now) {
                Offer::Deliver(payload) => {
                    Some(RouteAction::Deliver(self.delivery(channel, payload)))
                }
                Offer::Schedule(delay) => Some(RouteAction::Schedule(FlushAfter { channel, delay })),
                Offer::Coalesced => None,
            }
        } else {
            Some(RouteAction::Deliver(self.delivery(channel, payload)))
        }
    }

    /// Take the pending coalesced value for a channel, if due, as a
    /// ready-to-run delivery
    pub fn flush_due(&mut self, channel: Channel, now: Instant) -> Option<Delivery> {
        let payload = self
            .throttles
            .get_mut(&channel)
            .and_then(|throttle| throttle.take_due(now))?;
        Some(self.delivery(channel, payload))
    }

    fn delivery(&self, channel: Channel, payload: ChannelPayload) -> Delivery {
        let subscribers = self
            .subscribers
            .get(&channel)
            .map(|list| {
                list.iter()
                    .map(|s| (s.id, s.callback.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Delivery {
            channel,
            payload,
            subscribers,
        }
    }
}
