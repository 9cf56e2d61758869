//! Realtime racing-session client: channel pub/sub over a single
//! connection, high-frequency throttling, driver roster and handoff
//! coordination, metric comparisons, automatic reconnection.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod infrastructure;
pub mod reconnect;
pub mod throttle;
pub mod transport;

pub use client::{ClientConfig, PitwallClient};
pub use dispatch::{Delivery, Dispatcher, FlushAfter, RouteAction, SubscriberCallback, SubscriptionId};
pub use error::{ClientError, Result};
pub use infrastructure::{Connection, ConnectionEvent, Connector, WebSocketConnector};
pub use reconnect::{BackoffConfig, LiveStatus, ReconnectController};
pub use throttle::{Offer, Throttle};
pub use transport::{Transport, TransportEvent};
