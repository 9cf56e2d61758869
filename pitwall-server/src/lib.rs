//! Realtime telemetry distribution server: peers join session broadcast
//! groups over WebSockets, publish on logical channels, and the server
//! re-validates, persists telemetry, and fans frames out to session peers.

pub mod auth;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod listener;
pub mod memory_storage;
pub mod observability;
pub mod repository;
pub mod store;

pub use auth::{AllowAll, StaticToken, TokenVerifier};
pub use connection::{PeerConnection, PeerId};
pub use error::{Result, ServerError};
pub use fanout::SessionFanout;
pub use handler::ConnectionHandler;
pub use listener::create_session_route;
pub use memory_storage::MemoryStorage;
pub use observability::LogConfig;
pub use repository::{ConnectionRepository, SessionRepository};
pub use store::{MemoryTelemetryStore, TelemetryStore};
