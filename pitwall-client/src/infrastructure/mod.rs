pub mod connection;
pub mod websocket;

pub use connection::{Connection, ConnectionEvent, Connector};
pub use websocket::{WebSocketConnection, WebSocketConnector};
