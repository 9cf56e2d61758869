use crate::error::{ClientError, Result};
use crate::infrastructure::connection::{Connection, ConnectionEvent, Connector};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

/// Native WebSocket connection.
///
/// The socket is split into a writer task fed by an unbounded channel and a
/// reader task that pushes inbound frames into an inbox, so `send` and
/// `poll_events` stay synchronous for the event loop.
pub struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<Message>,
    inbox: mpsc::UnboundedReceiver<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WebSocketConnection {
    /// Open a connection. The auth token travels out-of-band as a query
    /// parameter on the connect URL, never inside channel payloads.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self> {
        let url = match token {
            Some(token) if url.contains('?') => format!("{url}&token={token}"),
            Some(token) => format!("{url}?token={token}"),
            None => url.to_string(),
        };

        info!(%url, "connecting websocket");
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, inbox) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let _ = event_tx.send(ConnectionEvent::Opened);

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    error!("websocket send failed: {e}");
                    break;
                }
            }
        });

        let reader_connected = connected.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let _ = event_tx.send(ConnectionEvent::Message(text.to_string()));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by remote");
                        break;
                    }
                    Ok(_) => {
                        // Ping/pong handled by tungstenite, binary unused
                    }
                    Err(e) => {
                        error!("websocket receive failed: {e}");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ConnectionEvent::Closed);
        });

        Ok(WebSocketConnection {
            outbound,
            inbox,
            connected,
            tasks: vec![writer, reader],
        })
    }
}

impl Connection for WebSocketConnection {
    fn send(&mut self, frame: String) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.outbound
            .send(Message::Text(frame.into()))
            .map_err(|e| ClientError::SendFailed(e.to_string()))
    }

    fn poll_events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            events.push(event);
        }
        events
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Message::Close(None));
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connector producing fresh WebSocket connections for connect and every
/// reconnect attempt
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        WebSocketConnector {
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let connection = WebSocketConnection::connect(&self.url, self.token.as_deref()).await?;
        Ok(Box::new(connection))
    }
}
