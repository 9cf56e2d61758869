use crate::error::{Result, ServerError};
use async_trait::async_trait;
use pitwall_core::domain::{SessionId, TelemetrySample};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, instrument};

/// Per-session telemetry persistence.
///
/// Sessions must be registered before samples are accepted; appending to an
/// unregistered session is an error rather than a silent create, so a typo
/// in a session id cannot open a phantom session.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn register_session(&self, session_id: SessionId) -> Result<()>;
    /// Append a batch, returning how many samples were accepted
    async fn append(&self, session_id: &SessionId, samples: Vec<TelemetrySample>)
        -> Result<usize>;
    async fn samples_for(&self, session_id: &SessionId) -> Result<Vec<TelemetrySample>>;
    async fn sessions(&self) -> Result<Vec<SessionId>>;
}

/// In-memory telemetry store
pub struct MemoryTelemetryStore {
    sessions: Arc<RwLock<HashMap<SessionId, Vec<TelemetrySample>>>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryTelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    #[instrument(skip(self))]
    async fn register_session(&self, session_id: SessionId) -> Result<()> {
        debug!(%session_id, "Registering telemetry session");
        match self.sessions.write() {
            Ok(mut sessions) => {
                sessions.entry(session_id).or_default();
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to register session");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, samples))]
    async fn append(
        &self,
        session_id: &SessionId,
        samples: Vec<TelemetrySample>,
    ) -> Result<usize> {
        match self.sessions.write() {
            Ok(mut sessions) => match sessions.get_mut(session_id) {
                Some(stored) => {
                    let accepted = samples.len();
                    stored.extend(samples);
                    Ok(accepted)
                }
                None => Err(ServerError::UnknownSession(session_id.clone())),
            },
            Err(e) => {
                error!(?e, "Failed to append samples");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn samples_for(&self, session_id: &SessionId) -> Result<Vec<TelemetrySample>> {
        match self.sessions.read() {
            Ok(sessions) => sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| ServerError::UnknownSession(session_id.clone())),
            Err(e) => {
                error!(?e, "Failed to read samples");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn sessions(&self) -> Result<Vec<SessionId>> {
        match self.sessions.read() {
            Ok(sessions) => Ok(sessions.keys().cloned().collect()),
            Err(e) => {
                error!(?e, "Failed to list sessions");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::domain::DriverId;

    fn sample(driver: &str, ts: u64) -> TelemetrySample {
        TelemetrySample::at(DriverId::from(driver), ts)
    }

    #[tokio::test]
    async fn test_append_requires_registered_session() {
        let store = MemoryTelemetryStore::new();
        let session = SessionId::from("race-1");

        let result = store.append(&session, vec![sample("alice", 1)]).await;
        assert!(matches!(result, Err(ServerError::UnknownSession(_))));

        store.register_session(session.clone()).await.unwrap();
        let accepted = store
            .append(&session, vec![sample("alice", 1), sample("alice", 2)])
            .await
            .unwrap();
        assert_eq!(accepted, 2);

        let samples = store.samples_for(&session).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(store.sessions().await.unwrap(), vec![session]);
    }

    #[tokio::test]
    async fn test_reregistering_keeps_samples() {
        let store = MemoryTelemetryStore::new();
        let session = SessionId::from("race-1");

        store.register_session(session.clone()).await.unwrap();
        store.append(&session, vec![sample("bob", 5)]).await.unwrap();
        // A second peer joining the same session must not wipe history
        store.register_session(session.clone()).await.unwrap();

        assert_eq!(store.samples_for(&session).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_samples_for_unknown_session_errors() {
        let store = MemoryTelemetryStore::new();
        let result = store.samples_for(&SessionId::from("ghost")).await;
        assert!(matches!(result, Err(ServerError::UnknownSession(_))));
    }
}
