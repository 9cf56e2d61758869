use crate::domain::{DriverId, Timestamp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors raised by comparison coordination
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ComparisonError {
    #[error("Comparison {0} participant id is empty")]
    MissingParticipant(&'static str),

    #[error("Malformed comparison id: {0}")]
    MalformedId(String),
}

/// One named metric as delivered by the server: raw value per participant
/// plus the precomputed delta. The coordinator never recomputes deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetric {
    pub name: String,
    pub value_a: f64,
    pub value_b: f64,
    pub delta: f64,
}

/// Wire event for the `request_comparison` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequestEvent {
    pub comparison_id: String,
    pub driver_a: DriverId,
    pub driver_b: DriverId,
}

/// Wire event for the `comparison_result` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResultEvent {
    pub comparison_id: String,
    pub metrics: Vec<ComparisonMetric>,
}

/// One metric reshaped for consumption: value keyed by participant
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOutcome {
    pub name: String,
    pub values: HashMap<DriverId, f64>,
    pub delta: f64,
}

/// A matched comparison result, attributed to its two participants
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonOutcome {
    pub comparison_id: String,
    pub driver_a: DriverId,
    pub driver_b: DriverId,
    pub metrics: Vec<MetricOutcome>,
}

#[derive(Debug, Clone)]
struct PendingComparison {
    driver_a: DriverId,
    driver_b: DriverId,
    requested_at: Timestamp,
}

/// Issues correlated comparison requests and matches asynchronous results
/// back to them.
///
/// The comparison id deterministically encodes both participant ids plus a
/// random disambiguator (`"{a}-{b}-{nonce}"`), so a result event can be
/// attributed without an external correlation table. Requests that never see
/// a result are pruned by `expire` rather than leaking forever.
#[derive(Debug, Default)]
pub struct ComparisonCoordinator {
    pending: HashMap<String, PendingComparison>,
}

impl ComparisonCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a comparison between two participants, returning the wire id
    pub fn request(
        &mut self,
        driver_a: impl Into<DriverId>,
        driver_b: impl Into<DriverId>,
    ) -> Result<String, ComparisonError> {
        let driver_a = driver_a.into();
        let driver_b = driver_b.into();

        if driver_a.is_empty() {
            return Err(ComparisonError::MissingParticipant("first"));
        }
        if driver_b.is_empty() {
            return Err(ComparisonError::MissingParticipant("second"));
        }

        let nonce: u32 = rand::thread_rng().gen_range(0x100000..0xffffff);
        let id = format!("{}-{}-{:06x}", driver_a, driver_b, nonce);

        self.pending.insert(
            id.clone(),
            PendingComparison {
                driver_a,
                driver_b,
                requested_at: Timestamp::now(),
            },
        );

        debug!(comparison = %id, "comparison requested");
        Ok(id)
    }

    /// Decompose a comparison id into its two participant ids.
    ///
    /// The id must carry three `-`-separated components with the first two
    /// non-empty; anything else (`"garbage"`, `"invalid-format"`) is
    /// malformed and must never be attributed to a participant pair.
    pub fn parse_id(id: &str) -> Result<(DriverId, DriverId), ComparisonError> {
        let mut parts = id.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(_nonce)) if !a.is_empty() && !b.is_empty() => {
                Ok((DriverId::from(a), DriverId::from(b)))
            }
            _ => Err(ComparisonError::MalformedId(id.to_string())),
        }
    }

    /// Match a result event back to its participants and reshape the metric
    /// list into per-participant values.
    ///
    /// Malformed ids are rejected with a diagnostic; well-formed ids are
    /// accepted even when the request was issued elsewhere (the id itself is
    /// the correlation), clearing local pending state when present.
    pub fn on_result(
        &mut self,
        event: &ComparisonResultEvent,
    ) -> Result<ComparisonOutcome, ComparisonError> {
        let (driver_a, driver_b) = match Self::parse_id(&event.comparison_id) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(comparison = %event.comparison_id, "discarding result with malformed id");
                return Err(e);
            }
        };

        if self.pending.remove(&event.comparison_id).is_some() {
            debug!(comparison = %event.comparison_id, "matched pending comparison");
        }

        let metrics = event
            .metrics
            .iter()
            .map(|m| {
                let mut values = HashMap::with_capacity(2);
                values.insert(driver_a.clone(), m.value_a);
                values.insert(driver_b.clone(), m.value_b);
                MetricOutcome {
                    name: m.name.clone(),
                    values,
                    delta: m.delta,
                }
            })
            .collect();

        Ok(ComparisonOutcome {
            comparison_id: event.comparison_id.clone(),
            driver_a,
            driver_b,
            metrics,
        })
    }

    /// Drop pending requests older than `ttl`, returning how many were pruned
    pub fn expire(&mut self, ttl: Duration) -> usize {
        let now = Timestamp::now();
        let ttl_ms = ttl.as_millis() as u64;
        let before = self.pending.len();

        self.pending
            .retain(|_, p| p.requested_at.millis_until(now) < ttl_ms);

        let pruned = before - self.pending.len();
        if pruned > 0 {
            debug!(pruned, "expired unanswered comparison requests");
        }
        pruned
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Participants of a pending request, if still outstanding
    pub fn pending_participants(&self, id: &str) -> Option<(&DriverId, &DriverId)> {
        self.pending.get(id).map(|p| (&p.driver_a, &p.driver_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_encodes_participants() {
        let mut coordinator = ComparisonCoordinator::new();
        let id = coordinator.request("d1", "d2").unwrap();

        assert!(id.starts_with("d1-d2-"));
        assert_eq!(coordinator.pending_count(), 1);

        let (a, b) = ComparisonCoordinator::parse_id(&id).unwrap();
        assert_eq!(a.as_str(), "d1");
        assert_eq!(b.as_str(), "d2");
    }

    #[test]
    fn test_request_rejects_empty_participants() {
        let mut coordinator = ComparisonCoordinator::new();

        assert_eq!(
            coordinator.request("", "d2"),
            Err(ComparisonError::MissingParticipant("first"))
        );
        assert_eq!(
            coordinator.request("d1", ""),
            Err(ComparisonError::MissingParticipant("second"))
        );
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn test_parse_id_round_trip() {
        let (a, b) = ComparisonCoordinator::parse_id("d1-d2-abc").unwrap();
        assert_eq!(a.as_str(), "d1");
        assert_eq!(b.as_str(), "d2");
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(
            ComparisonCoordinator::parse_id("garbage"),
            Err(ComparisonError::MalformedId("garbage".to_string()))
        );
    }

    #[test]
    fn test_parse_id_rejects_missing_component() {
        // Two components only: no nonce, so the second participant cannot
        // be distinguished from the disambiguator
        assert_eq!(
            ComparisonCoordinator::parse_id("invalid-format"),
            Err(ComparisonError::MalformedId("invalid-format".to_string()))
        );
    }

    #[test]
    fn test_parse_id_rejects_empty_components() {
        assert!(ComparisonCoordinator::parse_id("-d2-abc").is_err());
        assert!(ComparisonCoordinator::parse_id("d1--abc").is_err());
        assert!(ComparisonCoordinator::parse_id("--").is_err());
    }

    #[test]
    fn test_on_result_reshapes_metrics() {
        let mut coordinator = ComparisonCoordinator::new();
        let id = coordinator.request("d1", "d2").unwrap();

        let event = ComparisonResultEvent {
            comparison_id: id.clone(),
            metrics: vec![
                ComparisonMetric {
                    name: "best_lap_ms".into(),
                    value_a: 92345.0,
                    value_b: 92890.0,
                    delta: -545.0,
                },
                ComparisonMetric {
                    name: "avg_speed_kph".into(),
                    value_a: 201.2,
                    value_b: 199.8,
                    delta: 1.4,
                },
            ],
        };

        let outcome = coordinator.on_result(&event).unwrap();

        assert_eq!(outcome.driver_a.as_str(), "d1");
        assert_eq!(outcome.driver_b.as_str(), "d2");
        assert_eq!(outcome.metrics.len(), 2);
        assert_eq!(outcome.metrics[0].values[&DriverId::from("d1")], 92345.0);
        assert_eq!(outcome.metrics[0].values[&DriverId::from("d2")], 92890.0);
        // Delta passed through, never recomputed
        assert_eq!(outcome.metrics[0].delta, -545.0);
        // Matched request is cleared
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn test_on_result_rejects_malformed_id() {
        let mut coordinator = ComparisonCoordinator::new();

        let event = ComparisonResultEvent {
            comparison_id: "garbage".into(),
            metrics: vec![],
        };

        assert_eq!(
            coordinator.on_result(&event),
            Err(ComparisonError::MalformedId("garbage".to_string()))
        );
    }

    #[test]
    fn test_on_result_accepts_foreign_but_well_formed_id() {
        let mut coordinator = ComparisonCoordinator::new();

        let event = ComparisonResultEvent {
            comparison_id: "d7-d8-cafe01".into(),
            metrics: vec![],
        };

        let outcome = coordinator.on_result(&event).unwrap();
        assert_eq!(outcome.driver_a.as_str(), "d7");
        assert_eq!(outcome.driver_b.as_str(), "d8");
    }

    #[test]
    fn test_expire_prunes_stale_requests() {
        let mut coordinator = ComparisonCoordinator::new();
        coordinator.request("d1", "d2").unwrap();

        // A zero TTL expires everything issued before now
        let pruned = coordinator.expire(Duration::from_millis(0));

        assert_eq!(pruned, 1);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn test_expire_keeps_fresh_requests() {
        let mut coordinator = ComparisonCoordinator::new();
        coordinator.request("d1", "d2").unwrap();

        let pruned = coordinator.expire(Duration::from_secs(3600));

        assert_eq!(pruned, 0);
        assert_eq!(coordinator.pending_count(), 1);
    }

    #[test]
    fn test_pending_participants() {
        let mut coordinator = ComparisonCoordinator::new();
        let id = coordinator.request("d1", "d2").unwrap();

        let (a, b) = coordinator.pending_participants(&id).unwrap();
        assert_eq!(a.as_str(), "d1");
        assert_eq!(b.as_str(), "d2");
        assert!(coordinator.pending_participants("d9-d8-aaaaaa").is_none());
    }
}
