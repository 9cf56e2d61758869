use crate::domain::DriverId;
use serde::{Deserialize, Serialize};

/// Tire surface temperatures in Celsius, one per corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TireTemps {
    pub front_left: f32,
    pub front_right: f32,
    pub rear_left: f32,
    pub rear_right: f32,
}

/// Immutable snapshot of one car at one instant.
///
/// Produced by a driver client at 10-60 Hz. Never mutated after creation;
/// the distribution layer only holds samples transiently while fanning them
/// out (persistence lives behind the server's store interface).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub driver_id: DriverId,
    /// Capture time, milliseconds since the producing client's session start
    pub timestamp_ms: u64,

    pub lap: u32,
    pub sector: u8,
    /// Fraction of the lap completed, 0.0..1.0
    pub lap_distance_pct: f64,

    pub speed_kph: f64,
    /// Pedal and wheel inputs, throttle/brake in 0.0..1.0, steering in -1.0..1.0
    pub throttle: f64,
    pub brake: f64,
    pub steering: f64,
    /// Gear, -1 for reverse, 0 for neutral
    pub gear: i8,

    pub tires: TireTemps,

    /// Position in the running order, 1-based
    pub race_position: u32,
    /// Gap to the car ahead/behind in milliseconds, None when no such car
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_ahead_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_behind_ms: Option<i64>,
}

impl TelemetrySample {
    /// A zeroed sample for the given driver and capture time. Callers fill
    /// in the channels they actually measure.
    pub fn at(driver_id: impl Into<DriverId>, timestamp_ms: u64) -> Self {
        TelemetrySample {
            driver_id: driver_id.into(),
            timestamp_ms,
            lap: 0,
            sector: 0,
            lap_distance_pct: 0.0,
            speed_kph: 0.0,
            throttle: 0.0,
            brake: 0.0,
            steering: 0.0,
            gear: 0,
            tires: TireTemps::default(),
            race_position: 0,
            gap_ahead_ms: None,
            gap_behind_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_serialization_round_trip() {
        let mut sample = TelemetrySample::at("d1", 1234);
        sample.lap = 3;
        sample.sector = 2;
        sample.speed_kph = 212.4;
        sample.throttle = 0.85;
        sample.gear = 5;
        sample.race_position = 2;
        sample.gap_ahead_ms = Some(1250);

        let json = serde_json::to_string(&sample).unwrap();
        let deserialized: TelemetrySample = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, sample);
    }

    #[test]
    fn test_gaps_omitted_when_absent() {
        let sample = TelemetrySample::at("d1", 0);
        let json = serde_json::to_string(&sample).unwrap();

        assert!(!json.contains("gap_ahead_ms"));
        assert!(!json.contains("gap_behind_ms"));
    }

    #[test]
    fn test_sample_deserializes_without_gaps() {
        let json = r#"{
            "driver_id": "d1",
            "timestamp_ms": 10,
            "lap": 1,
            "sector": 1,
            "lap_distance_pct": 0.25,
            "speed_kph": 180.0,
            "throttle": 1.0,
            "brake": 0.0,
            "steering": 0.1,
            "gear": 4,
            "tires": {"front_left": 80.0, "front_right": 82.0, "rear_left": 85.0, "rear_right": 86.0},
            "race_position": 1
        }"#;

        let sample: TelemetrySample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.driver_id.as_str(), "d1");
        assert_eq!(sample.gap_ahead_ms, None);
    }
}
