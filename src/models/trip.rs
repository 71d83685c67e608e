// src/models/trip.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vehicle {
    pub id: String,
    pub model: String,
    pub plate_number: Option<String>,
    pub battery_percent: u8,
    pub range_km: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StationLocation {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// A running trip session, created only from an activated booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripSession {
    pub id: String,
    pub booking_id: String,
    pub vehicle: Vehicle,
    pub start_location: StationLocation,
    // Destination is best-effort; a trip runs fine without one
    pub destination: Option<StationLocation>,
    pub started_at: DateTime<Utc>,
    pub estimated_end: DateTime<Utc>,
}

impl TripSession {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.estimated_end - now
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.estimated_end
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TripMetrics {
    pub distance_km: f64,
    pub duration_min: i64,
    pub average_speed_kmh: f64,
}

impl TripMetrics {
    /// Derive metrics from a ridden distance and the session duration.
    pub fn from_ride(distance_km: f64, duration: Duration) -> Self {
        let duration_min = duration.num_minutes().max(0);
        let hours = duration.num_seconds().max(0) as f64 / 3600.0;
        let average_speed_kmh = if hours > 0.0 { distance_km / hours } else { 0.0 };

        Self { distance_km, duration_min, average_speed_kmh }
    }
}
