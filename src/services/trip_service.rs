// src/services/trip_service.rs
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing;

use crate::{
    api::BackendApi,
    errors::{SwiftError, SwiftResult},
    models::{
        booking::{Booking, BookingStatus},
        trip::{TripMetrics, TripSession},
    },
    utils::id_generator::{IdGenerator, IdType},
};

const DEFAULT_TRIP_MINUTES: i64 = 30;

/// Bridges an activated booking into a running trip session. Holds at most
/// one session; initialization is all-or-nothing for the mandatory fields.
pub struct TripService {
    backend: Arc<dyn BackendApi>,
    current: Mutex<Option<TripSession>>,
}

impl TripService {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend, current: Mutex::new(None) }
    }

    /// A booking can start a trip only after the unlock sub-flow confirmed it.
    pub fn can_initialize(booking: &Booking) -> bool {
        booking.status == BookingStatus::Confirmed && booking.actual_start_date.is_some()
    }

    pub async fn current(&self) -> Option<TripSession> {
        self.current.lock().await.clone()
    }

    /// Start the trip session for an activated booking. Calling again while a
    /// trip is already running is a no-op returning the running session.
    pub async fn initialize(&self, booking: &Booking) -> SwiftResult<TripSession> {
        // Hold the slot across the fetches so two racing callers cannot
        // build parallel sessions.
        let mut current = self.current.lock().await;

        if let Some(session) = current.as_ref() {
            tracing::debug!("Trip already running ({}), initialize is a no-op", session.id);
            return Ok(session.clone());
        }

        if !Self::can_initialize(booking) {
            return Err(SwiftError::invalid_status(
                booking.id.clone(),
                booking.status.to_string(),
                "confirmed with a recorded unlock",
            ));
        }

        let vehicle = self
            .backend
            .get_vehicle(&booking.vehicle_id)
            .await?
            .ok_or_else(|| SwiftError::VehicleNotFound(booking.vehicle_id.clone()))?;

        let start_location = self
            .backend
            .get_location(&booking.start_location_id)
            .await?
            .ok_or_else(|| SwiftError::StationNotFound(booking.start_location_id.clone()))?;

        // Destination is best-effort; the trip runs without it
        let destination = match self.backend.get_location(&booking.end_location_id).await {
            Ok(destination) => destination,
            Err(err) => {
                tracing::warn!("Destination fetch failed, continuing without it: {}", err);
                None
            }
        };

        let started_at = booking.actual_start_date.ok_or_else(|| {
            SwiftError::invalid_status(
                booking.id.clone(),
                booking.status.to_string(),
                "confirmed with a recorded unlock",
            )
        })?;
        let estimated_end = booking.end_date.unwrap_or_else(|| {
            started_at + Duration::minutes(booking.duration_min.unwrap_or(DEFAULT_TRIP_MINUTES))
        });

        let session = TripSession {
            id: IdGenerator::generate(IdType::Trip),
            booking_id: booking.id.clone(),
            vehicle,
            start_location,
            destination,
            started_at,
            estimated_end,
        };

        tracing::info!(
            "Trip started: {} for booking {} (until {})",
            session.id,
            booking.id,
            estimated_end
        );
        *current = Some(session.clone());
        Ok(session)
    }

    /// Close the running session and derive its metrics from the distance the
    /// caller measured. Returns nothing when no trip is running.
    pub async fn end_trip(&self, distance_km: f64) -> Option<(TripSession, TripMetrics)> {
        let mut current = self.current.lock().await;
        let session = current.take()?;

        let duration = chrono::Utc::now() - session.started_at;
        let metrics = TripMetrics::from_ride(distance_km, duration);
        tracing::info!("Trip ended: {} ({:.1} km)", session.id, distance_km);
        Some((session, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::models::booking::{BookingRequest, PaymentMethod};
    use crate::models::trip::{StationLocation, Vehicle};
    use chrono::Utc;

    fn activated_booking() -> Booking {
        let request = BookingRequest {
            user_id: "usr-250801-a1b2c".to_string(),
            vehicle_id: "veh-250801-d3e4f".to_string(),
            start_location_id: "stn-250801-g5h6i".to_string(),
            end_location_id: "stn-250801-j7k8l".to_string(),
            start_date: Some(Utc::now()),
            end_date: None,
            payment_method: PaymentMethod::Card,
            total_cost: 10.0,
            discount: 0.0,
        };
        let start = request.start_date.unwrap();
        let mut booking = Booking::from_request(request, start);
        booking.id = "bkg-250801-m9n0p".to_string();
        booking.status = BookingStatus::Confirmed;
        booking.actual_start_date = Some(Utc::now());
        booking
    }

    fn seeded_backend(booking: &Booking) -> Arc<MockBackend> {
        let backend = Arc::new(MockBackend::new());
        backend.insert_vehicle(Vehicle {
            id: booking.vehicle_id.clone(),
            model: "S1".to_string(),
            plate_number: None,
            battery_percent: 90,
            range_km: 28.0,
        });
        backend.insert_station(StationLocation {
            id: booking.start_location_id.clone(),
            name: "Osu Station".to_string(),
            latitude: 5.56,
            longitude: -0.18,
            address: None,
        });
        backend
    }

    #[tokio::test]
    async fn test_initialize_builds_session_without_destination() {
        let booking = activated_booking();
        // End station intentionally not seeded: destination is best-effort
        let service = TripService::new(seeded_backend(&booking));

        let session = service.initialize(&booking).await.unwrap();
        assert_eq!(session.booking_id, booking.id);
        assert!(session.destination.is_none());
        assert_eq!(
            session.estimated_end,
            booking.actual_start_date.unwrap() + Duration::minutes(DEFAULT_TRIP_MINUTES)
        );
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_while_running() {
        let booking = activated_booking();
        let service = TripService::new(seeded_backend(&booking));

        let first = service.initialize(&booking).await.unwrap();
        let second = service.initialize(&booking).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_unconfirmed_booking_is_rejected_before_any_fetch() {
        let mut booking = activated_booking();
        booking.status = BookingStatus::Pending;
        booking.actual_start_date = None;

        // Backend would fail every call; the guard must reject first
        let backend = Arc::new(MockBackend::new());
        backend.set_offline(true);
        let service = TripService::new(backend);

        let result = service.initialize(&booking).await;
        assert!(matches!(result, Err(SwiftError::InvalidBookingStatus { .. })));
        assert!(service.current().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_start_location_aborts_without_partial_state() {
        let booking = activated_booking();
        let backend = Arc::new(MockBackend::new());
        backend.insert_vehicle(Vehicle {
            id: booking.vehicle_id.clone(),
            model: "S1".to_string(),
            plate_number: None,
            battery_percent: 90,
            range_km: 28.0,
        });
        let service = TripService::new(backend);

        let result = service.initialize(&booking).await;
        assert!(matches!(result, Err(SwiftError::StationNotFound(_))));
        assert!(service.current().await.is_none());
    }

    #[tokio::test]
    async fn test_end_date_wins_over_duration_default() {
        let mut booking = activated_booking();
        let end = Utc::now() + Duration::minutes(45);
        booking.end_date = Some(end);
        let service = TripService::new(seeded_backend(&booking));

        let session = service.initialize(&booking).await.unwrap();
        assert_eq!(session.estimated_end, end);
    }

    #[tokio::test]
    async fn test_end_trip_returns_metrics_once() {
        let booking = activated_booking();
        let service = TripService::new(seeded_backend(&booking));
        service.initialize(&booking).await.unwrap();

        let (session, metrics) = service.end_trip(3.2).await.unwrap();
        assert_eq!(session.booking_id, booking.id);
        assert_eq!(metrics.distance_km, 3.2);
        assert!(service.end_trip(3.2).await.is_none());
    }
}
