// src/services/unlock_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing;

use crate::{
    api::BackendApi,
    errors::{SwiftError, SwiftResult},
    models::unlock::{GeoPoint, UnlockMethod, UnlockRequest, UnlockRequestUpdate, UnlockStatus},
    services::{active_booking::ActiveBookingCache, booking_store::BookingStore},
    utils::id_generator::{IdType, WithGeneratedId},
};

const UNLOCK_CODE_ALPHABET: [char; 32] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Best-effort device geolocation. Platform integrations implement this; the
/// coordinator bounds every call with a timeout and falls back to a fixed
/// coordinate.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> SwiftResult<GeoPoint>;
}

pub struct FixedLocationProvider {
    point: GeoPoint,
}

impl FixedLocationProvider {
    pub fn new(point: GeoPoint) -> Self {
        Self { point }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> SwiftResult<GeoPoint> {
        Ok(self.point)
    }
}

/// Manages the unlock sub-flow: creates attempts, records their outcome, and
/// keeps at most one pending request per booking. Method-agnostic: manual code
/// entry and QR scan both resolve through `record_success`/`record_failure`.
/// Transitioning the booking itself is the lifecycle coordinator's job.
pub struct UnlockCoordinator {
    backend: Arc<dyn BackendApi>,
    bookings: Arc<BookingStore>,
    active_cache: Arc<ActiveBookingCache>,
    location_provider: Arc<dyn LocationProvider>,
    fallback_location: GeoPoint,
    geolocation_timeout: Duration,
    requests: Mutex<HashMap<String, UnlockRequest>>,
}

impl UnlockCoordinator {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        bookings: Arc<BookingStore>,
        active_cache: Arc<ActiveBookingCache>,
        location_provider: Arc<dyn LocationProvider>,
        fallback_location: GeoPoint,
        geolocation_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            bookings,
            active_cache,
            location_provider,
            fallback_location,
            geolocation_timeout,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate_unlock_code() -> String {
        nanoid!(6, &UNLOCK_CODE_ALPHABET)
    }

    async fn capture_location(&self) -> GeoPoint {
        match tokio::time::timeout(
            self.geolocation_timeout,
            self.location_provider.current_location(),
        )
        .await
        {
            Ok(Ok(point)) => point,
            Ok(Err(err)) => {
                tracing::warn!("Geolocation failed, using fallback: {}", err);
                self.fallback_location
            }
            Err(_) => {
                tracing::warn!("Geolocation timed out, using fallback");
                self.fallback_location
            }
        }
    }

    /// The at-most-one pending request for a booking, if any.
    pub fn pending_request_for(&self, booking_id: &str) -> Option<UnlockRequest> {
        let requests = self.requests.lock().expect("unlock lock poisoned");
        requests.values().find(|r| r.booking_id == booking_id && r.is_pending()).cloned()
    }

    pub fn get(&self, request_id: &str) -> Option<UnlockRequest> {
        let requests = self.requests.lock().expect("unlock lock poisoned");
        requests.get(request_id).cloned()
    }

    /// Begin a new unlock attempt for a booking. Rejected before any backend
    /// call when a different booking is currently active; a prior pending
    /// attempt for the same booking is superseded, never duplicated.
    pub async fn create_unlock_request(
        &self,
        booking_id: &str,
        scheduled_time: DateTime<Utc>,
        method: UnlockMethod,
    ) -> SwiftResult<UnlockRequest> {
        let booking = self
            .bookings
            .find_by_id(booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;

        if let Some(active) = self.active_cache.get() {
            if active.id != booking_id {
                return Err(SwiftError::ActiveBookingConflict(active.id));
            }
        }

        if let Some(prior) = self.pending_request_for(booking_id) {
            tracing::info!("Superseding pending unlock request {} for booking {}", prior.id, booking_id);
            self.record_failure(&prior.id, "Superseded by a newer attempt").await?;
        }

        let location = self.capture_location().await;

        let request = UnlockRequest {
            id: String::new(), // Set by with_generated_id
            user_id: booking.user_id.clone(),
            vehicle_id: booking.vehicle_id.clone(),
            booking_id: booking.id.clone(),
            requested_at: Utc::now(),
            scheduled_unlock_time: scheduled_time,
            actual_unlock_time: None,
            status: UnlockStatus::Pending,
            method,
            location,
            unlock_code: Self::generate_unlock_code(),
            attempts: 0,
            error_message: None,
        }
        .with_generated_id(IdType::Unlock);

        let created = self.backend.create_unlock_request(&request).await?;
        tracing::info!("Unlock request created: {} for booking {}", created.id, booking_id);

        let mut requests = self.requests.lock().expect("unlock lock poisoned");
        requests.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    /// Record a successful unlock. The caller is responsible for driving the
    /// booking transition afterwards.
    pub async fn record_success(&self, request_id: &str) -> SwiftResult<UnlockRequest> {
        let known = self
            .get(request_id)
            .ok_or_else(|| SwiftError::unlock_request_not_found(request_id))?;

        let update = UnlockRequestUpdate {
            status: Some(UnlockStatus::Unlocked),
            actual_unlock_time: Some(Utc::now()),
            attempts: Some(known.attempts + 1),
            ..Default::default()
        };
        let updated = self.backend.update_unlock_request(request_id, &update).await?;

        tracing::info!("Unlock succeeded: {} (attempt {})", request_id, updated.attempts);
        let mut requests = self.requests.lock().expect("unlock lock poisoned");
        requests.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    /// Record a failed unlock. The booking is left untouched so the user can
    /// retry with a fresh attempt.
    pub async fn record_failure(
        &self,
        request_id: &str,
        message: &str,
    ) -> SwiftResult<UnlockRequest> {
        let known = self
            .get(request_id)
            .ok_or_else(|| SwiftError::unlock_request_not_found(request_id))?;

        let update = UnlockRequestUpdate {
            status: Some(UnlockStatus::Failed),
            attempts: Some(known.attempts + 1),
            error_message: Some(message.to_string()),
            ..Default::default()
        };
        let updated = self.backend.update_unlock_request(request_id, &update).await?;

        tracing::warn!("Unlock failed: {} ({})", request_id, message);
        let mut requests = self.requests.lock().expect("unlock lock poisoned");
        requests.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::models::booking::{Booking, BookingRequest, BookingStatus, PaymentMethod};
    use crate::storage::MemoryStore;
    use crate::utils::id_generator::IdGenerator;

    struct UnavailableLocationProvider;

    #[async_trait]
    impl LocationProvider for UnavailableLocationProvider {
        async fn current_location(&self) -> SwiftResult<GeoPoint> {
            Err(SwiftError::GeolocationUnavailable("no fix".to_string()))
        }
    }

    struct SlowLocationProvider;

    #[async_trait]
    impl LocationProvider for SlowLocationProvider {
        async fn current_location(&self) -> SwiftResult<GeoPoint> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GeoPoint { latitude: 0.0, longitude: 0.0 })
        }
    }

    const FALLBACK: GeoPoint = GeoPoint { latitude: 5.6037, longitude: -0.1870 };

    fn sample_booking() -> Booking {
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
        booking.id = IdGenerator::generate(IdType::Booking);
        booking
    }

    fn coordinator_with(
        backend: Arc<MockBackend>,
        provider: Arc<dyn LocationProvider>,
    ) -> (UnlockCoordinator, Arc<BookingStore>, Arc<ActiveBookingCache>) {
        let store = Arc::new(MemoryStore::new());
        let bookings = Arc::new(BookingStore::new(store.clone()));
        let cache = Arc::new(ActiveBookingCache::new(backend.clone(), store));
        let coordinator = UnlockCoordinator::new(
            backend,
            bookings.clone(),
            cache.clone(),
            provider,
            FALLBACK,
            Duration::from_secs(5),
        );
        (coordinator, bookings, cache)
    }

    #[tokio::test]
    async fn test_conflict_rejected_before_backend_call() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, cache) =
            coordinator_with(backend.clone(), Arc::new(FixedLocationProvider::new(FALLBACK)));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let mut other = sample_booking();
        other.status = BookingStatus::Confirmed;
        cache.set(&other).unwrap();

        let result = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::Manual)
            .await;
        assert!(matches!(result, Err(SwiftError::ActiveBookingConflict(_))));
        assert_eq!(backend.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_location_when_provider_fails() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, _) =
            coordinator_with(backend, Arc::new(UnavailableLocationProvider));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let request = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::QrCode)
            .await
            .unwrap();
        assert_eq!(request.location, FALLBACK);
        assert_eq!(request.status, UnlockStatus::Pending);
        assert_eq!(request.unlock_code.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_location_when_provider_times_out() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, _) = coordinator_with(backend, Arc::new(SlowLocationProvider));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let request = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        assert_eq!(request.location, FALLBACK);
    }

    #[tokio::test]
    async fn test_failure_increments_attempts_and_leaves_booking_alone() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, _) =
            coordinator_with(backend, Arc::new(FixedLocationProvider::new(FALLBACK)));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let request = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        let failed = coordinator.record_failure(&request.id, "Lock jammed").await.unwrap();

        assert_eq!(failed.status, UnlockStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.error_message.as_deref(), Some("Lock jammed"));

        let untouched = bookings.find_by_id(&booking_id).unwrap();
        assert_eq!(untouched.status, BookingStatus::Pending);
        assert!(untouched.actual_start_date.is_none());
    }

    #[tokio::test]
    async fn test_new_attempt_supersedes_pending_request() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, _) =
            coordinator_with(backend, Arc::new(FixedLocationProvider::new(FALLBACK)));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let first = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        let second = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::QrCode)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(coordinator.get(&first.id).unwrap().status, UnlockStatus::Failed);
        assert!(coordinator.get(&second.id).unwrap().is_pending());
        assert!(coordinator.pending_request_for(&booking_id).is_some_and(|r| r.id == second.id));
    }

    #[tokio::test]
    async fn test_success_sets_unlock_time() {
        let backend = Arc::new(MockBackend::new());
        let (coordinator, bookings, _) =
            coordinator_with(backend, Arc::new(FixedLocationProvider::new(FALLBACK)));

        let booking = sample_booking();
        let booking_id = booking.id.clone();
        bookings.add(booking).unwrap();

        let request = coordinator
            .create_unlock_request(&booking_id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        let unlocked = coordinator.record_success(&request.id).await.unwrap();

        assert!(unlocked.is_unlocked());
        assert!(unlocked.actual_unlock_time.is_some());
        assert_eq!(unlocked.attempts, 1);
    }
}
