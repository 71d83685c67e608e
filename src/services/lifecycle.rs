// src/services/lifecycle.rs
use chrono::Utc;
use std::sync::Arc;
use tracing;

use crate::{
    api::BackendApi,
    errors::{SwiftError, SwiftResult},
    models::{
        booking::{ActivationStatus, Booking, BookingRequest, BookingStatus, BookingUpdate},
        trip::TripMetrics,
    },
    services::{
        active_booking::ActiveBookingCache, booking_store::BookingStore,
        trip_service::TripService, unlock_service::UnlockCoordinator,
    },
    utils::id_generator::{IdType, WithGeneratedId},
};

/// Whole-transition coordinator over the four coupled records: booking,
/// unlock request, active-booking cache, trip session. Call sites never
/// mutate them independently; each operation here applies one complete
/// lifecycle step.
///
/// User-driven transitions write to the backend first and apply locally only
/// on success, so a network failure leaves every record at last-known-good.
pub struct LifecycleCoordinator {
    backend: Arc<dyn BackendApi>,
    bookings: Arc<BookingStore>,
    active_cache: Arc<ActiveBookingCache>,
    unlocks: Arc<UnlockCoordinator>,
    trips: Arc<TripService>,
}

impl LifecycleCoordinator {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        bookings: Arc<BookingStore>,
        active_cache: Arc<ActiveBookingCache>,
        unlocks: Arc<UnlockCoordinator>,
        trips: Arc<TripService>,
    ) -> Self {
        Self { backend, bookings, active_cache, unlocks, trips }
    }

    fn validate_request(request: &BookingRequest) -> SwiftResult<()> {
        if request.vehicle_id.trim().is_empty() {
            return Err(SwiftError::MissingRequiredField("vehicle_id".to_string()));
        }
        if request.start_location_id.trim().is_empty() {
            return Err(SwiftError::MissingRequiredField("start_location_id".to_string()));
        }
        if request.start_date.is_none() {
            return Err(SwiftError::MissingRequiredField("start_date".to_string()));
        }
        Ok(())
    }

    /// Submit a new reservation. Rejected before any backend call when a
    /// booking is already active for this user.
    pub async fn reserve(&self, request: BookingRequest) -> SwiftResult<Booking> {
        Self::validate_request(&request)?;

        if let Some(active) = self.active_cache.get() {
            return Err(SwiftError::ActiveBookingConflict(active.id));
        }

        let start_date = request.start_date.ok_or_else(|| {
            SwiftError::MissingRequiredField("start_date".to_string())
        })?;
        let booking =
            Booking::from_request(request, start_date).with_generated_id(IdType::Booking);

        let created = self.backend.create_booking(&booking).await?;
        self.bookings.add(created.clone())?;
        self.active_cache.set(&created)?;

        tracing::info!("Reservation created: {}", created.id);
        Ok(created)
    }

    /// Flip a booking into its activated state off the back of a successful
    /// unlock, then start the trip session. The booking record is re-read
    /// here; a value captured before the unlock resolved must not be trusted.
    pub async fn activate(
        &self,
        booking_id: &str,
        unlock_request_id: &str,
    ) -> SwiftResult<Booking> {
        let unlock = self
            .unlocks
            .get(unlock_request_id)
            .ok_or_else(|| SwiftError::unlock_request_not_found(unlock_request_id))?;
        if !unlock.is_unlocked() {
            return Err(SwiftError::UnlockNotConfirmed(unlock_request_id.to_string()));
        }
        if unlock.booking_id != booking_id {
            return Err(SwiftError::InvalidFieldValue {
                field: "unlock_request_id".to_string(),
                value: unlock_request_id.to_string(),
                reason: format!("belongs to booking {}", unlock.booking_id),
            });
        }
        let unlock_time = unlock
            .actual_unlock_time
            .ok_or_else(|| SwiftError::UnlockNotConfirmed(unlock_request_id.to_string()))?;

        let booking = self
            .bookings
            .find_by_id(booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;
        if booking.status.is_terminal() || booking.status == BookingStatus::Active {
            return Err(SwiftError::invalid_status(
                booking_id,
                booking.status.to_string(),
                "pending or confirmed",
            ));
        }

        let confirm = BookingUpdate {
            status: Some(BookingStatus::Confirmed),
            actual_start_date: Some(unlock_time),
            activation_status: Some(ActivationStatus::Active),
            is_activated: Some(true),
            activated_at: Some(unlock_time),
            ..Default::default()
        };
        self.backend.update_booking(booking_id, &confirm).await?;
        let confirmed = self.bookings.update(booking_id, &confirm)?;
        self.active_cache.set(&confirmed)?;

        self.trips.initialize(&confirmed).await?;

        let start = BookingUpdate::status(BookingStatus::Active);
        self.backend.update_booking(booking_id, &start).await?;
        let active = self.bookings.update(booking_id, &start)?;
        self.active_cache.set(&active)?;

        tracing::info!("Booking activated: {} (unlock {})", booking_id, unlock_request_id);
        Ok(active)
    }

    /// Release a reservation that lapsed unused. Local state is settled even
    /// when the backend is unreachable; the monitor drives this path and a
    /// lapsed hold must not linger on-device.
    pub async fn expire(&self, booking_id: &str) -> SwiftResult<()> {
        let booking = match self.bookings.find_by_id(booking_id) {
            Some(booking) => booking,
            None => return Ok(()),
        };
        if booking.status.is_terminal() {
            return Ok(());
        }

        let update = BookingUpdate {
            status: Some(BookingStatus::Cancelled),
            activation_status: Some(ActivationStatus::Cancelled),
            ..Default::default()
        };
        self.bookings.update(booking_id, &update)?;
        self.active_cache.clear_if_matches(booking_id)?;

        if let Some(pending) = self.unlocks.pending_request_for(booking_id) {
            if let Err(err) = self.unlocks.record_failure(&pending.id, "Reservation expired").await
            {
                tracing::warn!("Could not fail pending unlock {}: {}", pending.id, err);
            }
        }

        if let Err(err) = self.backend.update_booking(booking_id, &update).await {
            tracing::warn!("Backend expiry update deferred for {}: {}", booking_id, err);
        }

        tracing::info!("Booking expired unused: {}", booking_id);
        Ok(())
    }

    /// Finish a running trip: close the session, write post-trip metrics and
    /// the terminal status, release the active slot.
    pub async fn complete(&self, booking_id: &str, distance_km: f64) -> SwiftResult<Booking> {
        let booking = self
            .bookings
            .find_by_id(booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;
        if booking.status != BookingStatus::Active {
            return Err(SwiftError::invalid_status(
                booking_id,
                booking.status.to_string(),
                "active",
            ));
        }

        let now = Utc::now();
        let metrics = match self.trips.end_trip(distance_km).await {
            Some((_, metrics)) => metrics,
            None => {
                // No running session (e.g. process restart mid-trip); derive
                // duration from the booking record instead.
                let duration = booking
                    .actual_start_date
                    .map(|start| now - start)
                    .unwrap_or_else(chrono::Duration::zero);
                TripMetrics::from_ride(distance_km, duration)
            }
        };

        let update = BookingUpdate {
            status: Some(BookingStatus::Completed),
            actual_end_date: Some(now),
            activation_status: Some(ActivationStatus::Completed),
            distance_km: Some(metrics.distance_km),
            duration_min: Some(metrics.duration_min),
            average_speed_kmh: Some(metrics.average_speed_kmh),
            ..Default::default()
        };
        self.backend.update_booking(booking_id, &update).await?;
        let completed = self.bookings.update(booking_id, &update)?;
        self.active_cache.clear_if_matches(booking_id)?;

        tracing::info!("Booking completed: {} ({:.1} km)", booking_id, metrics.distance_km);
        Ok(completed)
    }

    /// Cancel a booking before it turns active. No side effects beyond the
    /// state change and releasing the active slot.
    pub async fn cancel(&self, booking_id: &str) -> SwiftResult<Booking> {
        let booking = self
            .bookings
            .find_by_id(booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;
        if !booking.can_cancel() {
            return Err(SwiftError::invalid_status(
                booking_id,
                booking.status.to_string(),
                "any status before active",
            ));
        }

        let update = BookingUpdate {
            status: Some(BookingStatus::Cancelled),
            activation_status: Some(ActivationStatus::Cancelled),
            ..Default::default()
        };
        self.backend.update_booking(booking_id, &update).await?;
        let cancelled = self.bookings.update(booking_id, &update)?;
        self.active_cache.clear_if_matches(booking_id)?;

        if let Some(pending) = self.unlocks.pending_request_for(booking_id) {
            if let Err(err) =
                self.unlocks.record_failure(&pending.id, "Booking cancelled").await
            {
                tracing::warn!("Could not fail pending unlock {}: {}", pending.id, err);
            }
        }

        tracing::info!("Booking cancelled: {}", booking_id);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::models::booking::PaymentMethod;
    use crate::models::trip::{StationLocation, Vehicle};
    use crate::models::unlock::{GeoPoint, UnlockMethod};
    use crate::services::unlock_service::FixedLocationProvider;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    const FALLBACK: GeoPoint = GeoPoint { latitude: 5.6037, longitude: -0.1870 };

    struct Fixture {
        backend: Arc<MockBackend>,
        bookings: Arc<BookingStore>,
        cache: Arc<ActiveBookingCache>,
        unlocks: Arc<UnlockCoordinator>,
        trips: Arc<TripService>,
        lifecycle: LifecycleCoordinator,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(MemoryStore::new());
        let bookings = Arc::new(BookingStore::new(store.clone()));
        let cache = Arc::new(ActiveBookingCache::new(backend.clone(), store));
        let unlocks = Arc::new(UnlockCoordinator::new(
            backend.clone(),
            bookings.clone(),
            cache.clone(),
            Arc::new(FixedLocationProvider::new(FALLBACK)),
            FALLBACK,
            Duration::from_secs(5),
        ));
        let trips = Arc::new(TripService::new(backend.clone()));
        let lifecycle = LifecycleCoordinator::new(
            backend.clone(),
            bookings.clone(),
            cache.clone(),
            unlocks.clone(),
            trips.clone(),
        );
        Fixture { backend, bookings, cache, unlocks, trips, lifecycle }
    }

    fn request() -> BookingRequest {
        BookingRequest {
            user_id: "usr-250801-a1b2c".to_string(),
            vehicle_id: "veh-250801-d3e4f".to_string(),
            start_location_id: "stn-250801-g5h6i".to_string(),
            end_location_id: "stn-250801-j7k8l".to_string(),
            start_date: Some(Utc::now()),
            end_date: None,
            payment_method: PaymentMethod::Card,
            total_cost: 10.0,
            discount: 0.0,
        }
    }

    fn seed_trip_fetches(fx: &Fixture, booking: &Booking) {
        fx.backend.insert_vehicle(Vehicle {
            id: booking.vehicle_id.clone(),
            model: "S1".to_string(),
            plate_number: None,
            battery_percent: 85,
            range_km: 25.0,
        });
        fx.backend.insert_station(StationLocation {
            id: booking.start_location_id.clone(),
            name: "Osu Station".to_string(),
            latitude: 5.56,
            longitude: -0.18,
            address: None,
        });
    }

    #[tokio::test]
    async fn test_reserve_sets_active_selection() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(fx.cache.get().unwrap().id, booking.id);
        assert!(fx.bookings.find_by_id(&booking.id).is_some());
    }

    #[tokio::test]
    async fn test_second_reservation_rejected_without_backend_mutation() {
        let fx = fixture();
        fx.lifecycle.reserve(request()).await.unwrap();
        let writes_before = fx.backend.write_calls();

        let result = fx.lifecycle.reserve(request()).await;
        assert!(matches!(result, Err(SwiftError::ActiveBookingConflict(_))));
        assert_eq!(fx.backend.write_calls(), writes_before);
    }

    #[tokio::test]
    async fn test_missing_start_date_rejected() {
        let fx = fixture();
        let mut bad = request();
        bad.start_date = None;

        let result = fx.lifecycle.reserve(bad).await;
        assert!(matches!(result, Err(SwiftError::MissingRequiredField(field)) if field == "start_date"));
    }

    #[tokio::test]
    async fn test_activation_requires_unlocked_request() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();
        let unlock = fx
            .unlocks
            .create_unlock_request(&booking.id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();

        // Still pending: activation must refuse
        let result = fx.lifecycle.activate(&booking.id, &unlock.id).await;
        assert!(matches!(result, Err(SwiftError::UnlockNotConfirmed(_))));

        let untouched = fx.bookings.find_by_id(&booking.id).unwrap();
        assert_eq!(untouched.status, BookingStatus::Pending);
        assert!(untouched.actual_start_date.is_none());
    }

    #[tokio::test]
    async fn test_activation_after_successful_unlock() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();
        seed_trip_fetches(&fx, &booking);

        let unlock = fx
            .unlocks
            .create_unlock_request(&booking.id, Utc::now(), UnlockMethod::QrCode)
            .await
            .unwrap();
        let unlocked = fx.unlocks.record_success(&unlock.id).await.unwrap();

        let active = fx.lifecycle.activate(&booking.id, &unlock.id).await.unwrap();
        assert_eq!(active.status, BookingStatus::Active);
        assert_eq!(active.actual_start_date, unlocked.actual_unlock_time);
        assert_eq!(active.activation_status, Some(ActivationStatus::Active));
        assert!(active.is_activated);
        assert!(fx.trips.current().await.is_some());
        assert_eq!(fx.cache.get().unwrap().status, BookingStatus::Active);
    }

    #[tokio::test]
    async fn test_expire_settles_all_records() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();
        fx.unlocks
            .create_unlock_request(&booking.id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();

        fx.lifecycle.expire(&booking.id).await.unwrap();

        let expired = fx.bookings.find_by_id(&booking.id).unwrap();
        assert_eq!(expired.status, BookingStatus::Cancelled);
        assert!(fx.cache.get().is_none());
        assert!(fx.unlocks.pending_request_for(&booking.id).is_none());

        // Second call is a no-op
        fx.lifecycle.expire(&booking.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_expire_settles_locally_while_offline() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();

        fx.backend.set_offline(true);
        fx.lifecycle.expire(&booking.id).await.unwrap();

        assert_eq!(fx.bookings.find_by_id(&booking.id).unwrap().status, BookingStatus::Cancelled);
        assert!(fx.cache.get().is_none());
    }

    #[tokio::test]
    async fn test_complete_writes_metrics_and_clears_cache() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();
        seed_trip_fetches(&fx, &booking);

        let unlock = fx
            .unlocks
            .create_unlock_request(&booking.id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        fx.unlocks.record_success(&unlock.id).await.unwrap();
        fx.lifecycle.activate(&booking.id, &unlock.id).await.unwrap();

        let completed = fx.lifecycle.complete(&booking.id, 4.2).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.distance_km, Some(4.2));
        assert!(completed.actual_end_date.is_some());
        assert!(fx.cache.get().is_none());
        assert!(fx.trips.current().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_rejected_once_active() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();
        seed_trip_fetches(&fx, &booking);

        let unlock = fx
            .unlocks
            .create_unlock_request(&booking.id, Utc::now(), UnlockMethod::Manual)
            .await
            .unwrap();
        fx.unlocks.record_success(&unlock.id).await.unwrap();
        fx.lifecycle.activate(&booking.id, &unlock.id).await.unwrap();

        let result = fx.lifecycle.cancel(&booking.id).await;
        assert!(matches!(result, Err(SwiftError::InvalidBookingStatus { .. })));
    }

    #[tokio::test]
    async fn test_cancel_before_active_releases_slot() {
        let fx = fixture();
        let booking = fx.lifecycle.reserve(request()).await.unwrap();

        let cancelled = fx.lifecycle.cancel(&booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(fx.cache.get().is_none());

        // Slot is free for a fresh reservation
        fx.lifecycle.reserve(request()).await.unwrap();
    }
}
