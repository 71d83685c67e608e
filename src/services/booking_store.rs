// src/services/booking_store.rs
use std::sync::{Arc, Mutex};
use tracing;

use crate::{
    errors::{SwiftError, SwiftResult},
    models::booking::{Booking, BookingStatus, BookingUpdate},
    storage::{self, LocalStore, StoreKeys},
};

/// Authoritative in-memory list of bookings with a durable mirror. Mutations
/// are two-phase: the prospective set is persisted first and memory is updated
/// only once the write is confirmed, so a failed persist leaves both sides at
/// the last-known-good state.
pub struct BookingStore {
    store: Arc<dyn LocalStore>,
    bookings: Mutex<Vec<Booking>>,
}

impl BookingStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let bookings = match storage::read_json::<Vec<Booking>>(store.as_ref(), &StoreKeys::bookings())
        {
            Ok(Some(bookings)) => {
                tracing::debug!("Loaded {} bookings from local storage", bookings.len());
                bookings
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("Failed to read booking mirror, starting empty: {}", err);
                Vec::new()
            }
        };

        Self { store, bookings: Mutex::new(bookings) }
    }

    fn persist(&self, prospective: &[Booking]) -> SwiftResult<()> {
        storage::write_json(self.store.as_ref(), &StoreKeys::bookings(), &prospective)
            .map_err(SwiftError::from)
    }

    pub fn add(&self, booking: Booking) -> SwiftResult<()> {
        let mut bookings = self.bookings.lock().expect("booking store lock poisoned");

        let mut prospective = bookings.clone();
        prospective.push(booking.clone());
        self.persist(&prospective)?;

        tracing::info!("Booking added: {} ({})", booking.id, booking.status);
        *bookings = prospective;
        Ok(())
    }

    /// Merge a partial update into an existing record. Unknown ids are a
    /// failure, not a silent no-op.
    pub fn update(&self, booking_id: &str, update: &BookingUpdate) -> SwiftResult<Booking> {
        let mut bookings = self.bookings.lock().expect("booking store lock poisoned");

        let index = bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;

        let mut prospective = bookings.clone();
        update.apply(&mut prospective[index]);
        self.persist(&prospective)?;

        let updated = prospective[index].clone();
        tracing::info!("Booking updated: {} -> {}", booking_id, updated.status);
        *bookings = prospective;
        Ok(updated)
    }

    pub fn remove(&self, booking_id: &str) -> SwiftResult<()> {
        let mut bookings = self.bookings.lock().expect("booking store lock poisoned");

        if !bookings.iter().any(|b| b.id == booking_id) {
            return Err(SwiftError::booking_not_found(booking_id));
        }

        let prospective: Vec<Booking> =
            bookings.iter().filter(|b| b.id != booking_id).cloned().collect();
        self.persist(&prospective)?;

        tracing::info!("Booking removed: {}", booking_id);
        *bookings = prospective;
        Ok(())
    }

    pub fn find_by_id(&self, booking_id: &str) -> Option<Booking> {
        let bookings = self.bookings.lock().expect("booking store lock poisoned");
        bookings.iter().find(|b| b.id == booking_id).cloned()
    }

    pub fn all(&self) -> Vec<Booking> {
        let bookings = self.bookings.lock().expect("booking store lock poisoned");
        bookings.clone()
    }

    pub fn cancel(&self, booking_id: &str) -> SwiftResult<Booking> {
        self.update(booking_id, &BookingUpdate::status(BookingStatus::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{BookingRequest, PaymentMethod};
    use crate::storage::MemoryStore;
    use crate::utils::id_generator::{IdGenerator, IdType};
    use chrono::Utc;

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

    #[test]
    fn test_add_and_find() {
        let store = Arc::new(MemoryStore::new());
        let bookings = BookingStore::new(store);

        let booking = sample_booking();
        let id = booking.id.clone();
        bookings.add(booking).unwrap();

        assert!(bookings.find_by_id(&id).is_some());
        assert_eq!(bookings.all().len(), 1);
    }

    #[test]
    fn test_update_unknown_id_fails() {
        let store = Arc::new(MemoryStore::new());
        let bookings = BookingStore::new(store);

        let result = bookings.update("bkg-250801-zzzzz", &BookingUpdate::default());
        assert!(matches!(result, Err(SwiftError::BookingNotFound(_))));
    }

    #[test]
    fn test_cancel_sets_status() {
        let store = Arc::new(MemoryStore::new());
        let bookings = BookingStore::new(store);

        let booking = sample_booking();
        let id = booking.id.clone();
        bookings.add(booking).unwrap();

        let cancelled = bookings.cancel(&id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let bookings = BookingStore::new(store.clone());

        let booking = sample_booking();
        let id = booking.id.clone();
        bookings.add(booking).unwrap();

        store.set_fail_writes(true);
        let result = bookings.cancel(&id);
        assert!(matches!(result, Err(SwiftError::StorageWrite(_))));

        // The in-memory record still holds its pre-update status
        let unchanged = bookings.find_by_id(&id).unwrap();
        assert_eq!(unchanged.status, BookingStatus::Pending);
    }

    #[test]
    fn test_mirror_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        {
            let bookings = BookingStore::new(store.clone());
            bookings.add(sample_booking()).unwrap();
        }

        let reloaded = BookingStore::new(store);
        assert_eq!(reloaded.all().len(), 1);
    }

    #[test]
    fn test_remove_deletes_permanently() {
        let store = Arc::new(MemoryStore::new());
        let bookings = BookingStore::new(store.clone());

        let booking = sample_booking();
        let id = booking.id.clone();
        bookings.add(booking).unwrap();
        bookings.remove(&id).unwrap();

        assert!(bookings.find_by_id(&id).is_none());
        let reloaded = BookingStore::new(store);
        assert!(reloaded.all().is_empty());
    }
}
