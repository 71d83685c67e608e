// src/services/active_booking.rs
use std::sync::Arc;
use tracing;

use crate::{
    api::BackendApi,
    errors::{SwiftError, SwiftResult},
    models::booking::Booking,
    storage::{self, LocalStore, StoreKeys},
};

/// Durable cache of "the" current booking: the most recently reserved booking
/// still in an open status. At most one exists per user; callers must check
/// `get()` before allowing a new activation.
pub struct ActiveBookingCache {
    backend: Arc<dyn BackendApi>,
    store: Arc<dyn LocalStore>,
}

impl ActiveBookingCache {
    pub fn new(backend: Arc<dyn BackendApi>, store: Arc<dyn LocalStore>) -> Self {
        Self { backend, store }
    }

    /// Reconcile the selection against the backend: fetch, filter to open
    /// statuses, pick the most recently reserved, persist it.
    pub async fn refresh(&self, user_id: &str) -> SwiftResult<Option<Booking>> {
        tracing::debug!("Refreshing active booking for user: {}", user_id);

        let mut candidates: Vec<Booking> = self
            .backend
            .list_bookings(user_id)
            .await?
            .into_iter()
            .filter(|b| b.status.is_open())
            .collect();
        candidates.sort_by(|a, b| b.reserved_at.cmp(&a.reserved_at));

        match candidates.into_iter().next() {
            Some(selected) => {
                self.set(&selected)?;
                tracing::info!("Active booking refreshed: {}", selected.id);
                Ok(Some(selected))
            }
            None => {
                self.clear()?;
                tracing::debug!("No active booking for user: {}", user_id);
                Ok(None)
            }
        }
    }

    /// The durably cached selection. Never touches the network.
    pub fn get(&self) -> Option<Booking> {
        match storage::read_json(self.store.as_ref(), &StoreKeys::active_booking()) {
            Ok(selection) => selection,
            Err(err) => {
                tracing::warn!("Failed to read active booking selection: {}", err);
                None
            }
        }
    }

    /// Override the selection after a local transition, skipping a round-trip.
    pub fn set(&self, booking: &Booking) -> SwiftResult<()> {
        storage::write_json(self.store.as_ref(), &StoreKeys::active_booking(), booking)
            .map_err(SwiftError::from)
    }

    pub fn clear(&self) -> SwiftResult<()> {
        self.store
            .remove(&StoreKeys::active_booking())
            .map_err(SwiftError::from)
    }

    /// Clear only when the selection points at the given booking.
    pub fn clear_if_matches(&self, booking_id: &str) -> SwiftResult<()> {
        if self.get().is_some_and(|b| b.id == booking_id) {
            self.clear()?;
        }
        Ok(())
    }
}
