// src/services/mod.rs
pub mod active_booking;
pub mod booking_store;
pub mod expiry_monitor;
pub mod lifecycle;
pub mod sync_queue;
pub mod trip_service;
pub mod unlock_service;

pub use active_booking::ActiveBookingCache;
pub use booking_store::BookingStore;
pub use expiry_monitor::{AlertSink, ChannelAlertSink, ExpiryMonitor, MemoryAlertSink};
pub use lifecycle::LifecycleCoordinator;
pub use sync_queue::{OfflineSyncQueue, SubmitOutcome};
pub use trip_service::TripService;
pub use unlock_service::{FixedLocationProvider, LocationProvider, UnlockCoordinator};
