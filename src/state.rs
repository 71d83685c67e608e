// src/state.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing;

use crate::{
    api::{BackendApi, HttpBackend, MockBackend},
    errors::{SwiftError, SwiftResult},
    models::{alert::BookingAlert, unlock::GeoPoint},
    services::{
        ActiveBookingCache, BookingStore, ChannelAlertSink, ExpiryMonitor, FixedLocationProvider,
        LifecycleCoordinator, LocationProvider, OfflineSyncQueue, TripService, UnlockCoordinator,
    },
    storage::{FileStore, LocalStore},
};

#[derive(Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub storage_dir: PathBuf,
    pub fallback_location: GeoPoint,
    pub geolocation_timeout: Duration,
    pub monitor_tick: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            storage_dir: PathBuf::from(".swift-mobility"),
            // Accra city centre, used when the device cannot provide a fix
            fallback_location: GeoPoint { latitude: 5.6037, longitude: -0.1870 },
            geolocation_timeout: Duration::from_secs(5),
            monitor_tick: crate::services::expiry_monitor::DEFAULT_TICK,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> SwiftResult<Self> {
        let api_base_url = std::env::var("SWIFT_API_BASE_URL")
            .map_err(|_| SwiftError::MissingEnvironmentVariable("SWIFT_API_BASE_URL".to_string()))?;
        let storage_dir = std::env::var("SWIFT_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".swift-mobility"));

        Ok(Self { api_base_url, storage_dir, ..Default::default() })
    }
}

/// Wires the booking core together for consumption by UI event handlers.
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn BackendApi>,
    pub store: Arc<dyn LocalStore>,
    pub bookings: Arc<BookingStore>,
    pub active_cache: Arc<ActiveBookingCache>,
    pub unlocks: Arc<UnlockCoordinator>,
    pub trips: Arc<TripService>,
    pub lifecycle: Arc<LifecycleCoordinator>,
    pub monitor: Arc<ExpiryMonitor>,
    pub sync_queue: Arc<OfflineSyncQueue>,
}

impl AppState {
    /// Build the service graph. Returns the state plus the receiver that
    /// delivers transient alerts to the UI. The monitor is not started here;
    /// call `state.monitor.start()` once the UI is ready to show alerts.
    pub fn new(config: AppConfig) -> SwiftResult<(Self, mpsc::UnboundedReceiver<BookingAlert>)> {
        let backend: Arc<dyn BackendApi> = if config.api_base_url.is_empty() {
            tracing::warn!("SWIFT_API_BASE_URL not set, using mock backend");
            Arc::new(MockBackend::new())
        } else {
            Arc::new(HttpBackend::new(&config.api_base_url))
        };
        let location_provider: Arc<dyn LocationProvider> =
            Arc::new(FixedLocationProvider::new(config.fallback_location));

        Self::with_services(config, backend, location_provider)
    }

    /// Same wiring with the platform collaborators supplied by the caller,
    /// used by host apps providing real geolocation and by tests.
    pub fn with_services(
        config: AppConfig,
        backend: Arc<dyn BackendApi>,
        location_provider: Arc<dyn LocationProvider>,
    ) -> SwiftResult<(Self, mpsc::UnboundedReceiver<BookingAlert>)> {
        let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(&config.storage_dir)?);

        let bookings = Arc::new(BookingStore::new(store.clone()));
        let active_cache = Arc::new(ActiveBookingCache::new(backend.clone(), store.clone()));
        let unlocks = Arc::new(UnlockCoordinator::new(
            backend.clone(),
            bookings.clone(),
            active_cache.clone(),
            location_provider,
            config.fallback_location,
            config.geolocation_timeout,
        ));
        let trips = Arc::new(TripService::new(backend.clone()));
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            backend.clone(),
            bookings.clone(),
            active_cache.clone(),
            unlocks.clone(),
            trips.clone(),
        ));

        let (sink, alerts) = ChannelAlertSink::new();
        let monitor = Arc::new(ExpiryMonitor::new(
            backend.clone(),
            bookings.clone(),
            lifecycle.clone(),
            Arc::new(sink),
            config.monitor_tick,
        ));
        let sync_queue = Arc::new(OfflineSyncQueue::new(backend.clone(), store.clone()));

        Ok((
            Self {
                config,
                backend,
                store,
                bookings,
                active_cache,
                unlocks,
                trips,
                lifecycle,
                monitor,
                sync_queue,
            },
            alerts,
        ))
    }

    /// Hook for the host's connectivity listener: drain the offline queues
    /// whenever the connection comes back.
    pub async fn on_connection_restored(&self) {
        tracing::info!("Connection restored, draining offline queues");
        self.sync_queue.sync_all().await;
    }
}
