// src/services/expiry_monitor.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing;

use crate::{
    api::BackendApi,
    errors::SwiftResult,
    models::{
        alert::{BookingAlert, NotificationRecord},
        booking::{Booking, BookingStatus},
    },
    services::{booking_store::BookingStore, lifecycle::LifecycleCoordinator},
    utils::id_generator::{IdGenerator, IdType},
};

pub const DEFAULT_TICK: std::time::Duration = std::time::Duration::from_secs(60);

const START_WINDOW_MIN: i64 = 1;
const EXPIRING_WINDOW_MIN: i64 = 5;

/// Receives the transient user-facing alerts. The UI layer implements this;
/// tests collect.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: BookingAlert);
}

pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<BookingAlert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BookingAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    async fn raise(&self, alert: BookingAlert) {
        if self.tx.send(alert).is_err() {
            tracing::warn!("Alert receiver dropped, discarding alert");
        }
    }
}

/// Collecting sink for development and testing.
#[derive(Default)]
pub struct MemoryAlertSink {
    pub alerts: Mutex<Vec<BookingAlert>>,
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn raise(&self, alert: BookingAlert) {
        self.alerts.lock().expect("alert sink lock poisoned").push(alert);
    }
}

/// Per-session dedup state. Owned by the monitor instance; dropped wholesale
/// when monitoring stops, so a restart re-evaluates from scratch.
#[derive(Debug, Default)]
struct MonitorSession {
    notified_start: HashSet<String>,
    notified_expiring: HashSet<String>,
    notified_expired: HashSet<String>,
}

impl MonitorSession {
    fn reset(&mut self) {
        self.notified_start.clear();
        self.notified_expiring.clear();
        self.notified_expired.clear();
    }
}

/// Compares booking timestamps against wall-clock time on a fixed interval
/// and raises each of the three events (start, near-expiry, expired) at most
/// once per booking per monitoring session.
pub struct ExpiryMonitor {
    backend: Arc<dyn BackendApi>,
    bookings: Arc<BookingStore>,
    lifecycle: Arc<LifecycleCoordinator>,
    sink: Arc<dyn AlertSink>,
    session: Mutex<MonitorSession>,
    active: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    tick: std::time::Duration,
}

impl ExpiryMonitor {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        bookings: Arc<BookingStore>,
        lifecycle: Arc<LifecycleCoordinator>,
        sink: Arc<dyn AlertSink>,
        tick: std::time::Duration,
    ) -> Self {
        Self {
            backend,
            bookings,
            lifecycle,
            sink,
            session: Mutex::new(MonitorSession::default()),
            active: AtomicBool::new(true),
            handle: Mutex::new(None),
            tick,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().expect("monitor lock poisoned").is_some()
    }

    /// Begin the periodic scan. Calling while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().expect("monitor lock poisoned");
        if handle.is_some() {
            tracing::debug!("Monitor already running, start is a no-op");
            return;
        }

        self.active.store(true, Ordering::SeqCst);
        let monitor = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.tick);
            // The first tick completes immediately; the scan starts one full
            // period after start()
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !monitor.active.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = monitor.evaluate_at(Utc::now()).await {
                    tracing::warn!("Monitor tick failed: {}", err);
                }
            }
        }));
        tracing::info!("Expiry monitor started ({}s tick)", self.tick.as_secs());
    }

    /// Stop scanning and forget the session. In-flight work from the last
    /// tick is prevented from applying side effects; the cleared dedup sets
    /// let a later `start()` re-evaluate every booking from scratch.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut handle = self.handle.lock().expect("monitor lock poisoned");
        if let Some(handle) = handle.take() {
            handle.abort();
            tracing::info!("Expiry monitor stopped");
        }
        self.session.lock().expect("monitor lock poisoned").reset();
    }

    /// One evaluation pass at the given instant (useful for testing; the
    /// background task calls this every tick with the current time).
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> SwiftResult<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Ok(());
        }
        for booking in self.bookings.all() {
            self.check_start(&booking, now).await;
            self.check_expiring(&booking, now).await;
            self.check_expired(&booking, now).await;
        }
        Ok(())
    }

    fn claim(&self, set: fn(&mut MonitorSession) -> &mut HashSet<String>, id: &str) -> bool {
        let mut session = self.session.lock().expect("monitor lock poisoned");
        set(&mut session).insert(id.to_string())
    }

    async fn check_start(&self, booking: &Booking, now: DateTime<Utc>) {
        if booking.status != BookingStatus::Confirmed {
            return;
        }
        let window = Duration::minutes(START_WINDOW_MIN);
        let offset = booking.start_date - now;
        if offset > window || offset < -window {
            return;
        }
        if !self.claim(|s| &mut s.notified_start, &booking.id) {
            return;
        }
        self.emit(BookingAlert::start(booking)).await;
    }

    async fn check_expiring(&self, booking: &Booking, now: DateTime<Utc>) {
        let Some(end_date) = booking.end_date else { return };
        if booking.trip_started() || !booking.status.is_open() {
            return;
        }
        let remaining = end_date - now;
        if remaining <= Duration::zero() || remaining > Duration::minutes(EXPIRING_WINDOW_MIN) {
            return;
        }
        if !self.claim(|s| &mut s.notified_expiring, &booking.id) {
            return;
        }
        // Minutes remaining, rounded up
        let minutes_left = (remaining.num_seconds() + 59) / 60;
        self.emit(BookingAlert::expiring(booking, minutes_left)).await;
    }

    async fn check_expired(&self, booking: &Booking, now: DateTime<Utc>) {
        let Some(end_date) = booking.end_date else { return };
        if booking.trip_started() || booking.status.is_terminal() || now <= end_date {
            return;
        }
        if !self.claim(|s| &mut s.notified_expired, &booking.id) {
            return;
        }
        self.emit(BookingAlert::expired(booking)).await;

        // The reservation lapsed unused: settle the records and release the
        // active slot. The coordinator re-reads the latest record itself.
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.lifecycle.expire(&booking.id).await {
            tracing::warn!("Failed to expire booking {}: {}", booking.id, err);
        }
    }

    async fn emit(&self, alert: BookingAlert) {
        // A tick may still be in flight when stop() lands; its results must
        // not be applied afterwards.
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        tracing::info!("Alert for booking {}: {}", alert.booking_id, alert.title);
        self.sink.raise(alert.clone()).await;

        // Durable mirror is fire-and-forget: failures are logged, never
        // retried and never queued.
        let record =
            NotificationRecord::from_alert(IdGenerator::generate(IdType::Notification), &alert);
        if let Err(err) = self.backend.create_notification(&record).await {
            tracing::warn!("Notification record write failed (not retried): {}", err);
        }
    }
}
