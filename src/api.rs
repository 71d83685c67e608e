// src/api.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing;

use crate::{
    errors::{SwiftError, SwiftResult},
    models::{
        alert::NotificationRecord,
        booking::{Booking, BookingUpdate},
        sync::{ProblemReport, RideRating},
        trip::{StationLocation, Vehicle},
        unlock::{UnlockRequest, UnlockRequestUpdate},
    },
};

/// REST backend consumed by the booking core. Base URL and auth live in the
/// HTTP implementation; callers only see typed records.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_bookings(&self, user_id: &str) -> SwiftResult<Vec<Booking>>;
    async fn create_booking(&self, booking: &Booking) -> SwiftResult<Booking>;
    async fn update_booking(&self, booking_id: &str, update: &BookingUpdate) -> SwiftResult<Booking>;

    async fn create_unlock_request(&self, request: &UnlockRequest) -> SwiftResult<UnlockRequest>;
    async fn update_unlock_request(
        &self,
        request_id: &str,
        update: &UnlockRequestUpdate,
    ) -> SwiftResult<UnlockRequest>;

    async fn get_vehicle(&self, vehicle_id: &str) -> SwiftResult<Option<Vehicle>>;
    async fn get_location(&self, location_id: &str) -> SwiftResult<Option<StationLocation>>;

    async fn create_notification(&self, record: &NotificationRecord) -> SwiftResult<()>;
    async fn create_problem_report(&self, report: &ProblemReport) -> SwiftResult<()>;
    async fn create_rating(&self, rating: &RideRating) -> SwiftResult<()>;
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SwiftResult<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::parse_response(response).await
    }

    async fn patch_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SwiftResult<T> {
        let response = self.client.patch(self.url(path)).json(body).send().await?;
        Self::parse_response(response).await
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> SwiftResult<Option<T>> {
        let response = self.client.get(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> SwiftResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Backend request failed ({}): {}", status, body);
            return Err(SwiftError::BackendRejected { status: status.as_u16(), message: body });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_bookings(&self, user_id: &str) -> SwiftResult<Vec<Booking>> {
        tracing::debug!("Listing bookings for user: {}", user_id);
        let response = self
            .client
            .get(self.url("bookings"))
            .query(&[("userId", user_id)])
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn create_booking(&self, booking: &Booking) -> SwiftResult<Booking> {
        self.post_json("bookings", booking).await
    }

    async fn update_booking(
        &self,
        booking_id: &str,
        update: &BookingUpdate,
    ) -> SwiftResult<Booking> {
        self.patch_json(&format!("bookings/{}", booking_id), update).await
    }

    async fn create_unlock_request(&self, request: &UnlockRequest) -> SwiftResult<UnlockRequest> {
        self.post_json("unlockRequests", request).await
    }

    async fn update_unlock_request(
        &self,
        request_id: &str,
        update: &UnlockRequestUpdate,
    ) -> SwiftResult<UnlockRequest> {
        self.patch_json(&format!("unlockRequests/{}", request_id), update).await
    }

    async fn get_vehicle(&self, vehicle_id: &str) -> SwiftResult<Option<Vehicle>> {
        self.get_optional(&format!("vehicles/{}", vehicle_id)).await
    }

    async fn get_location(&self, location_id: &str) -> SwiftResult<Option<StationLocation>> {
        self.get_optional(&format!("locations/{}", location_id)).await
    }

    async fn create_notification(&self, record: &NotificationRecord) -> SwiftResult<()> {
        let _: serde_json::Value = self.post_json("notifications", record).await?;
        Ok(())
    }

    async fn create_problem_report(&self, report: &ProblemReport) -> SwiftResult<()> {
        let _: serde_json::Value = self.post_json("problemReports", report).await?;
        Ok(())
    }

    async fn create_rating(&self, rating: &RideRating) -> SwiftResult<()> {
        let _: serde_json::Value = self.post_json("ratings", rating).await?;
        Ok(())
    }
}

// Mock backend for development and testing
#[derive(Default)]
pub struct MockBackend {
    pub bookings: Mutex<Vec<Booking>>,
    pub unlock_requests: Mutex<Vec<UnlockRequest>>,
    pub vehicles: Mutex<HashMap<String, Vehicle>>,
    pub stations: Mutex<HashMap<String, StationLocation>>,
    pub notifications: Mutex<Vec<NotificationRecord>>,
    pub problem_reports: Mutex<Vec<ProblemReport>>,
    pub ratings: Mutex<Vec<RideRating>>,

    offline: AtomicBool,
    fail_problem_reports: AtomicBool,
    fail_ratings: AtomicBool,
    fail_next_ratings: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate total connectivity loss: every call fails transiently.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_fail_problem_reports(&self, fail: bool) {
        self.fail_problem_reports.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ratings(&self, fail: bool) {
        self.fail_ratings.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `n` rating writes, then recover.
    pub fn set_fail_next_ratings(&self, n: usize) {
        self.fail_next_ratings.store(n, Ordering::SeqCst);
    }

    /// Number of mutating calls that reached the backend.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.lock().expect("mock lock poisoned").insert(vehicle.id.clone(), vehicle);
    }

    pub fn insert_station(&self, station: StationLocation) {
        self.stations.lock().expect("mock lock poisoned").insert(station.id.clone(), station);
    }

    pub fn seed_booking(&self, booking: Booking) {
        self.bookings.lock().expect("mock lock poisoned").push(booking);
    }

    fn check_online(&self) -> SwiftResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SwiftError::NetworkConnection("backend unreachable".to_string()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn list_bookings(&self, user_id: &str) -> SwiftResult<Vec<Booking>> {
        self.check_online()?;
        let bookings = self.bookings.lock().expect("mock lock poisoned");
        Ok(bookings.iter().filter(|b| b.user_id == user_id).cloned().collect())
    }

    async fn create_booking(&self, booking: &Booking) -> SwiftResult<Booking> {
        self.check_online()?;
        self.record_write();
        let mut bookings = self.bookings.lock().expect("mock lock poisoned");
        bookings.push(booking.clone());
        Ok(booking.clone())
    }

    async fn update_booking(
        &self,
        booking_id: &str,
        update: &BookingUpdate,
    ) -> SwiftResult<Booking> {
        self.check_online()?;
        self.record_write();
        let mut bookings = self.bookings.lock().expect("mock lock poisoned");
        let booking = bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| SwiftError::booking_not_found(booking_id))?;
        update.apply(booking);
        Ok(booking.clone())
    }

    async fn create_unlock_request(&self, request: &UnlockRequest) -> SwiftResult<UnlockRequest> {
        self.check_online()?;
        self.record_write();
        let mut requests = self.unlock_requests.lock().expect("mock lock poisoned");
        requests.push(request.clone());
        Ok(request.clone())
    }

    async fn update_unlock_request(
        &self,
        request_id: &str,
        update: &UnlockRequestUpdate,
    ) -> SwiftResult<UnlockRequest> {
        self.check_online()?;
        self.record_write();
        let mut requests = self.unlock_requests.lock().expect("mock lock poisoned");
        let request = requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or_else(|| SwiftError::unlock_request_not_found(request_id))?;
        update.apply(request);
        Ok(request.clone())
    }

    async fn get_vehicle(&self, vehicle_id: &str) -> SwiftResult<Option<Vehicle>> {
        self.check_online()?;
        let vehicles = self.vehicles.lock().expect("mock lock poisoned");
        Ok(vehicles.get(vehicle_id).cloned())
    }

    async fn get_location(&self, location_id: &str) -> SwiftResult<Option<StationLocation>> {
        self.check_online()?;
        let stations = self.stations.lock().expect("mock lock poisoned");
        Ok(stations.get(location_id).cloned())
    }

    async fn create_notification(&self, record: &NotificationRecord) -> SwiftResult<()> {
        self.check_online()?;
        self.record_write();
        tracing::info!("[MOCK] Notification for booking {}: {}", record.booking_id, record.message);
        self.notifications.lock().expect("mock lock poisoned").push(record.clone());
        Ok(())
    }

    async fn create_problem_report(&self, report: &ProblemReport) -> SwiftResult<()> {
        self.check_online()?;
        if self.fail_problem_reports.load(Ordering::SeqCst) {
            return Err(SwiftError::NetworkConnection("report endpoint unreachable".to_string()));
        }
        self.record_write();
        self.problem_reports.lock().expect("mock lock poisoned").push(report.clone());
        Ok(())
    }

    async fn create_rating(&self, rating: &RideRating) -> SwiftResult<()> {
        self.check_online()?;
        if self.fail_ratings.load(Ordering::SeqCst) {
            return Err(SwiftError::NetworkConnection("rating endpoint unreachable".to_string()));
        }
        let remaining = self.fail_next_ratings.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_ratings.store(remaining - 1, Ordering::SeqCst);
            return Err(SwiftError::NetworkConnection("rating endpoint unreachable".to_string()));
        }
        self.record_write();
        self.ratings.lock().expect("mock lock poisoned").push(rating.clone());
        Ok(())
    }
}
