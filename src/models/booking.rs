// src/models/booking.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Draft,     // Being assembled in the UI, not yet submitted
    Pending,   // Reservation submitted, vehicle held
    Confirmed, // Unlock sub-flow recorded success
    Active,    // Trip session running
    Completed, // Trip finished
    Cancelled, // Cancelled or lapsed unused
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses a booking may hold while it still counts as "the" current one.
    pub fn is_open(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Draft => "draft",
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Tracks whether the physical unlock has happened, independent of the
/// administrative `BookingStatus`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Wallet,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub vehicle_id: String,
    pub start_location_id: String,
    pub end_location_id: String,

    // Timing information
    pub reserved_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    // Set only when the vehicle is physically unlocked
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,

    pub status: BookingStatus,
    pub activation_status: Option<ActivationStatus>,
    pub is_activated: bool,
    pub activated_at: Option<DateTime<Utc>>,

    // Pricing information
    pub total_cost: f64,
    pub discount: f64,
    pub final_cost: f64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,

    // Post-trip metrics
    pub distance_km: Option<f64>,
    pub duration_min: Option<i64>,
    pub average_speed_kmh: Option<f64>,
    pub rating: Option<f32>,
    pub issues: Vec<String>,

    pub updated_at: DateTime<Utc>,
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingRequest {
    pub user_id: String,
    pub vehicle_id: String,
    pub start_location_id: String,
    pub end_location_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    pub total_cost: f64,
    pub discount: f64,
}

/// Partial update merged into an existing record; `None` fields are left alone.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BookingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_status: Option<ActivationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_activated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
}

impl BookingUpdate {
    pub fn status(status: BookingStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    /// Merge this patch into an existing record. `updated_at` is stamped by
    /// the caller so store and backend agree on the write time.
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(end_date) = self.end_date {
            booking.end_date = Some(end_date);
        }
        if let Some(actual_start) = self.actual_start_date {
            booking.actual_start_date = Some(actual_start);
        }
        if let Some(actual_end) = self.actual_end_date {
            booking.actual_end_date = Some(actual_end);
        }
        if let Some(activation) = self.activation_status {
            booking.activation_status = Some(activation);
        }
        if let Some(is_activated) = self.is_activated {
            booking.is_activated = is_activated;
        }
        if let Some(activated_at) = self.activated_at {
            booking.activated_at = Some(activated_at);
        }
        if let Some(payment_status) = self.payment_status {
            booking.payment_status = payment_status;
        }
        if let Some(distance_km) = self.distance_km {
            booking.distance_km = Some(distance_km);
        }
        if let Some(duration_min) = self.duration_min {
            booking.duration_min = Some(duration_min);
        }
        if let Some(speed) = self.average_speed_kmh {
            booking.average_speed_kmh = Some(speed);
        }
        if let Some(rating) = self.rating {
            booking.rating = Some(rating);
        }
        if let Some(issues) = &self.issues {
            booking.issues = issues.clone();
        }
        booking.updated_at = Utc::now();
    }
}

// Helper implementations
impl Booking {
    pub fn from_request(request: BookingRequest, start_date: DateTime<Utc>) -> Self {
        let final_cost = request.total_cost - request.discount;

        Self {
            id: String::new(), // Set by with_generated_id
            user_id: request.user_id,
            vehicle_id: request.vehicle_id,
            start_location_id: request.start_location_id,
            end_location_id: request.end_location_id,
            reserved_at: Utc::now(),
            start_date,
            end_date: request.end_date,
            actual_start_date: None,
            actual_end_date: None,
            status: BookingStatus::Pending,
            activation_status: Some(ActivationStatus::Scheduled),
            is_activated: false,
            activated_at: None,
            total_cost: request.total_cost,
            discount: request.discount,
            final_cost,
            payment_method: request.payment_method,
            payment_status: PaymentStatus::Pending,
            distance_km: None,
            duration_min: None,
            average_speed_kmh: None,
            rating: None,
            issues: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// The physical unlock has happened and the vehicle is (or was) in use.
    pub fn trip_started(&self) -> bool {
        self.actual_start_date.is_some()
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(self.status, BookingStatus::Active) && !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> BookingRequest {
        BookingRequest {
            user_id: "usr-250801-a1b2c".to_string(),
            vehicle_id: "veh-250801-d3e4f".to_string(),
            start_location_id: "stn-250801-g5h6i".to_string(),
            end_location_id: "stn-250801-j7k8l".to_string(),
            start_date: Some(Utc::now()),
            end_date: None,
            payment_method: PaymentMethod::Card,
            total_cost: 12.0,
            discount: 2.0,
        }
    }

    #[test]
    fn test_from_request_defaults() {
        let request = sample_request();
        let start = request.start_date.unwrap();
        let booking = Booking::from_request(request, start);

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.activation_status, Some(ActivationStatus::Scheduled));
        assert!(!booking.is_activated);
        assert!(booking.actual_start_date.is_none());
        assert_eq!(booking.final_cost, 10.0);
    }

    #[test]
    fn test_update_apply_merges_only_set_fields() {
        let request = sample_request();
        let start = request.start_date.unwrap();
        let mut booking = Booking::from_request(request, start);
        let reserved_at = booking.reserved_at;

        let update = BookingUpdate {
            status: Some(BookingStatus::Confirmed),
            rating: Some(4.5),
            ..Default::default()
        };
        update.apply(&mut booking);

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.rating, Some(4.5));
        assert_eq!(booking.reserved_at, reserved_at);
        assert!(booking.end_date.is_none());
    }

    #[test]
    fn test_status_predicates() {
        assert!(BookingStatus::Pending.is_open());
        assert!(BookingStatus::Confirmed.is_open());
        assert!(!BookingStatus::Active.is_open());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&BookingStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
