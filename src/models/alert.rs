// src/models/alert.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::booking::Booking;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    Start,
    Expiring { minutes_left: i64 },
    Expired,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Start => "start",
            AlertKind::Expiring { .. } => "expiring",
            AlertKind::Expired => "expired",
        }
    }
}

/// Transient user-facing alert raised by the expiry monitor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingAlert {
    pub booking_id: String,
    pub user_id: String,
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
    pub raised_at: DateTime<Utc>,
}

impl BookingAlert {
    pub fn start(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            kind: AlertKind::Start,
            title: "🛴 Your ride is ready".to_string(),
            body: "Your reservation window has started. Unlock your vehicle to begin.".to_string(),
            raised_at: Utc::now(),
        }
    }

    pub fn expiring(booking: &Booking, minutes_left: i64) -> Self {
        Self {
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            kind: AlertKind::Expiring { minutes_left },
            title: "⏳ Reservation expiring soon".to_string(),
            body: format!("Your reservation expires in {} min. Unlock now to keep it.", minutes_left),
            raised_at: Utc::now(),
        }
    }

    pub fn expired(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            kind: AlertKind::Expired,
            title: "❌ Reservation expired".to_string(),
            body: "Your reservation lapsed unused and has been released.".to_string(),
            raised_at: Utc::now(),
        }
    }
}

/// Durable record mirroring an emitted alert, written fire-and-forget.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub booking_id: String,
    pub kind: AlertKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn from_alert(id: String, alert: &BookingAlert) -> Self {
        Self {
            id,
            user_id: alert.user_id.clone(),
            booking_id: alert.booking_id.clone(),
            kind: alert.kind,
            message: format!("{} {}", alert.title, alert.body),
            created_at: alert.raised_at,
        }
    }
}
