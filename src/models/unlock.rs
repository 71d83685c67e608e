// src/models/unlock.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnlockStatus {
    Pending,
    Unlocked,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnlockMethod {
    Manual,
    QrCode,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One attempt to physically unlock a reserved vehicle. Owned by exactly one
/// booking; at most one request per booking may be pending at a time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnlockRequest {
    pub id: String,
    pub user_id: String,
    pub vehicle_id: String,
    pub booking_id: String,

    pub requested_at: DateTime<Utc>,
    pub scheduled_unlock_time: DateTime<Utc>,
    pub actual_unlock_time: Option<DateTime<Utc>>,

    pub status: UnlockStatus,
    pub method: UnlockMethod,
    pub location: GeoPoint,
    pub unlock_code: String,
    pub attempts: u32,
    pub error_message: Option<String>,
}

/// Partial update sent to the backend when an attempt resolves.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UnlockRequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UnlockStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_unlock_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UnlockRequestUpdate {
    pub fn apply(&self, request: &mut UnlockRequest) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(unlock_time) = self.actual_unlock_time {
            request.actual_unlock_time = Some(unlock_time);
        }
        if let Some(attempts) = self.attempts {
            request.attempts = attempts;
        }
        if let Some(message) = &self.error_message {
            request.error_message = Some(message.clone());
        }
    }
}

impl UnlockRequest {
    pub fn is_pending(&self) -> bool {
        self.status == UnlockStatus::Pending
    }

    pub fn is_unlocked(&self) -> bool {
        self.status == UnlockStatus::Unlocked
    }
}
