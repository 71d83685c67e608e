// src/models/sync.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-text defect report filed against a vehicle during or after a trip.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProblemReport {
    pub user_id: String,
    pub booking_id: String,
    pub vehicle_id: String,
    pub description: String,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RideRating {
    pub user_id: String,
    pub booking_id: String,
    pub stars: f32,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    ProblemReport,
    Rating,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::ProblemReport => write!(f, "problem_report"),
            WriteKind::Rating => write!(f, "rating"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WritePayload {
    ProblemReport(ProblemReport),
    Rating(RideRating),
}

impl WritePayload {
    pub fn kind(&self) -> WriteKind {
        match self {
            WritePayload::ProblemReport(_) => WriteKind::ProblemReport,
            WritePayload::Rating(_) => WriteKind::Rating,
        }
    }
}

/// A dependent write held durably until the backend accepts it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QueuedWrite {
    pub id: String,
    pub queued_at: DateTime<Utc>,
    pub payload: WritePayload,
}

/// Outcome of one sync pass over one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub problem_reports: SyncReport,
    pub ratings: SyncReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub problem_reports: usize,
    pub ratings: usize,
}
