// src/services/sync_queue.rs
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing;
use uuid::Uuid;

use crate::{
    api::BackendApi,
    errors::{SwiftError, SwiftResult},
    models::sync::{
        PendingCounts, ProblemReport, QueuedWrite, RideRating, SyncReport, SyncSummary, WriteKind,
        WritePayload,
    },
    storage::{self, LocalStore, StoreKeys},
};

/// What happened to a dependent write handed to `submit_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered,
    Queued,
}

/// Durable queue for dependent writes (problem reports, ride ratings) that
/// must survive connectivity loss. No backoff and no attempt cap: a failed
/// item stays queued until the next caller-triggered sync (app start,
/// reconnect signal).
pub struct OfflineSyncQueue {
    backend: Arc<dyn BackendApi>,
    store: Arc<dyn LocalStore>,
    problem_reports: Mutex<Vec<QueuedWrite>>,
    ratings: Mutex<Vec<QueuedWrite>>,
}

impl OfflineSyncQueue {
    pub fn new(backend: Arc<dyn BackendApi>, store: Arc<dyn LocalStore>) -> Self {
        let problem_reports = Self::load_queue(store.as_ref(), WriteKind::ProblemReport);
        let ratings = Self::load_queue(store.as_ref(), WriteKind::Rating);

        Self {
            backend,
            store,
            problem_reports: Mutex::new(problem_reports),
            ratings: Mutex::new(ratings),
        }
    }

    fn load_queue(store: &dyn LocalStore, kind: WriteKind) -> Vec<QueuedWrite> {
        match storage::read_json::<Vec<QueuedWrite>>(store, &StoreKeys::sync_queue(kind)) {
            Ok(Some(items)) => {
                if !items.is_empty() {
                    tracing::info!("Restored {} queued {} writes", items.len(), kind);
                }
                items
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("Failed to read {} queue, starting empty: {}", kind, err);
                Vec::new()
            }
        }
    }

    fn queue_for(&self, kind: WriteKind) -> &Mutex<Vec<QueuedWrite>> {
        match kind {
            WriteKind::ProblemReport => &self.problem_reports,
            WriteKind::Rating => &self.ratings,
        }
    }

    fn persist_queue(&self, kind: WriteKind, items: &[QueuedWrite]) -> SwiftResult<()> {
        storage::write_json(self.store.as_ref(), &StoreKeys::sync_queue(kind), &items)
            .map_err(SwiftError::from)
    }

    /// Append a write to its durable queue. Two-phase like the booking store:
    /// persisted first, applied in memory on confirmed write.
    pub fn enqueue(&self, payload: WritePayload) -> SwiftResult<QueuedWrite> {
        let kind = payload.kind();
        let write = QueuedWrite {
            id: Uuid::new_v4().to_string(),
            queued_at: Utc::now(),
            payload,
        };

        let mut queue = self.queue_for(kind).lock().expect("sync queue lock poisoned");
        let mut prospective = queue.clone();
        prospective.push(write.clone());
        self.persist_queue(kind, &prospective)?;

        tracing::info!("Queued {} write {} for later sync", kind, write.id);
        *queue = prospective;
        Ok(write)
    }

    /// File a problem report now if the backend is reachable, otherwise hold
    /// it in the queue instead of surfacing an error to the user.
    pub async fn submit_problem_report(&self, report: ProblemReport) -> SwiftResult<SubmitOutcome> {
        match self.backend.create_problem_report(&report).await {
            Ok(()) => Ok(SubmitOutcome::Delivered),
            Err(err) if err.is_transient() => {
                tracing::warn!("Problem report delivery failed, queueing: {}", err);
                self.enqueue(WritePayload::ProblemReport(report))?;
                Ok(SubmitOutcome::Queued)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn submit_rating(&self, rating: RideRating) -> SwiftResult<SubmitOutcome> {
        match self.backend.create_rating(&rating).await {
            Ok(()) => Ok(SubmitOutcome::Delivered),
            Err(err) if err.is_transient() => {
                tracing::warn!("Rating delivery failed, queueing: {}", err);
                self.enqueue(WritePayload::Rating(rating))?;
                Ok(SubmitOutcome::Queued)
            }
            Err(err) => Err(err),
        }
    }

    async fn attempt(&self, write: &QueuedWrite) -> SwiftResult<()> {
        match &write.payload {
            WritePayload::ProblemReport(report) => self.backend.create_problem_report(report).await,
            WritePayload::Rating(rating) => self.backend.create_rating(rating).await,
        }
    }

    /// Drain one queue as far as the backend allows. Works on the snapshot
    /// taken at call time; items enqueued during the pass are untouched.
    pub async fn sync_kind(&self, kind: WriteKind) -> SyncReport {
        let snapshot: Vec<QueuedWrite> = {
            let queue = self.queue_for(kind).lock().expect("sync queue lock poisoned");
            queue.clone()
        };

        if snapshot.is_empty() {
            return SyncReport::default();
        }
        tracing::info!("Syncing {} queued {} writes", snapshot.len(), kind);

        let mut delivered: Vec<String> = Vec::new();
        let mut failed = 0usize;
        for write in &snapshot {
            match self.attempt(write).await {
                Ok(()) => delivered.push(write.id.clone()),
                Err(err) => {
                    failed += 1;
                    tracing::debug!("Write {} still undeliverable: {}", write.id, err);
                }
            }
        }

        let mut queue = self.queue_for(kind).lock().expect("sync queue lock poisoned");
        queue.retain(|w| !delivered.contains(&w.id));
        if let Err(err) = self.persist_queue(kind, &queue) {
            tracing::error!("Failed to persist {} queue residual: {}", kind, err);
        }

        SyncReport { synced: delivered.len(), failed }
    }

    /// Sync both queues concurrently. Never fails: every error is captured
    /// per item and reflected in the counts.
    pub async fn sync_all(&self) -> SyncSummary {
        let (problem_reports, ratings) = futures::future::join(
            self.sync_kind(WriteKind::ProblemReport),
            self.sync_kind(WriteKind::Rating),
        )
        .await;

        let summary = SyncSummary { problem_reports, ratings };
        tracing::info!(
            "Offline sync finished: {}/{} reports, {}/{} ratings delivered",
            summary.problem_reports.synced,
            summary.problem_reports.synced + summary.problem_reports.failed,
            summary.ratings.synced,
            summary.ratings.synced + summary.ratings.failed,
        );
        summary
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            problem_reports: self.problem_reports.lock().expect("sync queue lock poisoned").len(),
            ratings: self.ratings.lock().expect("sync queue lock poisoned").len(),
        }
    }
}
