//! The job reaper: periodic reclamation of stale state.
//!
//! Four independent sweeps, each an idempotent set of single-record updates,
//! so concurrent or back-to-back runs converge on the same terminal state.
//! Blob deletion is restricted to the disposable key namespaces.

use crate::error::SchedulerError;
use chrono::{Duration as ChronoDuration, Utc};
use imprint_traits::{key_is_deletable, BlobStore, JobUpdate, MetadataStore};
use imprint_types::{AuditEntry, AuditEvent, JobStatus, PrintJob};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReaperOptions {
    /// RUNNING jobs untouched this long are declared stale.
    pub stale_after: Duration,
    /// FAILED jobs older than this get archived to EXPIRED.
    pub failed_retention: Duration,
}

impl Default for ReaperOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(15 * 60),
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Counts of records touched by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaperReport {
    pub running_output_expired: usize,
    pub running_stale: usize,
    pub done_output_expired: usize,
    pub failed_archived: usize,
}

pub struct Reaper {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    options: ReaperOptions,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        options: ReaperOptions,
    ) -> Self {
        Self { store, blobs, options }
    }

    /// One full sweep. Reentrant: individual updates are independent.
    pub async fn run_once(&self) -> Result<ReaperReport, SchedulerError> {
        let now = Utc::now();
        let mut report = ReaperReport::default();

        // 1. RUNNING with a materialized output past its expiry.
        for job in self.store.running_jobs_with_expired_output(now).await? {
            self.delete_output_blob(&job).await;
            self.store
                .update_job(
                    &job.id,
                    JobUpdate::status(JobStatus::Expired)
                        .clearing_output()
                        .with_audit(AuditEntry::new(
                            AuditEvent::RunningJobExpiredAndOutputDeleted,
                            serde_json::Value::Null,
                        )),
                )
                .await?;
            report.running_output_expired += 1;
        }

        // 2. RUNNING with no output and no update since the staleness cutoff.
        let stale_cutoff = now
            - ChronoDuration::milliseconds(self.options.stale_after.as_millis() as i64);
        for job in self.store.running_jobs_stale_since(stale_cutoff).await? {
            self.store
                .update_job(
                    &job.id,
                    JobUpdate::status(JobStatus::Expired).with_audit(AuditEntry::new(
                        AuditEvent::JobExpired,
                        serde_json::json!({ "reason": "stale" }),
                    )),
                )
                .await?;
            report.running_stale += 1;
        }

        // 3. DONE past its output expiry.
        for job in self.store.done_jobs_with_expired_output(now).await? {
            self.delete_output_blob(&job).await;
            self.store
                .update_job(
                    &job.id,
                    JobUpdate::status(JobStatus::Expired)
                        .clearing_output()
                        .with_audit(AuditEntry::new(
                            AuditEvent::JobExpired,
                            serde_json::json!({ "reason": "output-expired" }),
                        )),
                )
                .await?;
            report.done_output_expired += 1;
        }

        // 4. FAILED older than the retention window.
        let failed_cutoff = now
            - ChronoDuration::milliseconds(self.options.failed_retention.as_millis() as i64);
        for job in self.store.failed_jobs_older_than(failed_cutoff).await? {
            self.store
                .update_job(
                    &job.id,
                    JobUpdate::status(JobStatus::Expired).with_audit(AuditEntry::new(
                        AuditEvent::JobExpired,
                        serde_json::json!({ "reason": "archived-failure" }),
                    )),
                )
                .await?;
            report.failed_archived += 1;
        }

        if report != ReaperReport::default() {
            info!(
                "[REAPER] swept: {} running-output, {} stale, {} done-output, {} archived",
                report.running_output_expired,
                report.running_stale,
                report.done_output_expired,
                report.failed_archived
            );
        }
        Ok(report)
    }

    /// Runs forever at the given interval. Errors are logged, never fatal.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("[REAPER] sweep failed: {e}");
            }
        }
    }

    /// Best-effort deletion behind the namespace guard.
    async fn delete_output_blob(&self, job: &PrintJob) {
        let Some(key) = job.output.key.as_deref() else {
            return;
        };
        if !key_is_deletable(key) {
            warn!("[REAPER] refusing to delete non-disposable key {key} (job {})", job.id);
            return;
        }
        if let Err(e) = self.blobs.delete(key).await {
            warn!("[REAPER] blob delete failed for {key} (job {}): {e}", job.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_traits::{BlobStore as _, InMemoryBlobStore, InMemoryMetadataStore, MetadataStore as _};
    use imprint_types::{JobOutput, PrintJob, VectorMetadata};

    fn metadata() -> VectorMetadata {
        serde_json::from_value(serde_json::json!({
            "sourcePdfKey": "documents/original/src.pdf",
            "ticketCrop": {
                "pageIndex": 0, "xRatio": 0.0, "yRatio": 0.0,
                "widthRatio": 1.0, "heightRatio": 1.0
            },
            "layout": { "pageSize": "A4", "totalPages": 2, "repeatPerPage": 1 }
        }))
        .unwrap()
    }

    async fn seed_job(store: &InMemoryMetadataStore, id: &str, status: JobStatus) {
        let mut job = PrintJob::new(id, "admin", metadata(), "mac");
        job.status = status;
        store.insert_job(job).await.unwrap();
    }

    fn reaper(store: &Arc<InMemoryMetadataStore>, blobs: &Arc<InMemoryBlobStore>) -> Reaper {
        Reaper::new(
            Arc::clone(store) as Arc<dyn MetadataStore>,
            Arc::clone(blobs) as Arc<dyn BlobStore>,
            ReaperOptions::default(),
        )
    }

    #[tokio::test]
    async fn expired_done_output_is_deleted_and_job_expired() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let key = "documents/final/j1.pdf";
        blobs.put(key, b"%PDF-1.7".to_vec()).await.unwrap();

        seed_job(&store, "j1", JobStatus::Done).await;
        store.mutate_job_raw("j1", |job| {
            job.output = JobOutput {
                key: Some(key.to_string()),
                url: None,
                expires_at: Some(Utc::now() - ChronoDuration::seconds(1)),
            };
        });

        let report = reaper(&store, &blobs).run_once().await.unwrap();
        assert_eq!(report.done_output_expired, 1);
        assert!(!blobs.exists(key).await);

        let job = store.load_job("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Expired);
        assert!(job.output.key.is_none());
    }

    #[tokio::test]
    async fn stale_running_job_is_expired_without_blob_action() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());

        seed_job(&store, "j2", JobStatus::Running).await;
        store.mutate_job_raw("j2", |job| {
            job.updated_at = Utc::now() - ChronoDuration::minutes(16);
        });

        let report = reaper(&store, &blobs).run_once().await.unwrap();
        assert_eq!(report.running_stale, 1);
        assert_eq!(store.load_job("j2").await.unwrap().unwrap().status, JobStatus::Expired);
    }

    #[tokio::test]
    async fn non_disposable_keys_survive_the_sweep() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let key = "documents/original/src.pdf";
        blobs.put(key, b"%PDF-1.7".to_vec()).await.unwrap();

        seed_job(&store, "j3", JobStatus::Done).await;
        store.mutate_job_raw("j3", |job| {
            job.output = JobOutput {
                key: Some(key.to_string()),
                url: None,
                expires_at: Some(Utc::now() - ChronoDuration::seconds(1)),
            };
        });

        reaper(&store, &blobs).run_once().await.unwrap();
        // Job still transitions, the immutable source is untouched.
        assert!(blobs.exists(key).await);
        assert_eq!(store.load_job("j3").await.unwrap().unwrap().status, JobStatus::Expired);
    }

    #[tokio::test]
    async fn old_failures_are_archived() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());

        seed_job(&store, "j4", JobStatus::Failed).await;
        store.mutate_job_raw("j4", |job| {
            job.updated_at = Utc::now() - ChronoDuration::days(8);
        });
        seed_job(&store, "j5", JobStatus::Failed).await; // recent, stays

        let report = reaper(&store, &blobs).run_once().await.unwrap();
        assert_eq!(report.failed_archived, 1);
        assert_eq!(store.load_job("j4").await.unwrap().unwrap().status, JobStatus::Expired);
        assert_eq!(store.load_job("j5").await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn reaper_is_idempotent() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());

        seed_job(&store, "j6", JobStatus::Running).await;
        store.mutate_job_raw("j6", |job| {
            job.updated_at = Utc::now() - ChronoDuration::minutes(20);
        });

        let reaper = reaper(&store, &blobs);
        let first = reaper.run_once().await.unwrap();
        assert_eq!(first.running_stale, 1);
        let second = reaper.run_once().await.unwrap();
        assert_eq!(second, ReaperReport::default());
    }
}
