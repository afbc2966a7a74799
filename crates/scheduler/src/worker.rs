//! The render worker: holds the collaborator handles and implements the
//! queue's batch and merge steps (split across `batch.rs` and `merge.rs`).

use crate::error::SchedulerError;
use crate::lock::RenderLock;
use crate::queue::{BatchPayload, FlowProcessor, MergePayload};
use crate::queue::{BatchOutcome, MergeOutcome};
use async_trait::async_trait;
use chrono::Utc;
use imprint_layout::VectorLayoutEngine;
use imprint_traits::{BlobStore, MetadataStore, SharedBlob};
use imprint_types::{AuditEntry, AuditEvent, JobErrorInfo, JobStatus, PrintJob};
use imprint_traits::JobUpdate;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

/// Scheduler knobs, already validated by the service configuration layer.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Pages per batch child (capped at 50 upstream).
    pub batch_size: u32,
    /// Lifetime of the final artifact and its signed URL.
    pub final_pdf_ttl: Duration,
    /// Wall-clock budget for the merge step; `None` disables the deadline.
    pub max_merge: Option<Duration>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            final_pdf_ttl: Duration::from_secs(24 * 60 * 60),
            max_merge: None,
        }
    }
}

pub struct RenderWorker {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) lock: RenderLock,
    pub(crate) engine: Arc<VectorLayoutEngine>,
    pub(crate) mac_secret: Vec<u8>,
    pub(crate) options: RenderOptions,
}

impl RenderWorker {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        lock: RenderLock,
        engine: Arc<VectorLayoutEngine>,
        mac_secret: Vec<u8>,
        options: RenderOptions,
    ) -> Self {
        Self { store, blobs, lock, engine, mac_secret, options }
    }

    /// Loads a job or reports it missing.
    pub(crate) async fn load_job(&self, job_id: &str) -> Result<PrintJob, SchedulerError> {
        self.store
            .load_job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }

    /// Resolves the metadata's source reference to bytes: either a direct
    /// blob key or `document:{id}` via the metadata store.
    pub(crate) async fn fetch_source(&self, source_key: &str) -> Result<SharedBlob, SchedulerError> {
        let blob_key = match source_key.strip_prefix("document:") {
            Some(document_id) => {
                let document = self
                    .store
                    .find_document(document_id)
                    .await?
                    .ok_or_else(|| SchedulerError::JobNotFound(format!("document:{document_id}")))?;
                document.blob_key
            }
            None => source_key.to_string(),
        };
        Ok(self.blobs.get(&blob_key).await?)
    }

    /// Terminalizes a job as FAILED and releases the render lock. The lock
    /// release is unconditional regardless of which phase failed.
    pub(crate) async fn fail_job(
        &self,
        job_id: &str,
        document_id: &str,
        job_name: &str,
        queue_job_id: &str,
        failure: &SchedulerError,
    ) {
        error!("[WORKER] {job_name} {queue_job_id} failed for job {job_id}: {failure}");
        let update = JobUpdate::status(JobStatus::Failed)
            .with_error(JobErrorInfo {
                message: failure.to_string(),
                stack: format!("{failure:?}"),
            })
            .with_audit(AuditEntry::new(
                AuditEvent::JobFailed,
                serde_json::json!({
                    "queueJobId": queue_job_id,
                    "jobName": job_name,
                    "at": Utc::now().to_rfc3339(),
                }),
            ));
        if let Err(e) = self.store.update_job(job_id, update).await {
            error!("[WORKER] could not terminalize job {job_id}: {e}");
        }
        self.lock.release(document_id, job_id).await;
    }
}

#[async_trait]
impl FlowProcessor for RenderWorker {
    async fn process_batch(&self, payload: &BatchPayload)
        -> Result<BatchOutcome, SchedulerError> {
        self.render_batch(payload).await
    }

    async fn process_merge(
        &self,
        payload: &MergePayload,
        children: Vec<BatchOutcome>,
    ) -> Result<MergeOutcome, SchedulerError> {
        self.merge_job(payload, children).await
    }

    async fn batch_failed(
        &self,
        payload: &BatchPayload,
        queue_job_id: &str,
        error: &SchedulerError,
    ) {
        info!(
            "[BATCH] final failure for job {} (document {}) pages {}..{}",
            payload.print_job_id, payload.document_id, payload.start_page, payload.end_page
        );
        self.fail_job(
            &payload.print_job_id,
            &payload.document_id,
            "batch",
            queue_job_id,
            error,
        )
        .await;
    }

    async fn merge_failed(
        &self,
        payload: &MergePayload,
        queue_job_id: &str,
        error: &SchedulerError,
    ) {
        self.fail_job(
            &payload.print_job_id,
            &payload.document_id,
            "merge",
            queue_job_id,
            error,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{BatchPayload, MergePayload, RenderedPage};
    use imprint_traits::{InMemoryBlobStore, InMemoryKvCache, InMemoryMetadataStore};
    use imprint_types::{metadata_mac, VectorMetadata};

    const SECRET: &[u8] = b"worker-test-secret";

    fn metadata(total_pages: u32) -> VectorMetadata {
        serde_json::from_value(serde_json::json!({
            "sourcePdfKey": "documents/original/src.pdf",
            "ticketCrop": {
                "pageIndex": 0, "xRatio": 0.0, "yRatio": 0.0,
                "widthRatio": 1.0, "heightRatio": 1.0
            },
            "layout": { "pageSize": "A4", "totalPages": total_pages, "repeatPerPage": 1 }
        }))
        .unwrap()
    }

    fn worker(store: Arc<InMemoryMetadataStore>) -> RenderWorker {
        let kv = Arc::new(InMemoryKvCache::new());
        RenderWorker::new(
            store,
            Arc::new(InMemoryBlobStore::new()),
            RenderLock::new(kv, Duration::from_secs(60), 0),
            Arc::new(VectorLayoutEngine::new(Arc::new(imprint_traits::MissingConverter))),
            SECRET.to_vec(),
            RenderOptions::default(),
        )
    }

    async fn seed_job(store: &InMemoryMetadataStore, id: &str, total_pages: u32, status: JobStatus) {
        let meta = metadata(total_pages);
        let mac = metadata_mac(SECRET, &meta).unwrap();
        let mut job = PrintJob::new(id, "admin", meta, mac);
        job.status = status;
        store.insert_job(job).await.unwrap();
    }

    fn batch_payload(job_id: &str, start: u32, end: u32, total: u32) -> BatchPayload {
        BatchPayload {
            print_job_id: job_id.into(),
            document_id: "documents/original/src.pdf".into(),
            start_page: start,
            end_page: end,
            total_pages: total,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_job_batches_skip_without_side_effects() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed_job(&store, "j1", 2, JobStatus::Expired).await;
        let worker = worker(Arc::clone(&store));

        let outcome = worker
            .render_batch(&batch_payload("j1", 0, 2, 2))
            .await
            .unwrap();
        assert_eq!(outcome, crate::queue::BatchOutcome::skipped());

        let job = store.load_job("j1").await.unwrap().unwrap();
        assert_eq!(job.rendered_pages, 0);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_job_merges_skip_too() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed_job(&store, "j2", 1, JobStatus::Expired).await;
        let worker = worker(Arc::clone(&store));

        let outcome = worker
            .merge_job(
                &MergePayload {
                    print_job_id: "j2".into(),
                    document_id: "d".into(),
                },
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(outcome, crate::queue::MergeOutcome::Skipped { skipped: true });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mac_mismatch_is_fatal_for_the_batch() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed_job(&store, "j3", 1, JobStatus::Pending).await;
        store.mutate_job_raw("j3", |job| {
            job.payload_mac = "0".repeat(64);
        });
        let worker = worker(Arc::clone(&store));
        // The source blob is present so the failure is attributable to the MAC.
        worker.blobs.put("documents/original/src.pdf", b"%PDF-1.7\n".to_vec()).await.unwrap();

        let err = worker
            .render_batch(&batch_payload("j3", 0, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MacMismatch(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_rejects_missing_and_duplicate_pages() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed_job(&store, "j4", 3, JobStatus::Running).await;
        let worker = worker(Arc::clone(&store));
        let payload = MergePayload { print_job_id: "j4".into(), document_id: "d".into() };

        // Page 1 of 3 never arrived.
        let err = worker
            .merge_job(
                &payload,
                vec![crate::queue::BatchOutcome::Pages {
                    pages: vec![
                        RenderedPage { page_index: 0, pdf_base64: String::new() },
                        RenderedPage { page_index: 2, pdf_base64: String::new() },
                    ],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingPages(missing) if missing == vec![1]));

        // Page 0 arrived twice.
        let err = worker
            .merge_job(
                &payload,
                vec![crate::queue::BatchOutcome::Pages {
                    pages: vec![
                        RenderedPage { page_index: 0, pdf_base64: String::new() },
                        RenderedPage { page_index: 0, pdf_base64: String::new() },
                    ],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicatePage(0)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_deadline_of_zero_fails_deterministically() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed_job(&store, "j5", 1, JobStatus::Running).await;
        let kv = Arc::new(InMemoryKvCache::new());
        let worker = RenderWorker::new(
            Arc::clone(&store) as Arc<dyn MetadataStore>,
            Arc::new(InMemoryBlobStore::new()),
            RenderLock::new(kv, Duration::from_secs(60), 0),
            Arc::new(VectorLayoutEngine::new(Arc::new(imprint_traits::MissingConverter))),
            SECRET.to_vec(),
            RenderOptions { max_merge: Some(Duration::ZERO), ..RenderOptions::default() },
        );

        let err = worker
            .merge_job(
                &MergePayload { print_job_id: "j5".into(), document_id: "d".into() },
                vec![crate::queue::BatchOutcome::Pages {
                    pages: vec![RenderedPage { page_index: 0, pdf_base64: String::new() }],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TimeBudgetExceeded(0)));
    }
}
