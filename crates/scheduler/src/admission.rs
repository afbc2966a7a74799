//! Admission: validate, lock, persist, enqueue.

use crate::error::SchedulerError;
use crate::lock::{LockOutcome, RenderLock};
use crate::queue::{FlowQueue, RenderFlowSpec};
use imprint_traits::MetadataStore;
use imprint_types::{
    metadata_mac, AuditEntry, AuditEvent, EnqueueLimits, PrintJob, VectorMetadata,
};
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// The result of a successful admission call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionOutcome {
    /// The effective job id: the new job, or the current holder when the
    /// document is already being rendered.
    pub job_id: String,
    /// `false` when an existing pending job was returned instead.
    pub accepted: bool,
}

pub struct Admission {
    store: Arc<dyn MetadataStore>,
    queue: Arc<dyn FlowQueue>,
    lock: RenderLock,
    mac_secret: Vec<u8>,
    limits: EnqueueLimits,
    batch_size: u32,
}

impl Admission {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        queue: Arc<dyn FlowQueue>,
        lock: RenderLock,
        mac_secret: Vec<u8>,
        limits: EnqueueLimits,
        batch_size: u32,
    ) -> Self {
        Self { store, queue, lock, mac_secret, limits, batch_size }
    }

    /// Admits one render request. At most one job per document is active; a
    /// held lock makes admission idempotent by returning the holder.
    pub async fn submit(
        &self,
        owner_id: &str,
        metadata: VectorMetadata,
    ) -> Result<AdmissionOutcome, SchedulerError> {
        metadata
            .validate_for_enqueue(&self.limits)
            .map_err(SchedulerError::Validation)?;

        let job_id = Uuid::new_v4().to_string();
        let document_id = metadata.lock_document_id().to_string();

        match self.lock.acquire(&document_id, &job_id).await {
            LockOutcome::Acquired => {}
            LockOutcome::Busy { holder } => {
                info!("[ADMIT] document {document_id} busy; returning holder {holder}");
                return Ok(AdmissionOutcome { job_id: holder, accepted: false });
            }
            LockOutcome::Throttled { active } => {
                return Err(SchedulerError::Throttled { active });
            }
            LockOutcome::Unavailable => {
                warn!("[ADMIT] admitting {job_id} for {document_id} without exclusivity");
            }
        }

        let mac = metadata_mac(&self.mac_secret, &metadata)
            .map_err(|e| SchedulerError::Internal(format!("payload MAC: {e}")))?;
        let total_pages = metadata.layout.total_pages;
        let job = PrintJob::new(job_id.clone(), owner_id, metadata, mac);

        if let Err(e) = self.store.insert_job(job).await {
            self.lock.release(&document_id, &job_id).await;
            return Err(e.into());
        }

        let spec = RenderFlowSpec {
            print_job_id: job_id.clone(),
            document_id: document_id.clone(),
            total_pages,
            batch_size: self.batch_size,
        };
        let flow_id = match self.queue.enqueue_render_flow(spec).await {
            Ok(flow_id) => flow_id,
            Err(e) => {
                self.lock.release(&document_id, &job_id).await;
                return Err(e.into());
            }
        };

        self.store
            .update_job(
                &job_id,
                imprint_traits::JobUpdate::default().with_audit(AuditEntry::new(
                    AuditEvent::JobEnqueued,
                    serde_json::json!({ "flowId": flow_id }),
                )),
            )
            .await?;

        info!("[ADMIT] job {job_id} accepted for document {document_id} ({total_pages} pages)");
        Ok(AdmissionOutcome { job_id, accepted: true })
    }
}
