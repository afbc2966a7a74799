//! The batch child step: render a contiguous page range.

use crate::error::SchedulerError;
use crate::queue::{BatchOutcome, BatchPayload, RenderedPage};
use crate::worker::RenderWorker;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use imprint_layout::has_pdf_header;
use imprint_traits::JobUpdate;
use imprint_types::{verify_metadata_mac, AuditEntry, AuditEvent, JobStatus};
use log::{debug, info};
use std::sync::Arc;
use tokio::task;

impl RenderWorker {
    pub(crate) async fn render_batch(
        &self,
        payload: &BatchPayload,
    ) -> Result<BatchOutcome, SchedulerError> {
        let source = {
            let job = self.load_job(&payload.print_job_id).await?;
            if job.status == JobStatus::Expired {
                return Ok(BatchOutcome::skipped());
            }
            self.fetch_source(&job.metadata.source_pdf_key).await?
        };

        let mut pages = Vec::with_capacity((payload.end_page - payload.start_page) as usize);
        for page_index in payload.start_page..payload.end_page {
            // Reload on every step boundary: an EXPIRED job stops producing
            // side effects immediately.
            let job = self.load_job(&payload.print_job_id).await?;
            if job.status == JobStatus::Expired {
                info!(
                    "[BATCH] job {} expired mid-batch, skipping remaining pages",
                    payload.print_job_id
                );
                return Ok(BatchOutcome::skipped());
            }

            if let Err(issues) = job.metadata.validate() {
                return Err(SchedulerError::Validation(issues));
            }
            if !verify_metadata_mac(&self.mac_secret, &job.metadata, &job.payload_mac) {
                return Err(SchedulerError::MacMismatch(job.id.clone()));
            }

            let engine = Arc::clone(&self.engine);
            let metadata = Arc::new(job.metadata);
            let source_bytes = Arc::clone(&source);
            let rendered = task::spawn_blocking(move || {
                engine.render_page(&metadata, &source_bytes, page_index)
            })
            .await
            .map_err(|e| SchedulerError::Internal(format!("render task join error: {e}")))??;

            if !has_pdf_header(&rendered) {
                return Err(SchedulerError::BadPdfHeader);
            }

            self.store
                .update_job(
                    &payload.print_job_id,
                    JobUpdate::status(JobStatus::Running)
                        .with_rendered(1)
                        .with_audit(AuditEntry::new(
                            AuditEvent::PageRendered,
                            serde_json::json!({ "pageIndex": page_index }),
                        )),
                )
                .await?;
            debug!(
                "[BATCH] job {} document {} page {} rendered ({} bytes)",
                payload.print_job_id,
                payload.document_id,
                page_index,
                rendered.len()
            );

            pages.push(RenderedPage {
                page_index,
                pdf_base64: BASE64.encode(&rendered),
            });
        }

        info!(
            "[BATCH] job {} document {} pages {}..{} done",
            payload.print_job_id, payload.document_id, payload.start_page, payload.end_page
        );
        Ok(BatchOutcome::Pages { pages })
    }
}
