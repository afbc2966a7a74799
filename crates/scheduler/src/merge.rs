//! The merge parent step: fan-in, ordered assembly, upload, terminal DONE.

use crate::error::SchedulerError;
use crate::queue::{BatchOutcome, MergeOutcome, MergePayload};
use crate::worker::RenderWorker;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use imprint_layout::{has_pdf_header, PdfAssembler};
use imprint_traits::JobUpdate;
use imprint_types::{AuditEntry, AuditEvent, JobOutput, JobStatus};
use log::info;
use std::time::Instant;

impl RenderWorker {
    pub(crate) async fn merge_job(
        &self,
        payload: &MergePayload,
        children: Vec<BatchOutcome>,
    ) -> Result<MergeOutcome, SchedulerError> {
        let job = self.load_job(&payload.print_job_id).await?;
        if job.status == JobStatus::Expired {
            self.lock.release(&payload.document_id, &payload.print_job_id).await;
            return Ok(MergeOutcome::Skipped { skipped: true });
        }
        let total_pages = job.total_pages as usize;

        // Gather children into a sparse slot array; every index must be
        // present exactly once.
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total_pages];
        for outcome in children {
            let pages = match outcome {
                // A skipped child means the job expired mid-flight.
                BatchOutcome::Skipped { .. } => {
                    self.lock.release(&payload.document_id, &payload.print_job_id).await;
                    return Ok(MergeOutcome::Skipped { skipped: true });
                }
                BatchOutcome::Pages { pages } => pages,
            };
            for page in pages {
                let index = page.page_index as usize;
                if index >= total_pages {
                    return Err(SchedulerError::Internal(format!(
                        "page index {index} out of range (totalPages {total_pages})"
                    )));
                }
                let bytes = BASE64
                    .decode(page.pdf_base64.as_bytes())
                    .map_err(|e| SchedulerError::Internal(format!("page {index} base64: {e}")))?;
                if slots[index].replace(bytes).is_some() {
                    return Err(SchedulerError::DuplicatePage(index));
                }
            }
        }
        let missing: Vec<usize> =
            slots.iter().enumerate().filter(|(_, s)| s.is_none()).map(|(i, _)| i).collect();
        if !missing.is_empty() {
            return Err(SchedulerError::MissingPages(missing));
        }

        let started = Instant::now();
        let deadline = self.options.max_merge.map(|budget| (started + budget, budget));

        let mut assembler = PdfAssembler::new();
        for index in 0..total_pages {
            if let Some((at, budget)) = deadline {
                if Instant::now() >= at {
                    return Err(SchedulerError::TimeBudgetExceeded(budget.as_millis() as u64));
                }
            }
            // Taking the slot releases the page bytes as soon as they are
            // copied into the output document.
            let bytes = slots[index].take().ok_or(SchedulerError::MissingPages(vec![index]))?;
            assembler.append_page(&bytes)?;
            drop(bytes);

            if index % 10 == 0 || index + 1 == total_pages {
                let progress = 80 + ((index + 1) * 15 / total_pages) as u8;
                self.store
                    .update_job(
                        &payload.print_job_id,
                        JobUpdate::progress(progress).with_audit(AuditEntry::new(
                            AuditEvent::MergeProgress,
                            serde_json::json!({ "merged": index + 1, "of": total_pages }),
                        )),
                    )
                    .await?;
            }
        }

        self.store
            .update_job(&payload.print_job_id, JobUpdate::progress(95))
            .await?;
        let merged = assembler.finish()?;
        if !has_pdf_header(&merged) {
            return Err(SchedulerError::BadPdfHeader);
        }

        let key = format!("documents/final/{}.pdf", payload.print_job_id);
        self.blobs.put(&key, merged).await?;
        let url = self.blobs.signed_url(&key, self.options.final_pdf_ttl).await.ok();
        let expires_at = Utc::now()
            + chrono::Duration::seconds(self.options.final_pdf_ttl.as_secs() as i64);

        let merge_ms = started.elapsed().as_millis() as u64;
        self.store
            .update_job(
                &payload.print_job_id,
                JobUpdate::status(JobStatus::Done)
                    .with_progress(100)
                    .with_output(JobOutput {
                        key: Some(key.clone()),
                        url,
                        expires_at: Some(expires_at),
                    })
                    .with_audit(AuditEntry::new(AuditEvent::JobDone, serde_json::Value::Null))
                    .with_audit(AuditEntry::new(
                        AuditEvent::MergeTime,
                        serde_json::json!({ "ms": merge_ms }),
                    )),
            )
            .await?;
        info!(
            "[MERGE] job {} document {} merged {} page(s) in {} ms -> {}",
            payload.print_job_id, payload.document_id, total_pages, merge_ms, key
        );

        // Success or failure, the lock never outlives the flow.
        self.lock.release(&payload.document_id, &payload.print_job_id).await;
        Ok(MergeOutcome::Done { ok: true, key })
    }
}
