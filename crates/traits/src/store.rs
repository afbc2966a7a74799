//! Durable metadata store: print jobs, document grants, document records.
//!
//! The trait captures the store operations the engines need — indexed lookup,
//! optimistic single-record updates with matched counts, and the reaper's
//! sweep queries — without binding to any driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imprint_types::{AuditEntry, DocumentAccess, DocumentRecord, JobErrorInfo, JobOutput, JobStatus, PrintJob};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("store operation failed: {0}")]
    Failed(String),
}

/// A field-level patch applied to one job record in a single optimistic
/// update. `updated_at` is always refreshed. Progress merges with `max`, so a
/// slower worker can never move the bar backwards.
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    /// Adds to `rendered_pages` and refreshes the render-band progress
    /// (`floor(rendered / total * 80)`, max-merged like `progress`).
    pub increment_rendered: u32,
    pub set_output: Option<JobOutput>,
    pub clear_output: bool,
    pub error: Option<JobErrorInfo>,
    pub append_audit: Vec<AuditEntry>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn progress(progress: u8) -> Self {
        Self { progress: Some(progress), ..Self::default() }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_rendered(mut self, pages: u32) -> Self {
        self.increment_rendered = pages;
        self
    }

    pub fn with_output(mut self, output: JobOutput) -> Self {
        self.set_output = Some(output);
        self
    }

    pub fn clearing_output(mut self) -> Self {
        self.clear_output = true;
        self
    }

    pub fn with_error(mut self, error: JobErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_audit(mut self, entry: AuditEntry) -> Self {
        self.append_audit.push(entry);
        self
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync + Debug {
    // --- Print jobs ---

    async fn insert_job(&self, job: PrintJob) -> Result<(), StoreError>;

    async fn load_job(&self, job_id: &str) -> Result<Option<PrintJob>, StoreError>;

    /// Applies the patch to one job; returns the updated record, or `None`
    /// when the job does not exist.
    async fn update_job(&self, job_id: &str, update: JobUpdate)
        -> Result<Option<PrintJob>, StoreError>;

    // --- Document grants ---

    async fn find_access(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<DocumentAccess>, StoreError>;

    /// Lazily backfills null `print_quota` / `prints_used` fields.
    async fn backfill_access(
        &self,
        document_id: &str,
        user_id: &str,
        print_quota: i64,
        prints_used: i64,
    ) -> Result<(), StoreError>;

    /// Optimistic consume: in one update, require `revoked = false` and
    /// `prints_used < print_quota`, increment `prints_used` and stamp
    /// `last_print_at`. Returns the matched count (0 or 1).
    async fn consume_access(
        &self,
        document_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Write-behind for cache-granted prints: increments `prints_used` and
    /// stamps `last_print_at`, filtered by `revoked = false` only. Returns the
    /// matched count.
    async fn record_print(
        &self,
        document_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // --- Documents ---

    async fn find_document(&self, document_id: &str)
        -> Result<Option<DocumentRecord>, StoreError>;

    // --- Reaper sweep queries ---

    /// RUNNING jobs whose materialized output is past `output.expires_at`.
    async fn running_jobs_with_expired_output(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError>;

    /// RUNNING jobs with no output and `updated_at <= cutoff`.
    async fn running_jobs_stale_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError>;

    /// DONE jobs past `output.expires_at`.
    async fn done_jobs_with_expired_output(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError>;

    /// FAILED jobs with `updated_at <= cutoff`.
    async fn failed_jobs_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError>;
}

// --- In-memory implementation ---

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<String, PrintJob>,
    accesses: HashMap<(String, String), DocumentAccess>,
    documents: HashMap<String, DocumentRecord>,
}

/// Durable-store semantics over process memory, for tests and local wiring.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<StoreState>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a grant (admin-side CRUD is outside the engine's scope).
    pub fn put_access(&self, access: DocumentAccess) {
        if let Ok(mut state) = self.state.lock() {
            let key = (access.document_id.clone(), access.user_id.clone());
            state.accesses.insert(key, access);
        }
    }

    /// Seeds a document record.
    pub fn put_document(&self, document: DocumentRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.documents.insert(document.id.clone(), document);
        }
    }

    /// Test hook: direct snapshot of a grant.
    pub fn access_snapshot(&self, document_id: &str, user_id: &str) -> Option<DocumentAccess> {
        let state = self.state.lock().ok()?;
        state
            .accesses
            .get(&(document_id.to_string(), user_id.to_string()))
            .cloned()
    }

    /// Test hook: rewrites one job with mutations applied, bypassing
    /// `JobUpdate` semantics (e.g. to age a record for reaper tests).
    pub fn mutate_job_raw(&self, job_id: &str, f: impl FnOnce(&mut PrintJob)) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(job) = state.jobs.get_mut(job_id) {
                f(job);
            }
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Failed("store state lock poisoned".to_string()))
    }
}

fn render_band_progress(rendered: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((rendered as u64 * 80) / total as u64).min(80) as u8
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert_job(&self, job: PrintJob) -> Result<(), StoreError> {
        let mut state = self.guard()?;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        state.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<PrintJob>, StoreError> {
        let state = self.guard()?;
        Ok(state.jobs.get(job_id).cloned())
    }

    async fn update_job(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<Option<PrintJob>, StoreError> {
        let mut state = self.guard()?;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return Ok(None);
        };

        if let Some(status) = update.status {
            job.status = status;
        }
        if update.increment_rendered > 0 {
            job.rendered_pages += update.increment_rendered;
            let band = render_band_progress(job.rendered_pages, job.total_pages);
            job.progress = job.progress.max(band);
        }
        if let Some(progress) = update.progress {
            job.progress = job.progress.max(progress.min(100));
        }
        if update.clear_output {
            job.output = JobOutput::default();
        }
        if let Some(output) = update.set_output {
            job.output = output;
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        job.audit.extend(update.append_audit);
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn find_access(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<DocumentAccess>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .accesses
            .get(&(document_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn backfill_access(
        &self,
        document_id: &str,
        user_id: &str,
        print_quota: i64,
        prints_used: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.guard()?;
        if let Some(access) = state
            .accesses
            .get_mut(&(document_id.to_string(), user_id.to_string()))
        {
            access.print_quota.get_or_insert(print_quota);
            access.prints_used.get_or_insert(prints_used);
        }
        Ok(())
    }

    async fn consume_access(
        &self,
        document_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.guard()?;
        let Some(access) = state
            .accesses
            .get_mut(&(document_id.to_string(), user_id.to_string()))
        else {
            return Ok(0);
        };
        let quota = access.print_quota.unwrap_or(0);
        let used = access.prints_used.unwrap_or(0);
        if access.revoked || used >= quota {
            return Ok(0);
        }
        access.prints_used = Some(used + 1);
        access.last_print_at = Some(now);
        Ok(1)
    }

    async fn record_print(
        &self,
        document_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.guard()?;
        let Some(access) = state
            .accesses
            .get_mut(&(document_id.to_string(), user_id.to_string()))
        else {
            return Ok(0);
        };
        if access.revoked {
            return Ok(0);
        }
        access.prints_used = Some(access.prints_used.unwrap_or(0) + 1);
        access.last_print_at = Some(now);
        Ok(1)
    }

    async fn find_document(
        &self,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let state = self.guard()?;
        Ok(state.documents.get(document_id).cloned())
    }

    async fn running_jobs_with_expired_output(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running
                    && j.output.expires_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn running_jobs_stale_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running
                    && j.output.is_empty()
                    && j.updated_at <= cutoff
            })
            .cloned()
            .collect())
    }

    async fn done_jobs_with_expired_output(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Done
                    && j.output.expires_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn failed_jobs_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PrintJob>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed && j.updated_at <= cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_types::VectorMetadata;

    fn sample_metadata() -> VectorMetadata {
        serde_json::from_value(serde_json::json!({
            "sourcePdfKey": "documents/original/src.pdf",
            "ticketCrop": {
                "pageIndex": 0, "xRatio": 0.0, "yRatio": 0.0,
                "widthRatio": 1.0, "heightRatio": 1.0
            },
            "layout": { "pageSize": "A4", "totalPages": 10, "repeatPerPage": 1 }
        }))
        .unwrap()
    }

    fn sample_job(id: &str) -> PrintJob {
        PrintJob::new(id, "admin", sample_metadata(), "mac")
    }

    #[tokio::test]
    async fn progress_is_monotonic_under_max_merge() {
        let store = InMemoryMetadataStore::new();
        store.insert_job(sample_job("j1")).await.unwrap();

        let job = store
            .update_job("j1", JobUpdate::progress(40))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.progress, 40);

        // A stale lower report cannot move the bar backwards.
        let job = store
            .update_job("j1", JobUpdate::progress(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.progress, 40);
    }

    #[tokio::test]
    async fn rendered_increments_drive_the_render_band() {
        let store = InMemoryMetadataStore::new();
        store.insert_job(sample_job("j1")).await.unwrap();

        let job = store
            .update_job("j1", JobUpdate::default().with_rendered(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.rendered_pages, 5);
        assert_eq!(job.progress, 40); // floor(5/10 * 80)

        let job = store
            .update_job("j1", JobUpdate::default().with_rendered(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.progress, 80);
    }

    #[tokio::test]
    async fn consume_access_is_conditional() {
        let store = InMemoryMetadataStore::new();
        store.put_access(DocumentAccess {
            document_id: "d".into(),
            user_id: "u".into(),
            print_quota: Some(1),
            prints_used: Some(0),
            used_prints: None,
            revoked: false,
            last_print_at: None,
        });

        assert_eq!(store.consume_access("d", "u", Utc::now()).await.unwrap(), 1);
        // Cap reached: the filter no longer matches.
        assert_eq!(store.consume_access("d", "u", Utc::now()).await.unwrap(), 0);
        let access = store.access_snapshot("d", "u").unwrap();
        assert_eq!(access.prints_used, Some(1));
    }
}
