//! Discriminated scheduler errors with an explicit retry disposition.

use imprint_traits::{BlobError, KvError, StoreError};
use imprint_types::ValidationIssue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Schema or bounds violation; rejected at admission, never enqueued.
    #[error("metadata validation failed: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Global active-job cap reached; callers may retry later.
    #[error("render throttled: {active} job(s) already active")]
    Throttled { active: i64 },

    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Stored MAC does not match the reloaded metadata. Fatal for the job.
    #[error("payload MAC mismatch for job {0}")]
    MacMismatch(String),

    /// A render stage produced bytes without a PDF header.
    #[error("render pipeline broken: output is not a PDF")]
    BadPdfHeader,

    /// Merge found gaps in the rendered page set.
    #[error("missing rendered pages: {0:?}")]
    MissingPages(Vec<usize>),

    #[error("page {0} was rendered more than once")]
    DuplicatePage(usize),

    /// Merge exceeded its wall-clock budget.
    #[error("merge exceeded its {0} ms budget")]
    TimeBudgetExceeded(u64),

    #[error("layout error: {0}")]
    Layout(#[from] imprint_layout::LayoutError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("kv error: {0}")]
    Kv(#[from] KvError),

    #[error("{0}")]
    Internal(String),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchedulerError {
    /// Whether a batch attempt hitting this error is worth retrying.
    /// Transport-flavored failures are; deterministic ones are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Store(_)
                | SchedulerError::Blob(_)
                | SchedulerError::Kv(_)
                | SchedulerError::Queue(_)
                | SchedulerError::Internal(_)
        )
    }
}
