//! The durable render-job record and its append-only audit timeline.

use crate::metadata::VectorMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Expired)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub key: Option<String>,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl JobOutput {
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.url.is_none() && self.expires_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobErrorInfo {
    pub message: String,
    pub stack: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    JobCreated,
    JobEnqueued,
    PageRendered,
    MergeProgress,
    MergeTime,
    JobDone,
    JobFailed,
    JobExpired,
    RunningJobExpiredAndOutputDeleted,
}

/// One entry of the append-only audit log. Details are free-form values, not
/// references to other records, so the timeline stays acyclic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub event: AuditEvent,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(event: AuditEvent, details: serde_json::Value) -> Self {
        Self { at: Utc::now(), event, details }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: String,
    pub owner_id: String,
    pub metadata: VectorMetadata,
    /// HMAC-SHA256 over the canonical stringification of `metadata`, hex-encoded.
    pub payload_mac: String,
    pub status: JobStatus,
    /// 0..=100, monotonically non-decreasing until terminal.
    pub progress: u8,
    pub total_pages: u32,
    /// Pages rendered so far across all batches; drives the 0..80 progress band.
    #[serde(default)]
    pub rendered_pages: u32,
    #[serde(default)]
    pub output: JobOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorInfo>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrintJob {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        metadata: VectorMetadata,
        payload_mac: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let total_pages = metadata.layout.total_pages;
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            metadata,
            payload_mac: payload_mac.into(),
            status: JobStatus::Pending,
            progress: 0,
            total_pages,
            rendered_pages: 0,
            output: JobOutput::default(),
            error: None,
            audit: vec![AuditEntry::new(AuditEvent::JobCreated, serde_json::Value::Null)],
            created_at: now,
            updated_at: now,
        }
    }

    /// The document id the render lock for this job is scoped to.
    pub fn lock_document_id(&self) -> &str {
        self.metadata.lock_document_id()
    }
}
