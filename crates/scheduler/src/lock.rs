//! The per-document render lock.
//!
//! One holder per document, a global active-job counter with an optional cap,
//! and a TTL that outlives the worst-case render so an abandoned lock always
//! dies on its own (the reaper handles the job record). No renewal.

use imprint_traits::{KvCache, KvError, LockAcquire};
use log::warn;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// Another job holds the document; its id is the effective job id.
    Busy { holder: String },
    /// The global cap is reached.
    Throttled { active: i64 },
    /// The cache tier is down; admission proceeds with weaker exclusivity.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct RenderLock {
    kv: Arc<dyn KvCache>,
    ttl: Duration,
    max_active: i64,
}

impl RenderLock {
    pub fn new(kv: Arc<dyn KvCache>, ttl: Duration, max_active: i64) -> Self {
        Self { kv, ttl, max_active }
    }

    pub async fn acquire(&self, document_id: &str, job_id: &str) -> LockOutcome {
        match self
            .kv
            .acquire_render_lock(document_id, job_id, self.ttl, self.max_active)
            .await
        {
            Ok(LockAcquire::Acquired) => LockOutcome::Acquired,
            Ok(LockAcquire::Busy { holder }) => LockOutcome::Busy { holder },
            Ok(LockAcquire::Throttled { active }) => LockOutcome::Throttled { active },
            Err(KvError::Unavailable(reason)) => {
                warn!("[LOCK] cache unavailable ({reason}); admitting {job_id} without lock");
                LockOutcome::Unavailable
            }
            Err(e) => {
                warn!("[LOCK] acquire failed for {document_id} ({e}); admitting without lock");
                LockOutcome::Unavailable
            }
        }
    }

    /// Owner-checked release. Failures are swallowed: the TTL and the reaper
    /// guarantee eventual progress.
    pub async fn release(&self, document_id: &str, job_id: &str) {
        if let Err(e) = self.kv.release_render_lock(document_id, job_id).await {
            warn!("[LOCK] release failed for {document_id}/{job_id}: {e}");
        }
    }
}
