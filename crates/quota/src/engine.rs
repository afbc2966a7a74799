use chrono::Utc;
use imprint_traits::{keys, KvCache, KvError, MetadataStore, QuotaDecrement, StoreError};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Replay window for request-id idempotency.
pub const REQUEST_TTL: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum QuotaError {
    /// The request carried no usable request id.
    #[error("missing request id")]
    BadRequest,

    /// No grant exists for this (document, user).
    #[error("no access to document")]
    NoAccess,

    /// The grant has been revoked.
    #[error("access revoked")]
    Revoked,

    /// The quota cap is reached.
    #[error("print quota exhausted")]
    Limit,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// How a successful consumption was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaOutcome {
    /// Remaining prints as reported by the cache; `None` on the durable
    /// fallback path and on replays.
    pub remaining: Option<i64>,
    /// The request id was already honored; no side effects this time.
    pub replay: bool,
    /// Granted via the durable conditional update, not the cache.
    pub fallback: bool,
}

impl QuotaOutcome {
    fn granted(remaining: i64) -> Self {
        Self { remaining: Some(remaining), replay: false, fallback: false }
    }

    fn replayed() -> Self {
        Self { remaining: None, replay: true, fallback: false }
    }

    fn fallback_granted() -> Self {
        Self { remaining: None, replay: false, fallback: true }
    }
}

/// Atomically consumes one print against a (document, user) grant.
#[derive(Debug)]
pub struct QuotaEngine {
    kv: Arc<dyn KvCache>,
    store: Arc<dyn MetadataStore>,
}

impl QuotaEngine {
    pub fn new(kv: Arc<dyn KvCache>, store: Arc<dyn MetadataStore>) -> Self {
        Self { kv, store }
    }

    /// Consumes exactly one print, at most once per `request_id` within the
    /// replay window. See the crate docs for the tiering rules.
    pub async fn consume(
        &self,
        document_id: &str,
        user_id: &str,
        request_id: &str,
    ) -> Result<QuotaOutcome, QuotaError> {
        if request_id.trim().is_empty() {
            return Err(QuotaError::BadRequest);
        }

        let req_key = keys::print_request(document_id, user_id, request_id);
        let quota_key = keys::print_quota(document_id, user_id);

        // Idempotency gate. A transport error here abandons the cache tier
        // entirely for this request.
        match self.kv.set_nx_ex(&req_key, "1", REQUEST_TTL).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("[QUOTA] replayed request {} for {}:{}", request_id, document_id, user_id);
                return Ok(QuotaOutcome::replayed());
            }
            Err(e) => {
                warn!("[QUOTA] idempotency gate unavailable ({}), using durable fallback", e);
                return self.durable_consume(document_id, user_id).await;
            }
        }

        match self.kv.quota_decrement(&quota_key).await {
            Ok(QuotaDecrement::Remaining(remaining)) => {
                self.write_behind(document_id, user_id).await?;
                Ok(QuotaOutcome::granted(remaining))
            }
            Ok(QuotaDecrement::Denied) => {
                self.forget_request(&req_key).await;
                Err(QuotaError::Limit)
            }
            Ok(QuotaDecrement::Miss) => {
                self.recover_and_retry(document_id, user_id, &quota_key, &req_key).await
            }
            Err(e) => {
                warn!("[QUOTA] decrement unavailable ({}), using durable fallback", e);
                self.durable_consume(document_id, user_id).await
            }
        }
    }

    /// Cache-miss recovery: derive the remaining count from the durable
    /// grant, seed the hash (set-if-absent) and retry the decrement once.
    async fn recover_and_retry(
        &self,
        document_id: &str,
        user_id: &str,
        quota_key: &str,
        req_key: &str,
    ) -> Result<QuotaOutcome, QuotaError> {
        let Some(access) = self.store.find_access(document_id, user_id).await? else {
            self.forget_request(req_key).await;
            return Err(QuotaError::NoAccess);
        };
        if access.revoked {
            self.forget_request(req_key).await;
            return Err(QuotaError::Revoked);
        }

        let remaining = access.derived_remaining();
        if access.print_quota.is_none() || access.prints_used.is_none() {
            let quota = access.print_quota.unwrap_or(0);
            let used = access
                .prints_used
                .unwrap_or_else(|| access.used_prints.unwrap_or(0));
            self.store
                .backfill_access(document_id, user_id, quota, used)
                .await?;
        }
        debug!(
            "[QUOTA] cache miss for {}:{}, seeding remaining={}",
            document_id, user_id, remaining
        );

        let retry = async {
            self.kv.quota_seed(quota_key, remaining).await?;
            self.kv.quota_decrement(quota_key).await
        };
        match retry.await {
            Ok(QuotaDecrement::Remaining(remaining)) => {
                self.write_behind(document_id, user_id).await?;
                Ok(QuotaOutcome::granted(remaining))
            }
            Ok(QuotaDecrement::Denied) => {
                self.forget_request(req_key).await;
                Err(QuotaError::Limit)
            }
            // A second miss means the cache was lost again mid-recovery.
            Ok(QuotaDecrement::Miss) | Err(KvError::Unavailable(_)) | Err(KvError::Failed(_)) => {
                warn!("[QUOTA] recovery path degraded, using durable fallback");
                self.durable_consume(document_id, user_id).await
            }
        }
    }

    /// Durable write-behind after a cache grant; filtered by revoked only,
    /// the cap was enforced by the cache tier.
    async fn write_behind(&self, document_id: &str, user_id: &str) -> Result<(), QuotaError> {
        let matched = self.store.record_print(document_id, user_id, Utc::now()).await?;
        if matched == 0 {
            warn!(
                "[QUOTA] write-behind matched no record for {}:{} (revoked or missing)",
                document_id, user_id
            );
        }
        Ok(())
    }

    /// The correctness-preserving fallback: one conditional durable update
    /// requiring an unrevoked grant with headroom.
    async fn durable_consume(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<QuotaOutcome, QuotaError> {
        let matched = self.store.consume_access(document_id, user_id, Utc::now()).await?;
        if matched == 1 {
            return Ok(QuotaOutcome::fallback_granted());
        }
        // Differentiate the failure with a plain read.
        match self.store.find_access(document_id, user_id).await? {
            None => Err(QuotaError::NoAccess),
            Some(access) if access.revoked => Err(QuotaError::Revoked),
            Some(_) => Err(QuotaError::Limit),
        }
    }

    /// Drops the idempotency key so the same request id can succeed after the
    /// quota is raised or access is granted. Best-effort.
    async fn forget_request(&self, req_key: &str) {
        if let Err(e) = self.kv.del(req_key).await {
            warn!("[QUOTA] failed to drop request key {}: {}", req_key, e);
        }
    }
}
