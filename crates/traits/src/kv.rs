//! Key/value cache with scripted atomic primitives.
//!
//! The trait exposes exactly the compare-and-swap recipes the service needs;
//! on a real deployment each method maps to one server-side script, so the
//! multi-step sequences below are atomic with respect to other clients. The
//! cache is optional: every caller degrades to its durable fallback on
//! [`KvError::Unavailable`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Well-known key builders shared by the scheduler and the quota engine.
pub mod keys {
    pub fn render_lock(document_id: &str) -> String {
        format!("vector:render:lock:{}", document_id)
    }

    pub fn render_active() -> String {
        "vector:render:active".to_string()
    }

    pub fn render_active_member(job_id: &str) -> String {
        format!("vector:render:active:{}", job_id)
    }

    pub fn print_quota(document_id: &str, user_id: &str) -> String {
        format!("print_quota:{}:{}", document_id, user_id)
    }

    pub fn print_request(document_id: &str, user_id: &str, request_id: &str) -> String {
        format!("print_req:{}:{}:{}", document_id, user_id, request_id)
    }

    pub fn final_pdf(document_id: &str, version: u64, mode: &str) -> String {
        format!("final_pdf:{}:{}:{}", document_id, version, mode)
    }
}

#[derive(Error, Debug, Clone)]
pub enum KvError {
    /// Transport failure; callers fall back to durable paths.
    #[error("kv cache unavailable: {0}")]
    Unavailable(String),

    #[error("kv operation failed: {0}")]
    Failed(String),
}

/// Result of the render-lock acquire script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquire {
    Acquired,
    /// Lock already held; `holder` is the current job id.
    Busy { holder: String },
    /// Global active-job cap reached.
    Throttled { active: i64 },
}

/// Result of the quota decrement script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecrement {
    /// Hash field absent (`-2`): caller recovers from the durable store.
    Miss,
    /// Remaining was already `<= 0` (`-1`).
    Denied,
    /// Decremented; the new remaining count.
    Remaining(i64),
}

#[async_trait]
pub trait KvCache: Send + Sync + Debug {
    /// The §-style acquire recipe, atomic as one script:
    /// 1. lock key held -> `Busy{holder}`;
    /// 2. active counter at `max_active` (when > 0) -> `Throttled{active}`;
    /// 3. else set lock+member with `ttl`, increment the counter -> `Acquired`.
    async fn acquire_render_lock(
        &self,
        document_id: &str,
        job_id: &str,
        ttl: Duration,
        max_active: i64,
    ) -> Result<LockAcquire, KvError>;

    /// Owner-checked release: only the holder deletes the lock, and the active
    /// counter is decremented only while the membership key still exists, so
    /// retried releases never double-decrement.
    async fn release_render_lock(&self, document_id: &str, job_id: &str) -> Result<(), KvError>;

    /// The quota decrement script over the `remaining` hash field.
    async fn quota_decrement(&self, quota_key: &str) -> Result<QuotaDecrement, KvError>;

    /// Seeds the quota hash after a cache miss. Set-if-absent: an existing
    /// field wins, so concurrent recoveries cannot re-inflate the counter.
    async fn quota_seed(&self, quota_key: &str, remaining: i64) -> Result<(), KvError>;

    /// `SET key value NX EX ttl`; returns whether the key was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn del(&self, key: &str) -> Result<(), KvError>;
}

// --- In-memory implementation ---

#[derive(Debug, Default)]
struct KvState {
    /// String keys with optional expiry, checked lazily on access.
    strings: HashMap<String, (String, Option<Instant>)>,
    /// Hash keys; only integer fields are needed.
    hashes: HashMap<String, HashMap<String, i64>>,
}

impl KvState {
    fn live_string(&mut self, key: &str) -> Option<String> {
        match self.strings.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                self.strings.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

/// TTL-aware in-memory cache. A single mutex makes each trait method atomic,
/// mirroring the single-script execution of a real deployment. Flip
/// [`set_unavailable`](InMemoryKvCache::set_unavailable) to simulate an outage.
#[derive(Debug, Default)]
pub struct InMemoryKvCache {
    state: Mutex<KvState>,
    unavailable: AtomicBool,
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`KvError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drops every key, simulating cache loss with the service still up.
    pub fn flush(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.strings.clear();
            state.hashes.clear();
        }
    }

    /// Test hook: current integer value of a hash field.
    pub fn hash_field(&self, key: &str, field: &str) -> Option<i64> {
        let state = self.state.lock().ok()?;
        state.hashes.get(key)?.get(field).copied()
    }

    /// Test hook: whether a string key currently exists (TTL-respecting).
    pub fn has_string(&self, key: &str) -> bool {
        self.state
            .lock()
            .map(|mut s| s.live_string(key).is_some())
            .unwrap_or(false)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, KvState>, KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("simulated outage".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| KvError::Failed("kv state lock poisoned".to_string()))
    }
}

#[async_trait]
impl KvCache for InMemoryKvCache {
    async fn acquire_render_lock(
        &self,
        document_id: &str,
        job_id: &str,
        ttl: Duration,
        max_active: i64,
    ) -> Result<LockAcquire, KvError> {
        let mut state = self.guard()?;
        let lock_key = keys::render_lock(document_id);

        if let Some(holder) = state.live_string(&lock_key) {
            return Ok(LockAcquire::Busy { holder });
        }

        let active = state
            .live_string(&keys::render_active())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if max_active > 0 && active >= max_active {
            return Ok(LockAcquire::Throttled { active });
        }

        let deadline = Some(Instant::now() + ttl);
        state
            .strings
            .insert(lock_key, (job_id.to_string(), deadline));
        state
            .strings
            .insert(keys::render_active(), ((active + 1).to_string(), None));
        state
            .strings
            .insert(keys::render_active_member(job_id), ("1".to_string(), deadline));
        Ok(LockAcquire::Acquired)
    }

    async fn release_render_lock(&self, document_id: &str, job_id: &str) -> Result<(), KvError> {
        let mut state = self.guard()?;
        let lock_key = keys::render_lock(document_id);

        if state.live_string(&lock_key).as_deref() == Some(job_id) {
            state.strings.remove(&lock_key);
        }

        let member_key = keys::render_active_member(job_id);
        if state.live_string(&member_key).is_some() {
            state.strings.remove(&member_key);
            let active = state
                .live_string(&keys::render_active())
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            state.strings.insert(
                keys::render_active(),
                ((active - 1).max(0).to_string(), None),
            );
        }
        Ok(())
    }

    async fn quota_decrement(&self, quota_key: &str) -> Result<QuotaDecrement, KvError> {
        let mut state = self.guard()?;
        let Some(fields) = state.hashes.get_mut(quota_key) else {
            return Ok(QuotaDecrement::Miss);
        };
        let Some(remaining) = fields.get_mut("remaining") else {
            return Ok(QuotaDecrement::Miss);
        };
        if *remaining <= 0 {
            return Ok(QuotaDecrement::Denied);
        }
        *remaining -= 1;
        Ok(QuotaDecrement::Remaining(*remaining))
    }

    async fn quota_seed(&self, quota_key: &str, remaining: i64) -> Result<(), KvError> {
        let mut state = self.guard()?;
        state
            .hashes
            .entry(quota_key.to_string())
            .or_default()
            .entry("remaining".to_string())
            .or_insert(remaining);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut state = self.guard()?;
        if state.live_string(key).is_some() {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut state = self.guard()?;
        Ok(state.live_string(key))
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut state = self.guard()?;
        state.strings.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn lock_is_exclusive_per_document() {
        let kv = InMemoryKvCache::new();
        assert_eq!(
            kv.acquire_render_lock("d1", "j1", TTL, 0).await.unwrap(),
            LockAcquire::Acquired
        );
        assert_eq!(
            kv.acquire_render_lock("d1", "j2", TTL, 0).await.unwrap(),
            LockAcquire::Busy { holder: "j1".to_string() }
        );
        // A different document is unaffected.
        assert_eq!(
            kv.acquire_render_lock("d2", "j3", TTL, 0).await.unwrap(),
            LockAcquire::Acquired
        );
    }

    #[tokio::test]
    async fn active_cap_throttles_across_documents() {
        let kv = InMemoryKvCache::new();
        assert_eq!(
            kv.acquire_render_lock("d1", "j1", TTL, 1).await.unwrap(),
            LockAcquire::Acquired
        );
        assert_eq!(
            kv.acquire_render_lock("d2", "j2", TTL, 1).await.unwrap(),
            LockAcquire::Throttled { active: 1 }
        );
        kv.release_render_lock("d1", "j1").await.unwrap();
        assert_eq!(
            kv.acquire_render_lock("d2", "j2", TTL, 1).await.unwrap(),
            LockAcquire::Acquired
        );
    }

    #[tokio::test]
    async fn release_is_owner_checked_and_idempotent() {
        let kv = InMemoryKvCache::new();
        kv.acquire_render_lock("d1", "j1", TTL, 0).await.unwrap();

        // A non-holder release leaves the lock in place.
        kv.release_render_lock("d1", "j2").await.unwrap();
        assert_eq!(
            kv.acquire_render_lock("d1", "j3", TTL, 0).await.unwrap(),
            LockAcquire::Busy { holder: "j1".to_string() }
        );

        // Double release decrements the active counter once.
        kv.release_render_lock("d1", "j1").await.unwrap();
        kv.release_render_lock("d1", "j1").await.unwrap();
        assert_eq!(kv.get(&keys::render_active()).await.unwrap().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn quota_script_reports_miss_denied_and_remaining() {
        let kv = InMemoryKvCache::new();
        let key = keys::print_quota("d1", "u1");

        assert_eq!(kv.quota_decrement(&key).await.unwrap(), QuotaDecrement::Miss);
        kv.quota_seed(&key, 2).await.unwrap();
        assert_eq!(kv.quota_decrement(&key).await.unwrap(), QuotaDecrement::Remaining(1));
        assert_eq!(kv.quota_decrement(&key).await.unwrap(), QuotaDecrement::Remaining(0));
        assert_eq!(kv.quota_decrement(&key).await.unwrap(), QuotaDecrement::Denied);
    }

    #[tokio::test]
    async fn set_nx_respects_existing_keys_and_ttls() {
        let kv = InMemoryKvCache::new();
        assert!(kv.set_nx_ex("k", "1", Duration::from_millis(20)).await.unwrap());
        assert!(!kv.set_nx_ex("k", "1", TTL).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(kv.set_nx_ex("k", "1", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn outage_surfaces_as_unavailable() {
        let kv = InMemoryKvCache::new();
        kv.set_unavailable(true);
        assert!(matches!(
            kv.acquire_render_lock("d", "j", TTL, 0).await,
            Err(KvError::Unavailable(_))
        ));
    }
}
