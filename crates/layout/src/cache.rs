//! Content-addressed, bounded per-process caches.
//!
//! Explicit collaborators of the engine rather than ambient state: parsed
//! source documents and sanitized watermark paths are keyed by the SHA-256 of
//! their input bytes, so a cache hit can never change the output.

use crate::svg::sanitize::PathSpec;
use lopdf::Document;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

pub type ContentKey = [u8; 32];

pub fn content_key(bytes: &[u8]) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// A source ready for embedding: the parsed PDF (post-conversion for SVG
/// sources).
pub struct PreparedSource {
    pub doc: Document,
}

pub struct LayoutCaches {
    sources: Mutex<LruCache<ContentKey, Arc<PreparedSource>>>,
    watermark_paths: Mutex<LruCache<ContentKey, Arc<Vec<PathSpec>>>>,
}

impl LayoutCaches {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1))
            .unwrap_or_else(|| panic!("cache capacity must be non-zero"));
        Self {
            sources: Mutex::new(LruCache::new(capacity)),
            watermark_paths: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn source(&self, key: &ContentKey) -> Option<Arc<PreparedSource>> {
        self.sources.lock().ok()?.get(key).cloned()
    }

    pub fn store_source(&self, key: ContentKey, source: Arc<PreparedSource>) {
        if let Ok(mut cache) = self.sources.lock() {
            cache.put(key, source);
        }
    }

    pub fn watermark(&self, key: &ContentKey) -> Option<Arc<Vec<PathSpec>>> {
        self.watermark_paths.lock().ok()?.get(key).cloned()
    }

    pub fn store_watermark(&self, key: ContentKey, paths: Arc<Vec<PathSpec>>) {
        if let Ok(mut cache) = self.watermark_paths.lock() {
            cache.put(key, paths);
        }
    }
}

impl Default for LayoutCaches {
    fn default() -> Self {
        Self::new(32)
    }
}
