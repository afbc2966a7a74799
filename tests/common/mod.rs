//! Shared fixtures and PDF assertions for the integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod pdf_assertions;

use imprint::{PrintService, RenderConfig};
use imprint_traits::{InMemoryBlobStore, InMemoryKvCache, InMemoryMetadataStore};
use std::sync::Arc;

pub const MAC_SECRET: &str = "integration-test-secret";

/// A service over fresh in-memory collaborators, with handles kept for
/// direct inspection.
pub struct TestHarness {
    pub service: PrintService,
    pub blobs: Arc<InMemoryBlobStore>,
    pub store: Arc<InMemoryMetadataStore>,
    pub kv: Arc<InMemoryKvCache>,
}

pub fn harness() -> TestHarness {
    harness_with_config(RenderConfig::default())
}

pub fn harness_with_config(config: RenderConfig) -> TestHarness {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let store = Arc::new(InMemoryMetadataStore::new());
    let kv = Arc::new(InMemoryKvCache::new());
    let service = PrintService::builder()
        .with_config(config)
        .with_mac_secret(MAC_SECRET)
        .with_blob_store(blobs.clone())
        .with_metadata_store(store.clone())
        .with_kv_cache(kv.clone())
        .build()
        .unwrap_or_else(|e| panic!("service build failed: {e}"));
    TestHarness { service, blobs, store, kv }
}
