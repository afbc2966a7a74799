//! Collaborator seams for the rendering service.
//!
//! Every external system (blob store, KV cache, metadata store, SVG
//! converter) appears to the engines only as a trait defined here, so the
//! pipeline can be exercised end-to-end without any transport.
//!
//! ## Available implementations
//!
//! - [`InMemoryBlobStore`]: pre-populated byte storage
//! - [`InMemoryKvCache`]: TTL-aware cache with the scripted atomic primitives
//! - [`InMemoryMetadataStore`]: durable-store semantics over process memory
//! - [`FixedPdfConverter`] / [`MissingConverter`]: SVG-to-PDF stand-ins

pub mod blob;
pub mod convert;
pub mod kv;
pub mod store;

pub use blob::{key_is_deletable, BlobError, BlobStore, InMemoryBlobStore, SharedBlob};
pub use convert::{ConvertError, FixedPdfConverter, MissingConverter, SvgConverter};
pub use kv::{keys, InMemoryKvCache, KvCache, KvError, LockAcquire, QuotaDecrement};
pub use store::{InMemoryMetadataStore, JobUpdate, MetadataStore, StoreError};
