//! The integration layer: one `PrintService` owning explicit handles to every
//! collaborator. Nothing here reads global mutable state; handles are passed
//! in once at build time and flow into the components.

use crate::config::RenderConfig;
use chrono::Utc;
use imprint_layout::VectorLayoutEngine;
use imprint_quota::{QuotaEngine, QuotaError, QuotaOutcome};
use imprint_scheduler::{
    Admission, AdmissionOutcome, FlowQueue, InMemoryFlowQueue, InMemoryQueueOptions, Reaper,
    ReaperOptions, ReaperReport, RenderLock, RenderOptions, RenderWorker, SchedulerError,
};
use imprint_traits::{
    BlobStore, InMemoryBlobStore, InMemoryKvCache, InMemoryMetadataStore, KvCache, MetadataStore,
    MissingConverter, StoreError, SvgConverter,
};
use imprint_types::{ColorMode, EnqueueLimits, JobStatus, PrintJob, VectorMetadata};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service misconfigured: {0}")]
    Build(String),

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blob error: {0}")]
    Blob(#[from] imprint_traits::BlobError),

    #[error("kv error: {0}")]
    Kv(#[from] imprint_traits::KvError),
}

/// Configure collaborator handles, then `build()` the wired service.
/// Collaborators default to the in-memory implementations, which makes a
/// fully working local service out of the box.
pub struct PrintServiceBuilder {
    config: RenderConfig,
    mac_secret: Option<Vec<u8>>,
    kv: Option<Arc<dyn KvCache>>,
    blobs: Option<Arc<dyn BlobStore>>,
    store: Option<Arc<dyn MetadataStore>>,
    converter: Option<Arc<dyn SvgConverter>>,
}

impl PrintServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
            mac_secret: None,
            kv: None,
            blobs: None,
            store: None,
            converter: None,
        }
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mac_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.mac_secret = Some(secret.into());
        self
    }

    pub fn with_kv_cache(mut self, kv: Arc<dyn KvCache>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_svg_converter(mut self, converter: Arc<dyn SvgConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> Result<PrintService, ServiceError> {
        let config = self.config.normalized();
        let mac_secret = self
            .mac_secret
            .ok_or_else(|| ServiceError::Build("a payload MAC secret is required".into()))?;
        if mac_secret.is_empty() {
            return Err(ServiceError::Build("the payload MAC secret must not be empty".into()));
        }

        let kv: Arc<dyn KvCache> = self.kv.unwrap_or_else(|| Arc::new(InMemoryKvCache::new()));
        let blobs: Arc<dyn BlobStore> =
            self.blobs.unwrap_or_else(|| Arc::new(InMemoryBlobStore::new()));
        let store: Arc<dyn MetadataStore> =
            self.store.unwrap_or_else(|| Arc::new(InMemoryMetadataStore::new()));
        let converter: Arc<dyn SvgConverter> =
            self.converter.unwrap_or_else(|| Arc::new(MissingConverter));

        let lock = RenderLock::new(
            Arc::clone(&kv),
            config.render_lock_ttl,
            config.max_active_jobs,
        );
        let engine = Arc::new(VectorLayoutEngine::new(converter));

        let worker = Arc::new(RenderWorker::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            lock.clone(),
            engine,
            mac_secret.clone(),
            RenderOptions {
                batch_size: config.batch_size,
                final_pdf_ttl: config.final_pdf_ttl,
                max_merge: config.merge_max,
            },
        ));
        let queue = Arc::new(InMemoryFlowQueue::new(
            worker,
            InMemoryQueueOptions {
                concurrency: config.queue_concurrency,
                batch_attempts: config.batch_attempts,
                backoff_base: config.backoff_base,
            },
        ));

        let admission = Admission::new(
            Arc::clone(&store),
            Arc::clone(&queue) as Arc<dyn FlowQueue>,
            lock,
            mac_secret,
            EnqueueLimits { max_pages: config.max_pages, max_series_end: config.max_series_end },
            config.batch_size,
        );
        let quota = QuotaEngine::new(Arc::clone(&kv), Arc::clone(&store));
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            ReaperOptions {
                stale_after: config.stale_after,
                failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
            },
        ));

        Ok(PrintService { config, admission, queue, quota, reaper, store, blobs, kv })
    }
}

impl Default for PrintServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PrintService {
    config: RenderConfig,
    admission: Admission,
    queue: Arc<InMemoryFlowQueue>,
    quota: QuotaEngine,
    reaper: Arc<Reaper>,
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    kv: Arc<dyn KvCache>,
}

impl PrintService {
    pub fn builder() -> PrintServiceBuilder {
        PrintServiceBuilder::new()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Admits a render request; see the scheduler crate for the semantics.
    pub async fn submit(
        &self,
        owner_id: &str,
        metadata: VectorMetadata,
    ) -> Result<AdmissionOutcome, SchedulerError> {
        self.admission.submit(owner_id, metadata).await
    }

    /// Current job record, for progress polling.
    pub async fn job_status(&self, job_id: &str) -> Result<Option<PrintJob>, StoreError> {
        self.store.load_job(job_id).await
    }

    /// A short-TTL signed URL for a job's output. DONE jobs always qualify;
    /// RUNNING jobs qualify during the brief pull-to-device window where an
    /// output is already materialized.
    pub async fn job_output_url(
        &self,
        job_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, ServiceError> {
        let Some(job) = self.store.load_job(job_id).await? else {
            return Ok(None);
        };
        let fetchable = matches!(job.status, JobStatus::Done | JobStatus::Running);
        let live = job.output.expires_at.is_none_or(|at| at > Utc::now());
        match job.output.key {
            Some(key) if fetchable && live => Ok(Some(self.blobs.signed_url(&key, ttl).await?)),
            _ => Ok(None),
        }
    }

    /// Consumes one print against the caller's grant.
    pub async fn consume_print(
        &self,
        document_id: &str,
        user_id: &str,
        request_id: &str,
    ) -> Result<QuotaOutcome, QuotaError> {
        self.quota.consume(document_id, user_id, request_id).await
    }

    /// Materializes (or reuses) the version-keyed export of a document in the
    /// given color mode, returning its blob key. The export is a copy of the
    /// stored artifact under the export namespace; bumping
    /// `export_version` invalidates prior copies.
    pub async fn materialize_export(
        &self,
        document_id: &str,
        mode: ColorMode,
    ) -> Result<String, ServiceError> {
        let document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownDocument(document_id.to_string()))?;

        let cache_key =
            imprint_traits::keys::final_pdf(document_id, document.export_version, &mode.to_string());
        if let Ok(Some(existing)) = self.kv.get(&cache_key).await {
            if self.blobs.exists(&existing).await {
                return Ok(existing);
            }
        }

        let export_key = format!(
            "documents/export/{}/{}/{}.pdf",
            document_id, document.export_version, mode
        );
        if !self.blobs.exists(&export_key).await {
            let bytes = self.blobs.get(&document.blob_key).await?;
            self.blobs.put(&export_key, bytes.as_ref().clone()).await?;
            info!("[EXPORT] materialized {export_key}");
        }
        // Best-effort cache; the blob existence check above keeps this safe
        // when the cache is lost.
        let _ = self
            .kv
            .set_nx_ex(&cache_key, &export_key, self.config.final_pdf_ttl)
            .await;
        Ok(export_key)
    }

    /// One reaper sweep, on demand.
    pub async fn run_reaper_once(&self) -> Result<ReaperReport, SchedulerError> {
        self.reaper.run_once().await
    }

    /// Starts the periodic reaper on the current runtime.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        let reaper = Arc::clone(&self.reaper);
        let interval = self.config.cleanup_interval;
        tokio::spawn(reaper.run(interval))
    }

    /// Waits for every in-flight render flow. Demo and test helper.
    pub async fn drain(&self) {
        self.queue.drain().await;
    }
}
