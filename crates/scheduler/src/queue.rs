//! The flow queue seam: at-least-once dispatch with parent/child semantics.
//!
//! A render flow is `ceil(totalPages / batchSize)` batch children plus one
//! merge parent. The queue guarantees the parent observes every child's
//! return value and never runs before all children resolve. Batch children
//! retry with exponential backoff; the terminal failure hook fires exactly
//! once per job.

use crate::error::SchedulerError;
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue dispatch failed: {0}")]
    Dispatch(String),
}

/// Child contract: render pages `[start_page, end_page)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub print_job_id: String,
    /// Plumbed explicitly so workers never have to re-derive it.
    pub document_id: String,
    pub start_page: u32,
    pub end_page: u32,
    pub total_pages: u32,
}

/// Parent contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergePayload {
    pub print_job_id: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub page_index: u32,
    pub pdf_base64: String,
}

/// A batch child's return value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BatchOutcome {
    /// The job was observed EXPIRED; no side effects happened.
    Skipped { skipped: bool },
    Pages { pages: Vec<RenderedPage> },
}

impl BatchOutcome {
    pub fn skipped() -> Self {
        BatchOutcome::Skipped { skipped: true }
    }
}

/// The merge parent's return value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MergeOutcome {
    Skipped { skipped: bool },
    Done { ok: bool, key: String },
}

/// Everything needed to enqueue one render flow.
#[derive(Debug, Clone)]
pub struct RenderFlowSpec {
    pub print_job_id: String,
    pub document_id: String,
    pub total_pages: u32,
    pub batch_size: u32,
}

impl RenderFlowSpec {
    /// The `[start, end)` page ranges of the child jobs.
    pub fn batch_ranges(&self) -> Vec<(u32, u32)> {
        let size = self.batch_size.max(1);
        (0..self.total_pages)
            .step_by(size as usize)
            .map(|start| (start, (start + size).min(self.total_pages)))
            .collect()
    }
}

/// The worker side of the queue: executes batch and merge steps and
/// terminalizes jobs on final failure.
#[async_trait]
pub trait FlowProcessor: Send + Sync + 'static {
    async fn process_batch(&self, payload: &BatchPayload)
        -> Result<BatchOutcome, SchedulerError>;

    async fn process_merge(
        &self,
        payload: &MergePayload,
        children: Vec<BatchOutcome>,
    ) -> Result<MergeOutcome, SchedulerError>;

    /// Fired once, after the final failed attempt of a batch child.
    async fn batch_failed(&self, payload: &BatchPayload, queue_job_id: &str, error: &SchedulerError);

    /// Fired when the merge parent fails.
    async fn merge_failed(&self, payload: &MergePayload, queue_job_id: &str, error: &SchedulerError);
}

#[async_trait]
pub trait FlowQueue: Send + Sync + Debug {
    /// Dispatches the flow; returns a queue-side flow id.
    async fn enqueue_render_flow(&self, spec: RenderFlowSpec) -> Result<String, QueueError>;
}

// --- In-memory implementation ---

#[derive(Debug, Clone)]
pub struct InMemoryQueueOptions {
    /// Concurrent job-steps across the whole queue (workers x concurrency 1).
    pub concurrency: usize,
    /// Attempts per batch child.
    pub batch_attempts: u32,
    /// Base delay of the exponential backoff between attempts.
    pub backoff_base: Duration,
}

impl Default for InMemoryQueueOptions {
    fn default() -> Self {
        Self { concurrency: 4, batch_attempts: 3, backoff_base: Duration::from_secs(2) }
    }
}

/// Tokio-task queue with the same flow semantics as the production queue:
/// children run in parallel under a concurrency cap, the parent runs only
/// after every child resolves, and a child's terminal failure cancels the
/// parent.
pub struct InMemoryFlowQueue {
    processor: Arc<dyn FlowProcessor>,
    semaphore: Arc<Semaphore>,
    options: InMemoryQueueOptions,
    flows: Mutex<HashMap<String, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Debug for InMemoryFlowQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFlowQueue")
            .field("concurrency", &self.options.concurrency)
            .finish()
    }
}

impl InMemoryFlowQueue {
    pub fn new(processor: Arc<dyn FlowProcessor>, options: InMemoryQueueOptions) -> Self {
        let permits = options.concurrency.max(1);
        Self {
            processor,
            semaphore: Arc::new(Semaphore::new(permits)),
            options,
            flows: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Waits for one flow to finish. Test and shutdown helper.
    pub async fn await_flow(&self, flow_id: &str) {
        let handle = self.flows.lock().ok().and_then(|mut f| f.remove(flow_id));
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("[QUEUE] flow {flow_id} join error: {e}");
            }
        }
    }

    /// Waits for every in-flight flow.
    pub async fn drain(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = match self.flows.lock() {
            Ok(mut flows) => flows.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (flow_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!("[QUEUE] flow {flow_id} join error: {e}");
            }
        }
    }

    fn next_queue_job_id(&self, kind: &str) -> String {
        format!("{kind}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn run_batch_child(
        processor: Arc<dyn FlowProcessor>,
        semaphore: Arc<Semaphore>,
        options: InMemoryQueueOptions,
        payload: BatchPayload,
        queue_job_id: String,
    ) -> Result<BatchOutcome, SchedulerError> {
        let attempts = options.batch_attempts.max(1);
        for attempt in 1..=attempts {
            // The semaphore is never closed; a failed acquire just means the
            // step runs without a permit.
            let permit = semaphore.acquire().await.ok();
            let result = processor.process_batch(&payload).await;
            drop(permit);

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    let backoff = options.backoff_base * 2u32.pow(attempt - 1);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                    warn!(
                        "[QUEUE] batch {queue_job_id} attempt {attempt}/{attempts} failed ({error}); retrying in {:?}",
                        backoff + jitter
                    );
                    tokio::time::sleep(backoff + jitter).await;
                }
                Err(error) => {
                    processor.batch_failed(&payload, &queue_job_id, &error).await;
                    return Err(error);
                }
            }
        }
        unreachable!("batch retry loop always returns")
    }
}

#[async_trait]
impl FlowQueue for InMemoryFlowQueue {
    async fn enqueue_render_flow(&self, spec: RenderFlowSpec) -> Result<String, QueueError> {
        let flow_id = self.next_queue_job_id("flow");
        let merge_job_id = self.next_queue_job_id("merge");
        let processor = Arc::clone(&self.processor);
        let semaphore = Arc::clone(&self.semaphore);
        let options = self.options.clone();

        let batch_children: Vec<(BatchPayload, String)> = spec
            .batch_ranges()
            .into_iter()
            .map(|(start_page, end_page)| {
                (
                    BatchPayload {
                        print_job_id: spec.print_job_id.clone(),
                        document_id: spec.document_id.clone(),
                        start_page,
                        end_page,
                        total_pages: spec.total_pages,
                    },
                    self.next_queue_job_id("batch"),
                )
            })
            .collect();

        info!(
            "[QUEUE] flow {flow_id}: {} batch child(ren) + merge for job {}",
            batch_children.len(),
            spec.print_job_id
        );

        let flow = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(batch_children.len());
            for (payload, queue_job_id) in batch_children {
                handles.push(tokio::spawn(Self::run_batch_child(
                    Arc::clone(&processor),
                    Arc::clone(&semaphore),
                    options.clone(),
                    payload,
                    queue_job_id,
                )));
            }

            let mut outcomes = Vec::with_capacity(handles.len());
            let mut failed = false;
            for handle in handles {
                match handle.await {
                    Ok(Ok(outcome)) => outcomes.push(outcome),
                    Ok(Err(_)) => failed = true,
                    Err(e) => {
                        warn!("[QUEUE] batch child panicked: {e}");
                        failed = true;
                    }
                }
            }
            if failed {
                debug!("[QUEUE] skipping merge for {}: child failed", spec.print_job_id);
                return;
            }

            let payload = MergePayload {
                print_job_id: spec.print_job_id.clone(),
                document_id: spec.document_id.clone(),
            };
            let permit = semaphore.acquire().await.ok();
            if let Err(error) = processor.process_merge(&payload, outcomes).await {
                processor.merge_failed(&payload, &merge_job_id, &error).await;
            }
            drop(permit);
        });

        if let Ok(mut flows) = self.flows.lock() {
            flows.insert(flow_id.clone(), flow);
        }
        Ok(flow_id)
    }
}
