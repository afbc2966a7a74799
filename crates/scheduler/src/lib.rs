//! The render job scheduler.
//!
//! Admission acquires a per-document render lock and persists a durable job
//! record; the flow queue fans the job out into page batches and fans back in
//! through a merge step that produces exactly one final artifact. A periodic
//! reaper reclaims locks, stale jobs and expired outputs, so no failure mode
//! leaves state behind forever.

pub mod admission;
pub mod batch;
pub mod error;
pub mod lock;
pub mod merge;
pub mod queue;
pub mod reaper;
pub mod worker;

pub use admission::{Admission, AdmissionOutcome};
pub use error::SchedulerError;
pub use lock::{LockOutcome, RenderLock};
pub use queue::{
    BatchOutcome, BatchPayload, FlowProcessor, FlowQueue, InMemoryFlowQueue,
    InMemoryQueueOptions, MergeOutcome, MergePayload, QueueError, RenderFlowSpec, RenderedPage,
};
pub use reaper::{Reaper, ReaperOptions, ReaperReport};
pub use worker::{RenderOptions, RenderWorker};
