// --- Module Structure ---
// `config`:  All tunables with env-var overrides and documented defaults.
// `service`: The integration layer wiring stores, cache, queue and engines
//            into one `PrintService`.
// The heavy lifting lives in the workspace crates:
// `imprint-types`:     domain model, validation, payload MAC.
// `imprint-traits`:    collaborator seams + in-memory implementations.
// `imprint-layout`:    the deterministic vector layout engine.
// `imprint-scheduler`: render lock, admission, fan-out/fan-in, reaper.
// `imprint-quota`:     idempotent print-quota accounting.

mod config;
mod service;

// --- Public API ---

pub use crate::config::RenderConfig;
pub use crate::service::{PrintService, PrintServiceBuilder, ServiceError};

pub use imprint_quota::{QuotaEngine, QuotaError, QuotaOutcome};
pub use imprint_scheduler::{AdmissionOutcome, ReaperReport, SchedulerError};
pub use imprint_types::{
    ColorMode, DocumentAccess, DocumentRecord, JobStatus, PrintJob, VectorMetadata,
};
