//! The quota consumption engine.
//!
//! Two-tier accounting: a fast cached counter enforces the cap under
//! concurrency, the durable store stays authoritative. A request id makes
//! consumption at-most-once over a short replay window, and every cache
//! failure degrades to a conditional durable update that preserves the
//! `prints_used <= print_quota` invariant.

mod engine;

pub use engine::{QuotaEngine, QuotaError, QuotaOutcome, REQUEST_TTL};
