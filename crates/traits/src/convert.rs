//! The external SVG-to-PDF converter seam.
//!
//! Treated as a deterministic pure function from normalized SVG bytes to PDF
//! bytes; the production implementation spawns the converter process. The
//! layout engine only ever sees this trait.

use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConvertError {
    /// No converter is wired into this process.
    #[error("SVG converter is not available")]
    Missing,

    #[error("SVG conversion failed: {0}")]
    Failed(String),
}

pub trait SvgConverter: Send + Sync + Debug {
    fn convert(&self, svg: &[u8]) -> Result<Vec<u8>, ConvertError>;
}

/// Placeholder for deployments without a converter; every call fails with
/// [`ConvertError::Missing`], which renders SVG sources fatal for a job.
#[derive(Debug, Default)]
pub struct MissingConverter;

impl SvgConverter for MissingConverter {
    fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>, ConvertError> {
        Err(ConvertError::Missing)
    }
}

/// Test double: returns configured PDF bytes for any input and records the
/// number of conversions performed.
#[derive(Debug)]
pub struct FixedPdfConverter {
    pdf: Vec<u8>,
    calls: std::sync::atomic::AtomicUsize,
}

impl FixedPdfConverter {
    pub fn new(pdf: Vec<u8>) -> Self {
        Self { pdf, calls: std::sync::atomic::AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl SvgConverter for FixedPdfConverter {
    fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>, ConvertError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.pdf.clone())
    }
}
