//! The deterministic vector layout engine.
//!
//! A pure transformation from a vector specification plus source bytes to a
//! single A4 PDF page: the cropped source region is embedded once as a form
//! XObject, repeated across vertically tiled slots, then SVG/text watermarks
//! and arithmetically progressing serial numbers are stamped relative to each
//! slot's content box. Identical inputs produce byte-identical output.
//!
//! The engine performs no I/O. Source bytes arrive from the caller; SVG
//! sources go through the external converter seam after normalization.

pub mod cache;
pub mod engine;
pub mod fonts;
pub mod pdf;
pub mod slots;
pub mod svg;

pub use cache::LayoutCaches;
pub use engine::VectorLayoutEngine;
pub use fonts::BuiltinFont;
pub use pdf::assemble::{merge_pages, PdfAssembler};

use thiserror::Error;

/// Bytes every well-formed PDF must begin with.
pub const PDF_HEADER: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("source is neither a PDF nor an SVG document")]
    UnrecognizedSource,

    #[error("crop page {page} is out of range: source has {pages} page(s)")]
    PageOutOfRange { page: u32, pages: usize },

    #[error("SVG source has no viewBox and no usable width/height attributes")]
    SvgMissingViewBox,

    #[error("SVG contains forbidden construct: {0}")]
    SvgForbidden(String),

    #[error("SVG path data is invalid: {0}")]
    SvgPath(String),

    #[error("converted output does not begin with a PDF header")]
    BadPdfHeader,

    #[error("SVG conversion failed: {0}")]
    Convert(#[from] imprint_traits::ConvertError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("merge input for page {0} is missing")]
    MissingPage(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a byte buffer carries the PDF magic header.
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_HEADER)
}
