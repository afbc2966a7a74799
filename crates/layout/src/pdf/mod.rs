//! lopdf-backed page assembly: cross-document object import, form-XObject
//! crop embedding, the single-page composer, and final ordered merge.

pub mod assemble;
pub mod composer;
pub mod embed;
pub mod importer;

pub use assemble::{merge_pages, PdfAssembler};
pub use composer::{Matrix, PageComposer};
pub use importer::ObjectImporter;
