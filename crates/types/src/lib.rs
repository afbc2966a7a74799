pub mod access;
pub mod color;
pub mod geometry;
pub mod job;
pub mod mac;
pub mod metadata;

pub use access::{ColorMode, DocumentAccess, DocumentRecord};
pub use color::Color;
pub use geometry::{ContentBox, Rect, A4_HEIGHT_PT, A4_WIDTH_PT, SAFE_MARGIN_PT};
pub use job::{AuditEntry, AuditEvent, JobErrorInfo, JobOutput, JobStatus, PrintJob};
pub use mac::{canonical_json, metadata_mac, verify_metadata_mac, MacError};
pub use metadata::{
    EnqueueLimits, LayoutSpec, PageSize, Position, RelativeTo, Series, SlotRatio, SvgWatermark,
    TextWatermark, TicketCrop, ValidationIssue, VectorMetadata, Watermark,
};
