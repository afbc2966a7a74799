//! SVG handling: source normalization before external conversion, and the
//! stricter path-only sanitization applied to watermark SVGs.

pub mod normalize;
pub mod path;
pub mod sanitize;

pub use normalize::normalize_source_svg;
pub use path::path_operations;
pub use sanitize::{sanitize_watermark_svg, PathSpec};
