//! The vector render specification: the declarative description of how a
//! cropped region of a source document is repeated, stamped and serialized
//! onto A4 pages.
//!
//! Parsing happens once (serde), validation happens once, and typed values are
//! passed around thereafter. The watermark union is a tagged enum on `type`.

use crate::access::ColorMode;
use crate::color::Color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VectorMetadata {
    /// Either a blob key or `document:{id}` resolved through the metadata store.
    pub source_pdf_key: String,
    /// Optional override used for render-lock scoping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<ColorMode>,
    pub ticket_crop: TicketCrop,
    pub layout: LayoutSpec,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub watermarks: Vec<Watermark>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketCrop {
    pub page_index: u32,
    pub x_ratio: f64,
    pub y_ratio: f64,
    pub width_ratio: f64,
    pub height_ratio: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpec {
    pub page_size: PageSize,
    pub total_pages: u32,
    pub repeat_per_page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_spacing_pt: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PageSize {
    A4,
}

/// Arithmetic-progression overlay: `start, start+step, …` rendered as a
/// zero-padded, prefixed string at slot-relative positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_length: Option<u32>,
    pub start: i64,
    pub step: i64,
    #[serde(default = "default_font")]
    pub font: String,
    pub font_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    pub slots: Vec<SlotRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_font_sizes: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_offsets: Option<Vec<f64>>,
}

fn default_font() -> String {
    "Helvetica".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotRatio {
    pub x_ratio: f64,
    pub y_ratio: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelativeTo {
    /// Positioned inside each slot's content box, replicated per slot.
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Watermark {
    Text(TextWatermark),
    Svg(SvgWatermark),
}

impl Watermark {
    pub fn id(&self) -> &str {
        match self {
            Watermark::Text(w) => &w.id,
            Watermark::Svg(w) => &w.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextWatermark {
    #[serde(default)]
    pub id: String,
    pub value: String,
    #[serde(default = "default_font")]
    pub font_family: String,
    pub font_size: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub rotate: f64,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<RelativeTo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SvgWatermark {
    #[serde(default)]
    pub id: String,
    /// Inline SVG markup; only path-equivalent primitives survive sanitization.
    pub svg_path: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub rotate: f64,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<RelativeTo>,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_scale() -> f64 {
    1.0
}

// --- Validation ---

/// One schema violation, addressed by field path.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Additional bounds applied at enqueue time on top of the shared shape checks.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueLimits {
    pub max_pages: u32,
    pub max_series_end: i64,
}

impl Default for EnqueueLimits {
    fn default() -> Self {
        Self { max_pages: 700, max_series_end: 1_000_000_000 }
    }
}

impl VectorMetadata {
    /// The id the per-document render lock is scoped to.
    pub fn lock_document_id(&self) -> &str {
        self.document_id.as_deref().unwrap_or(&self.source_pdf_key)
    }

    /// Shape validation shared between pre-admission and the render worker.
    /// Collects every violation instead of bailing on the first.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if self.source_pdf_key.trim().is_empty() {
            issues.push(ValidationIssue::new("sourcePdfKey", "must not be empty"));
        }

        let crop = &self.ticket_crop;
        for (field, v) in [("ticketCrop.xRatio", crop.x_ratio), ("ticketCrop.yRatio", crop.y_ratio)] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                issues.push(ValidationIssue::new(field, "must be a ratio in [0, 1]"));
            }
        }
        for (field, v) in [
            ("ticketCrop.widthRatio", crop.width_ratio),
            ("ticketCrop.heightRatio", crop.height_ratio),
        ] {
            if !v.is_finite() || !(v > 0.0 && v <= 1.0) {
                issues.push(ValidationIssue::new(field, "must be a ratio in (0, 1]"));
            }
        }

        let layout = &self.layout;
        if layout.total_pages < 1 || layout.total_pages > 100_000 {
            issues.push(ValidationIssue::new("layout.totalPages", "must be in [1, 100000]"));
        }
        if layout.repeat_per_page < 1 || layout.repeat_per_page > 16 {
            issues.push(ValidationIssue::new("layout.repeatPerPage", "must be in [1, 16]"));
        }
        if let Some(g) = layout.slot_spacing_pt {
            if !g.is_finite() || g < 0.0 {
                issues.push(ValidationIssue::new("layout.slotSpacingPt", "must be >= 0"));
            }
        }

        for (i, series) in self.series.iter().enumerate() {
            let at = |f: &str| format!("series[{}].{}", i, f);
            if series.step < 1 {
                issues.push(ValidationIssue::new(at("step"), "must be >= 1"));
            }
            if !series.font_size.is_finite() || !(6.0..=72.0).contains(&series.font_size) {
                issues.push(ValidationIssue::new(at("fontSize"), "must be in [6, 72]"));
            }
            let slots = series.slots.len() as u32;
            if slots != 1 && slots != layout.repeat_per_page {
                issues.push(ValidationIssue::new(
                    at("slots"),
                    "length must be 1 or equal to repeatPerPage",
                ));
            }
            for (s, slot) in series.slots.iter().enumerate() {
                if !slot.x_ratio.is_finite() || !slot.y_ratio.is_finite() {
                    issues.push(ValidationIssue::new(
                        format!("series[{}].slots[{}]", i, s),
                        "ratios must be finite",
                    ));
                }
            }
        }

        for (i, wm) in self.watermarks.iter().enumerate() {
            let at = |f: &str| format!("watermarks[{}].{}", i, f);
            let (opacity, rotate, position) = match wm {
                Watermark::Text(w) => (w.opacity, w.rotate, w.position),
                Watermark::Svg(w) => (w.opacity, w.rotate, w.position),
            };
            if !opacity.is_finite() || !(0.0..=1.0).contains(&opacity) {
                issues.push(ValidationIssue::new(at("opacity"), "must be in [0, 1]"));
            }
            if !rotate.is_finite() {
                issues.push(ValidationIssue::new(at("rotate"), "must be a finite number"));
            }
            if !position.x.is_finite() || !position.y.is_finite() {
                issues.push(ValidationIssue::new(at("position"), "must be finite"));
            }
            match wm {
                Watermark::Text(w) => {
                    if w.value.is_empty() {
                        issues.push(ValidationIssue::new(at("value"), "must not be empty"));
                    }
                    if !w.font_size.is_finite() || w.font_size <= 0.0 {
                        issues.push(ValidationIssue::new(at("fontSize"), "must be > 0"));
                    }
                }
                Watermark::Svg(w) => {
                    if !w.svg_path.contains("<svg") && !w.svg_path.contains('<') {
                        issues.push(ValidationIssue::new(at("svgPath"), "must contain SVG markup"));
                    }
                    if !w.scale.is_finite() || w.scale <= 0.0 {
                        issues.push(ValidationIssue::new(at("scale"), "must be > 0"));
                    }
                }
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }

    /// Enqueue-time bounds: page cap and the series arithmetic end.
    pub fn validate_for_enqueue(&self, limits: &EnqueueLimits) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = match self.validate() {
            Ok(()) => Vec::new(),
            Err(v) => v,
        };

        if self.layout.total_pages > limits.max_pages {
            issues.push(ValidationIssue::new(
                "layout.totalPages",
                format!("must be <= {}", limits.max_pages),
            ));
        }

        let values_per_series =
            self.layout.total_pages as i64 * self.layout.repeat_per_page as i64;
        for (i, series) in self.series.iter().enumerate() {
            let end = series
                .step
                .checked_mul(values_per_series - 1)
                .and_then(|span| series.start.checked_add(span));
            match end {
                Some(end) if end <= limits.max_series_end => {}
                _ => issues.push(ValidationIssue::new(
                    format!("series[{}]", i),
                    format!("arithmetic end must be <= {}", limits.max_series_end),
                )),
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

impl Series {
    /// The rendered value for slot `slot` of page `page`.
    pub fn value_at(&self, page: u32, slot: u32, repeat_per_page: u32) -> String {
        let n = self.start + (page as i64 * repeat_per_page as i64 + slot as i64) * self.step;
        match self.pad_length {
            Some(width) => format!("{}{:0>width$}", self.prefix, n, width = width as usize),
            None => format!("{}{}", self.prefix, n),
        }
    }

    /// Slot ratios for slot `i`; a single entry applies to every slot.
    pub fn slot_ratio(&self, i: usize) -> SlotRatio {
        if self.slots.len() == 1 { self.slots[0] } else { self.slots[i] }
    }
}
