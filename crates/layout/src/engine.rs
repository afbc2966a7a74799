//! The engine entry point: one metadata + source bytes in, one page out.

use crate::cache::{content_key, LayoutCaches, PreparedSource};
use crate::fonts::BuiltinFont;
use crate::pdf::composer::{Matrix, PageComposer};
use crate::pdf::embed;
use crate::slots::{build_slot_grid, Slot};
use crate::svg::normalize::normalize_source_svg;
use crate::svg::sanitize::sanitize_watermark_svg;
use crate::{has_pdf_header, LayoutError};
use imprint_traits::SvgConverter;
use imprint_types::geometry::{A4_HEIGHT_PT, A4_WIDTH_PT};
use imprint_types::metadata::{
    Position, RelativeTo, Series, SvgWatermark, TextWatermark, VectorMetadata, Watermark,
};
use imprint_types::Color;
use log::debug;
use lopdf::Document;
use std::sync::Arc;

pub struct VectorLayoutEngine {
    converter: Arc<dyn SvgConverter>,
    caches: LayoutCaches,
}

impl VectorLayoutEngine {
    pub fn new(converter: Arc<dyn SvgConverter>) -> Self {
        Self { converter, caches: LayoutCaches::default() }
    }

    pub fn with_cache_capacity(converter: Arc<dyn SvgConverter>, capacity: usize) -> Self {
        Self { converter, caches: LayoutCaches::new(capacity) }
    }

    /// Renders page `page_index` of the specification as a standalone
    /// single-page A4 PDF. Pure: identical inputs yield identical bytes.
    pub fn render_page(
        &self,
        metadata: &VectorMetadata,
        source: &[u8],
        page_index: u32,
    ) -> Result<Vec<u8>, LayoutError> {
        let prepared = self.prepare_source(source)?;
        let src_doc = &prepared.doc;

        let crop = &metadata.ticket_crop;
        let (box_x, box_y, src_w, src_h) = embed::page_box(src_doc, crop.page_index)?;

        let crop_x = crop.x_ratio * src_w;
        let crop_y = crop.y_ratio * src_h;
        let crop_w = crop.width_ratio * src_w;
        let crop_h = crop.height_ratio * src_h;

        // Clipping box in source page space; cropY is measured from the top.
        let left = box_x + crop_x;
        let bottom = box_y + src_h - crop_y - crop_h;
        let bbox = [left, bottom, left + crop_w, bottom + crop_h];

        let spacing = metadata.layout.slot_spacing_pt.unwrap_or(0.0);
        let slots = build_slot_grid(crop_w, crop_h, metadata.layout.repeat_per_page, spacing);

        let mut composer = PageComposer::new(A4_WIDTH_PT, A4_HEIGHT_PT);
        let form_id =
            embed::embed_page_as_form(composer.document_mut(), src_doc, crop.page_index, bbox)?;
        let form_name = composer.register_form(form_id);

        for slot in &slots {
            let content = slot.content;
            let s = content.scale;
            let placement = Matrix::scale(s, s).then(Matrix::translate(
                content.rect.x - left * s,
                content.rect.y - bottom * s,
            ));
            composer.draw_form(&form_name, placement);
        }

        for watermark in &metadata.watermarks {
            match watermark {
                Watermark::Svg(w) => self.draw_svg_watermark(&mut composer, w, &slots)?,
                Watermark::Text(w) => draw_text_watermark(&mut composer, w, &slots),
            }
        }

        for series in &metadata.series {
            draw_series(
                &mut composer,
                series,
                page_index,
                metadata.layout.repeat_per_page,
                &slots,
            );
        }

        debug!(
            "[LAYOUT] page {} composed: {} slot(s), {} watermark(s), {} series",
            page_index,
            slots.len(),
            metadata.watermarks.len(),
            metadata.series.len()
        );
        composer.finish()
    }

    /// Loads (and for SVG, normalizes + converts) the source, caching by the
    /// SHA-256 of the raw input bytes.
    fn prepare_source(&self, bytes: &[u8]) -> Result<Arc<PreparedSource>, LayoutError> {
        let key = content_key(bytes);
        if let Some(hit) = self.caches.source(&key) {
            return Ok(hit);
        }

        let doc = if has_pdf_header(bytes) {
            Document::load_mem(bytes)?
        } else if looks_like_svg(bytes) {
            let text = String::from_utf8_lossy(bytes);
            let normalized = normalize_source_svg(&text)?;
            let converted = self.converter.convert(normalized.as_bytes())?;
            if !has_pdf_header(&converted) {
                return Err(LayoutError::BadPdfHeader);
            }
            Document::load_mem(&converted)?
        } else {
            return Err(LayoutError::UnrecognizedSource);
        };

        let prepared = Arc::new(PreparedSource { doc });
        self.caches.store_source(key, Arc::clone(&prepared));
        Ok(prepared)
    }

    fn draw_svg_watermark(
        &self,
        composer: &mut PageComposer,
        watermark: &SvgWatermark,
        slots: &[Slot],
    ) -> Result<(), LayoutError> {
        let key = content_key(watermark.svg_path.as_bytes());
        let paths = match self.caches.watermark(&key) {
            Some(hit) => hit,
            None => {
                let parsed = Arc::new(sanitize_watermark_svg(&watermark.svg_path)?);
                self.caches.store_watermark(key, Arc::clone(&parsed));
                parsed
            }
        };

        for (x, y) in anchor_points(watermark.relative_to, watermark.position, slots) {
            // Path data is y-down SVG space; the flip happens in the matrix.
            let placement = Matrix::scale(watermark.scale, -watermark.scale)
                .then(Matrix::rotate_deg(watermark.rotate))
                .then(Matrix::translate(x, y));
            composer.draw_paths(&paths, watermark.opacity, placement)?;
        }
        Ok(())
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    bytes.windows(4).take(4096).any(|w| w == b"<svg")
}

/// Page-point anchor for a watermark: replicated per content box for
/// object-relative placement (top-down ratio flipped to bottom-up points),
/// otherwise the given absolute point.
fn anchor_points(
    relative_to: Option<RelativeTo>,
    position: Position,
    slots: &[Slot],
) -> Vec<(f64, f64)> {
    match relative_to {
        Some(RelativeTo::Object) => slots
            .iter()
            .map(|slot| {
                let rect = slot.content.rect;
                (
                    rect.x + position.x * rect.width,
                    rect.y + (1.0 - position.y) * rect.height,
                )
            })
            .collect(),
        None => vec![(position.x, position.y)],
    }
}

fn draw_text_watermark(composer: &mut PageComposer, watermark: &TextWatermark, slots: &[Slot]) {
    let font = BuiltinFont::resolve(&watermark.font_family);
    let color = watermark.color.unwrap_or(Color::BLACK);
    for (x, y) in anchor_points(watermark.relative_to, watermark.position, slots) {
        let baseline_y = y - font.ascent_pt(watermark.font_size);
        let placement =
            Matrix::rotate_deg(watermark.rotate).then(Matrix::translate(x, baseline_y));
        composer.draw_text(
            font,
            watermark.font_size,
            color,
            watermark.opacity,
            placement,
            &watermark.value,
        );
    }
}

fn draw_series(
    composer: &mut PageComposer,
    series: &Series,
    page_index: u32,
    repeat_per_page: u32,
    slots: &[Slot],
) {
    let font = BuiltinFont::resolve(&series.font);
    let color = series.color.unwrap_or(Color::BLACK);

    for (i, slot) in slots.iter().enumerate() {
        let value = series.value_at(page_index, i as u32, repeat_per_page);
        let ratios = series.slot_ratio(i);
        let content = slot.content;
        let s = content.scale;

        // Series ratios address the object's own bounding box in source
        // points; the baseline drops by the ascender from the anchor.
        let draw_x = content.rect.x + ratios.x_ratio * content.object_width * s;
        let baseline_in_object =
            ratios.y_ratio * content.object_height + font.ascent_pt(series.font_size);
        let object_top = content.rect.y + content.object_height * s;
        let draw_y = object_top - baseline_in_object * s;
        let draw_size = series.font_size * s;

        match series.letter_font_sizes.as_deref() {
            None | Some([]) => {
                composer.draw_text(
                    font,
                    draw_size,
                    color,
                    1.0,
                    Matrix::translate(draw_x, draw_y),
                    &value,
                );
            }
            Some(sizes) => {
                let offsets = series.letter_offsets.as_deref().unwrap_or(&[]);
                let mut cursor = draw_x;
                let mut glyph = [0u8; 4];
                for (k, ch) in value.chars().enumerate() {
                    let letter_size = sizes[k % sizes.len()] * s;
                    let lift = if offsets.is_empty() { 0.0 } else { offsets[k % offsets.len()] * s };
                    composer.draw_text(
                        font,
                        letter_size,
                        color,
                        1.0,
                        Matrix::translate(cursor, draw_y + lift),
                        ch.encode_utf8(&mut glyph),
                    );
                    cursor += font.width_of(ch.encode_utf8(&mut glyph), letter_size);
                }
            }
        }
    }
}
