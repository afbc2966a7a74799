//! Slot grid math: how one cropped region tiles an A4 page.

use imprint_types::geometry::{self, ContentBox, Rect, A4_HEIGHT_PT, A4_WIDTH_PT, SAFE_MARGIN_PT};

/// One placement cell. Slots tile vertically, slot 0 at the bottom of the
/// usable area (PDF coordinates are bottom-up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// The full cell, before the crop is fitted into it.
    pub rect: Rect,
    /// Where the aspect-scaled crop actually lands inside the cell.
    pub content: ContentBox,
}

/// Computes the slot grid for a crop of `crop_w x crop_h` source points
/// repeated `repeat` times with `spacing` points between cells.
///
/// Spacing that would leave no room collapses to zero rather than failing.
/// The crop is scaled uniformly to fit and is top-aligned within its cell.
pub fn build_slot_grid(crop_w: f64, crop_h: f64, repeat: u32, spacing: f64) -> Vec<Slot> {
    let usable_h = A4_HEIGHT_PT - 2.0 * SAFE_MARGIN_PT;
    let slot_w = A4_WIDTH_PT - 2.0 * SAFE_MARGIN_PT;

    let count = repeat.max(1) as f64;
    let gap = if usable_h - (count - 1.0) * spacing <= 0.0 { 0.0 } else { spacing };
    let slot_h = (usable_h - (count - 1.0) * gap) / count;

    let scale = (slot_w / crop_w).min(slot_h / crop_h);

    (0..repeat.max(1))
        .map(|i| {
            let slot_x = SAFE_MARGIN_PT;
            let slot_y = SAFE_MARGIN_PT + i as f64 * (slot_h + gap);
            // Top-align: push the content box to the top edge of the cell.
            let draw_y = slot_y + (slot_h - crop_h * scale);
            let content = ContentBox {
                rect: Rect::new(slot_x, draw_y, crop_w * scale, crop_h * scale).snapped(),
                scale: geometry::snap(scale),
                object_width: crop_w,
                object_height: crop_h,
            };
            Slot {
                rect: Rect::new(slot_x, slot_y, slot_w, slot_h).snapped(),
                content,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_occupies_full_usable_area() {
        let slots = build_slot_grid(100.0, 100.0, 1, 0.0);
        assert_eq!(slots.len(), 1);
        let rect = slots[0].rect;
        assert_eq!(rect.x, SAFE_MARGIN_PT);
        assert_eq!(rect.y, SAFE_MARGIN_PT);
        assert!((rect.width - (A4_WIDTH_PT - 2.0 * SAFE_MARGIN_PT)).abs() < 0.001);
        assert!((rect.height - (A4_HEIGHT_PT - 2.0 * SAFE_MARGIN_PT)).abs() < 0.001);
    }

    #[test]
    fn four_slots_tile_without_overlap() {
        let slots = build_slot_grid(200.0, 100.0, 4, 10.0);
        assert_eq!(slots.len(), 4);
        for pair in slots.windows(2) {
            let below = pair[0].rect;
            let above = pair[1].rect;
            assert!((above.y - (below.y + below.height + 10.0)).abs() < 0.01);
        }
    }

    #[test]
    fn absurd_spacing_collapses_to_zero() {
        let usable = A4_HEIGHT_PT - 2.0 * SAFE_MARGIN_PT;
        let with_spacing = build_slot_grid(100.0, 100.0, 4, usable);
        let without = build_slot_grid(100.0, 100.0, 4, 0.0);
        assert_eq!(with_spacing[0].rect.height, without[0].rect.height);
    }

    #[test]
    fn content_is_top_aligned_and_aspect_preserved() {
        let slots = build_slot_grid(400.0, 100.0, 2, 0.0);
        for slot in &slots {
            let content = slot.content;
            // Top edges coincide.
            let slot_top = slot.rect.y + slot.rect.height;
            let content_top = content.rect.y + content.rect.height;
            assert!((slot_top - content_top).abs() < 0.01);
            // Aspect ratio preserved.
            let aspect = content.rect.width / content.rect.height;
            assert!((aspect - 4.0).abs() < 0.01);
        }
    }
}
