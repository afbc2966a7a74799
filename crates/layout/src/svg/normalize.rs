//! Canonicalization of SVG sources before the external converter runs.
//!
//! The converter is treated as a pure function, so everything that could make
//! its output vary (viewport ambiguity, scripting, external references) is
//! resolved or rejected here. The result always has an A4 viewport with the
//! original drawing centered and uniformly scaled inside it.

use crate::LayoutError;
use imprint_types::geometry::{snap, A4_HEIGHT_PT, A4_WIDTH_PT};
use regex::Regex;
use std::sync::LazyLock;

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<svg\b[^>]*>").unwrap_or_else(|e| panic!("invalid svg open pattern: {e}"))
});

static VIEW_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"viewBox\s*=\s*["']([^"']+)["']"#)
        .unwrap_or_else(|e| panic!("invalid viewBox pattern: {e}"))
});

static DIMENSION: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    let attr = |name: &str| {
        Regex::new(&format!(
            r#"{name}\s*=\s*["']\s*([0-9]+(?:\.[0-9]+)?)\s*(?:pt)?\s*["']"#
        ))
        .unwrap_or_else(|e| panic!("invalid dimension pattern: {e}"))
    };
    [attr("width"), attr("height")]
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap_or_else(|e| panic!("invalid handler pattern: {e}"))
});

/// Constructs the engine refuses to hand to the converter. Any hit is fatal.
const FORBIDDEN: [&str; 8] = [
    "<script",
    "<foreignObject",
    "<image",
    "<use",
    "href=",
    "xlink:href",
    "url(",
    "javascript:",
];

/// Scans for constructs that must never reach the converter.
fn scan_forbidden(svg: &str) -> Result<(), LayoutError> {
    for needle in FORBIDDEN {
        if svg.contains(needle) {
            return Err(LayoutError::SvgForbidden(needle.to_string()));
        }
    }
    // `data:` URLs are forbidden, but plain attribute names like
    // `data-id` are not; check for the URL scheme form.
    if svg.contains("data:") {
        return Err(LayoutError::SvgForbidden("data:".to_string()));
    }
    if EVENT_HANDLER.is_match(svg) {
        return Err(LayoutError::SvgForbidden("inline event handler".to_string()));
    }
    Ok(())
}

fn fmt_num(v: f64) -> String {
    let snapped = snap(v);
    if snapped == snapped.trunc() {
        format!("{}", snapped as i64)
    } else {
        let s = format!("{:.3}", snapped);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Normalizes one SVG source document for conversion.
pub fn normalize_source_svg(svg: &str) -> Result<String, LayoutError> {
    scan_forbidden(svg)?;

    let open = OPEN_TAG.find(svg).ok_or(LayoutError::UnrecognizedSource)?;
    let open_tag = open.as_str();

    let (vb_x, vb_y, vb_w, vb_h) = match VIEW_BOX.captures(open_tag) {
        Some(caps) => {
            let parts: Vec<f64> = caps[1]
                .split([' ', ','])
                .filter(|p| !p.is_empty())
                .filter_map(|p| p.parse().ok())
                .collect();
            match parts.as_slice() {
                [x, y, w, h] if *w > 0.0 && *h > 0.0 => (*x, *y, *w, *h),
                _ => return Err(LayoutError::SvgMissingViewBox),
            }
        }
        None => {
            // Derive from width/height; only raw numbers or pt units count.
            let [width_re, height_re] = &*DIMENSION;
            let w: f64 = width_re
                .captures(open_tag)
                .and_then(|c| c[1].parse().ok())
                .ok_or(LayoutError::SvgMissingViewBox)?;
            let h: f64 = height_re
                .captures(open_tag)
                .and_then(|c| c[1].parse().ok())
                .ok_or(LayoutError::SvgMissingViewBox)?;
            if w <= 0.0 || h <= 0.0 {
                return Err(LayoutError::SvgMissingViewBox);
            }
            (0.0, 0.0, w, h)
        }
    };

    let scale = (A4_WIDTH_PT / vb_w).min(A4_HEIGHT_PT / vb_h);
    let tx = -vb_x * scale + (A4_WIDTH_PT - vb_w * scale) / 2.0;
    let ty = -vb_y * scale + (A4_HEIGHT_PT - vb_h * scale) / 2.0;

    let body_start = open.end();
    let body_end = svg.rfind("</svg>").unwrap_or(svg.len());
    let children = &svg[body_start..body_end];

    let mut out = String::with_capacity(svg.len() + 256);
    out.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}pt" height="{h}pt">"#,
        w = fmt_num(A4_WIDTH_PT),
        h = fmt_num(A4_HEIGHT_PT),
    ));
    out.push_str("<style>*{vector-effect:non-scaling-stroke;}</style>");
    out.push_str(&format!(
        r#"<g id="A4_NORMALIZED_ROOT" transform="translate({tx} {ty}) scale({s})">"#,
        tx = fmt_num(tx),
        ty = fmt_num(ty),
        s = fmt_num(scale),
    ));
    out.push_str(children);
    out.push_str("</g></svg>");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_and_scales_a_square_viewbox() {
        let svg = r#"<svg viewBox="0 0 100 100"><rect x="1" y="1" width="5" height="5"/></svg>"#;
        let out = normalize_source_svg(svg).unwrap();
        // scale = min(595.28/100, 841.89/100) = 5.9528
        assert!(out.contains(r#"viewBox="0 0 595.28 841.89""#));
        assert!(out.contains("scale(5.953)") || out.contains("scale(5.952"));
        assert!(out.contains(r#"id="A4_NORMALIZED_ROOT""#));
        assert!(out.contains("vector-effect:non-scaling-stroke"));
        assert!(out.contains(r#"<rect x="1" y="1" width="5" height="5"/>"#));
    }

    #[test]
    fn derives_viewbox_from_pt_dimensions() {
        let svg = r#"<svg width="595.28pt" height="841.89pt"><path d="M0 0"/></svg>"#;
        let out = normalize_source_svg(svg).unwrap();
        assert!(out.contains("translate(0 0) scale(1)"));
    }

    #[test]
    fn rejects_missing_viewbox_and_percent_units() {
        assert!(matches!(
            normalize_source_svg("<svg><path d=\"M0 0\"/></svg>"),
            Err(LayoutError::SvgMissingViewBox)
        ));
        assert!(matches!(
            normalize_source_svg(r#"<svg width="100%" height="100%"/>"#),
            Err(LayoutError::SvgMissingViewBox)
        ));
    }

    #[test]
    fn rejects_scripting_and_references() {
        for bad in [
            r#"<svg viewBox="0 0 1 1"><script>alert(1)</script></svg>"#,
            r##"<svg viewBox="0 0 1 1"><use href="#x"/></svg>"##,
            r#"<svg viewBox="0 0 1 1"><image xlink:href="x.png"/></svg>"#,
            r#"<svg viewBox="0 0 1 1"><rect fill="url(#grad)"/></svg>"#,
            r#"<svg viewBox="0 0 1 1" onload="evil()"><rect/></svg>"#,
            r#"<svg viewBox="0 0 1 1"><a xlink:href="javascript:x"/></svg>"#,
        ] {
            assert!(
                matches!(normalize_source_svg(bad), Err(LayoutError::SvgForbidden(_))),
                "expected rejection: {bad}"
            );
        }
    }
}
