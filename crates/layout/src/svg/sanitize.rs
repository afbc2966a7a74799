//! Watermark SVG sanitization: reduce arbitrary markup to bare path specs.
//!
//! Stricter than source normalization — only path-equivalent primitives
//! survive. Basic shapes are rewritten as path data, CSS classes from a
//! `<style>` block are inlined onto matching elements (style rules take
//! precedence over presentation attributes, as in CSS), and any `url(...)`
//! reference is fatal. Everything else is dropped.

use crate::LayoutError;
use imprint_types::Color;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// One drawable path with its resolved paint attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSpec {
    pub d: String,
    pub fill: Option<Color>,
    pub fill_opacity: f64,
    pub stroke: Option<Color>,
    pub stroke_opacity: f64,
    pub stroke_width: f64,
    pub line_cap: Option<LineCap>,
    pub line_join: Option<LineJoin>,
    pub dash_array: Vec<f64>,
    pub dash_offset: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

impl Default for PathSpec {
    fn default() -> Self {
        Self {
            d: String::new(),
            // SVG paints black unless told otherwise.
            fill: Some(Color::BLACK),
            fill_opacity: 1.0,
            stroke: None,
            stroke_opacity: 1.0,
            stroke_width: 1.0,
            line_cap: None,
            line_join: None,
            dash_array: Vec::new(),
            dash_offset: 0.0,
            opacity: 1.0,
        }
    }
}

const STYLE_ATTRS: [&str; 10] = [
    "fill",
    "fill-opacity",
    "stroke",
    "stroke-opacity",
    "stroke-width",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-dasharray",
    "stroke-dashoffset",
    "opacity",
];

static CLASS_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([A-Za-z_][A-Za-z0-9_-]*)\s*\{([^}]*)\}")
        .unwrap_or_else(|e| panic!("invalid class rule pattern: {e}"))
});

type ClassRules = HashMap<String, Vec<(String, String)>>;

fn parse_class_rules(css: &str) -> ClassRules {
    let mut rules: ClassRules = HashMap::new();
    for caps in CLASS_RULE.captures_iter(css) {
        let class = caps[1].to_string();
        let props = rules.entry(class).or_default();
        for decl in caps[2].split(';') {
            if let Some((name, value)) = decl.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                if STYLE_ATTRS.contains(&name.as_str()) {
                    props.push((name, value.trim().to_string()));
                }
            }
        }
    }
    rules
}

fn parse_number(attrs: &HashMap<String, String>, key: &str) -> f64 {
    attrs.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(0.0)
}

fn number_list(value: &str) -> Vec<f64> {
    value
        .split([' ', ',', '\t', '\n'])
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect()
}

/// Rewrites a basic shape as path data, or returns the `d` attribute for
/// `<path>` elements. `None` drops the element.
fn shape_to_path_data(element: &str, attrs: &HashMap<String, String>) -> Option<String> {
    match element {
        "path" => attrs.get("d").filter(|d| !d.trim().is_empty()).cloned(),
        "rect" => {
            let (x, y) = (parse_number(attrs, "x"), parse_number(attrs, "y"));
            let (w, h) = (parse_number(attrs, "width"), parse_number(attrs, "height"));
            (w > 0.0 && h > 0.0).then(|| {
                format!("M{} {} L{} {} L{} {} L{} {} Z", x, y, x + w, y, x + w, y + h, x, y + h)
            })
        }
        "circle" => {
            let (cx, cy, r) =
                (parse_number(attrs, "cx"), parse_number(attrs, "cy"), parse_number(attrs, "r"));
            (r > 0.0).then(|| ellipse_path(cx, cy, r, r))
        }
        "ellipse" => {
            let (cx, cy) = (parse_number(attrs, "cx"), parse_number(attrs, "cy"));
            let (rx, ry) = (parse_number(attrs, "rx"), parse_number(attrs, "ry"));
            (rx > 0.0 && ry > 0.0).then(|| ellipse_path(cx, cy, rx, ry))
        }
        "line" => {
            let (x1, y1) = (parse_number(attrs, "x1"), parse_number(attrs, "y1"));
            let (x2, y2) = (parse_number(attrs, "x2"), parse_number(attrs, "y2"));
            Some(format!("M{} {} L{} {}", x1, y1, x2, y2))
        }
        "polyline" | "polygon" => {
            let points = number_list(attrs.get("points")?.as_str());
            if points.len() < 4 {
                return None;
            }
            let mut d = format!("M{} {}", points[0], points[1]);
            for pair in points[2..].chunks_exact(2) {
                d.push_str(&format!(" L{} {}", pair[0], pair[1]));
            }
            if element == "polygon" {
                d.push_str(" Z");
            }
            Some(d)
        }
        _ => None,
    }
}

/// Approximates a full ellipse with two arc segments.
fn ellipse_path(cx: f64, cy: f64, rx: f64, ry: f64) -> String {
    format!(
        "M{} {} A{} {} 0 1 0 {} {} A{} {} 0 1 0 {} {} Z",
        cx - rx,
        cy,
        rx,
        ry,
        cx + rx,
        cy,
        rx,
        ry,
        cx - rx,
        cy
    )
}

fn collect_attributes(start: &BytesStart<'_>) -> Result<HashMap<String, String>, LayoutError> {
    let mut attrs = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| LayoutError::SvgPath(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = attr
            .unescape_value()
            .map_err(|e| LayoutError::SvgPath(e.to_string()))?
            .to_string();
        if value.contains("url(") {
            return Err(LayoutError::SvgForbidden("url(".to_string()));
        }
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn apply_style(spec: &mut PathSpec, name: &str, value: &str) {
    let value = value.trim();
    match name {
        "fill" => {
            spec.fill = if value.eq_ignore_ascii_case("none") {
                None
            } else {
                Color::parse(value).ok().or(spec.fill)
            }
        }
        "stroke" => {
            spec.stroke = if value.eq_ignore_ascii_case("none") {
                None
            } else {
                Color::parse(value).ok().or(spec.stroke)
            }
        }
        "fill-opacity" => spec.fill_opacity = value.parse().unwrap_or(1.0),
        "stroke-opacity" => spec.stroke_opacity = value.parse().unwrap_or(1.0),
        "stroke-width" => spec.stroke_width = value.parse().unwrap_or(1.0),
        "stroke-linecap" => {
            spec.line_cap = match value {
                "butt" => Some(LineCap::Butt),
                "round" => Some(LineCap::Round),
                "square" => Some(LineCap::Square),
                _ => None,
            }
        }
        "stroke-linejoin" => {
            spec.line_join = match value {
                "miter" => Some(LineJoin::Miter),
                "round" => Some(LineJoin::Round),
                "bevel" => Some(LineJoin::Bevel),
                _ => None,
            }
        }
        "stroke-dasharray" => {
            spec.dash_array = if value.eq_ignore_ascii_case("none") {
                Vec::new()
            } else {
                number_list(value)
            }
        }
        "stroke-dashoffset" => spec.dash_offset = value.parse().unwrap_or(0.0),
        "opacity" => spec.opacity = value.parse::<f64>().unwrap_or(1.0).clamp(0.0, 1.0),
        _ => {}
    }
}

/// Reduces a watermark SVG to its drawable path specs.
pub fn sanitize_watermark_svg(svg: &str) -> Result<Vec<PathSpec>, LayoutError> {
    if svg.contains("url(") {
        return Err(LayoutError::SvgForbidden("url(".to_string()));
    }

    // First pass: collect CSS class rules so later elements can use earlier
    // or later <style> blocks alike.
    let mut css = String::new();
    let mut reader = Reader::from_str(svg);
    let mut in_style = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"style" => in_style = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"style" => in_style = false,
            Ok(Event::Text(t)) if in_style => {
                css.push_str(&t.unescape().map_err(|e| LayoutError::SvgPath(e.to_string()))?);
            }
            Ok(Event::CData(t)) if in_style => {
                css.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LayoutError::SvgPath(e.to_string())),
            _ => {}
        }
    }
    let rules = parse_class_rules(&css);

    // Second pass: retain path-equivalent primitives only.
    let mut specs = Vec::new();
    let mut reader = Reader::from_str(svg);
    loop {
        let event = match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => e.into_owned(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(LayoutError::SvgPath(e.to_string())),
            _ => continue,
        };
        let element = String::from_utf8_lossy(event.local_name().as_ref()).to_string();
        let attrs = collect_attributes(&event)?;
        let Some(d) = shape_to_path_data(&element, &attrs) else {
            continue;
        };

        let mut spec = PathSpec { d, ..PathSpec::default() };
        for name in STYLE_ATTRS {
            if let Some(value) = attrs.get(name) {
                apply_style(&mut spec, name, value);
            }
        }
        // Class rules win over presentation attributes.
        if let Some(class_list) = attrs.get("class") {
            for class in class_list.split_whitespace() {
                if let Some(props) = rules.get(class) {
                    for (name, value) in props {
                        apply_style(&mut spec, name, value);
                    }
                }
            }
        }
        specs.push(spec);
    }
    Ok(specs)
}
