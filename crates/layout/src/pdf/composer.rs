//! Builds one output page as a self-contained single-page PDF.
//!
//! Operations accumulate into a content stream; fonts, form XObjects and
//! transparency graphics states register themselves in the page resources on
//! first use. Object ids are allocated in call order, so the serialized bytes
//! are a pure function of the drawing sequence.

use crate::fonts::BuiltinFont;
use crate::svg::sanitize::{LineCap, LineJoin, PathSpec};
use crate::svg::path::path_operations;
use crate::LayoutError;
use imprint_types::geometry::snap;
use imprint_types::Color;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Cursor;

/// A 2D affine transform in PDF operand order `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self { e: tx, f: ty, ..Self::identity() }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::identity() }
    }

    pub fn rotate_deg(degrees: f64) -> Self {
        let radians = degrees.to_radians();
        let (sin, cos) = radians.sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// Composition: apply `self` first, then `after`.
    pub fn then(self, after: Matrix) -> Matrix {
        Matrix {
            a: self.a * after.a + self.b * after.c,
            b: self.a * after.b + self.b * after.d,
            c: self.c * after.a + self.d * after.c,
            d: self.c * after.b + self.d * after.d,
            e: self.e * after.a + self.f * after.c + after.e,
            f: self.e * after.b + self.f * after.d + after.f,
        }
    }

    fn operands(&self) -> Vec<Object> {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .map(|v| (snap(*v) as f32).into())
            .collect()
    }
}

/// WinAnsi (CP-1252) encoding with `?` for unmappable characters.
fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            0x20..=0x7E => ch as u8,
            0xA0..=0xFF => ch as u8,
            _ => match ch {
                '\u{20AC}' => 0x80,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{2122}' => 0x99,
                _ => b'?',
            },
        })
        .collect()
}

pub struct PageComposer {
    doc: Document,
    pages_id: ObjectId,
    ops: Vec<Operation>,
    fonts: Vec<(BuiltinFont, String)>,
    xobjects: Vec<(String, ObjectId)>,
    gstates: Vec<(u32, String)>,
    page_width: f64,
    page_height: f64,
}

impl PageComposer {
    pub fn new(page_width: f64, page_height: f64) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            ops: Vec::new(),
            fonts: Vec::new(),
            xobjects: Vec::new(),
            gstates: Vec::new(),
            page_width,
            page_height,
        }
    }

    /// The underlying document, for embedding objects (form XObjects).
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Registers an already-added form XObject and returns its resource name.
    pub fn register_form(&mut self, id: ObjectId) -> String {
        let name = format!("Fm{}", self.xobjects.len() + 1);
        self.xobjects.push((name.clone(), id));
        name
    }

    fn ensure_font(&mut self, font: BuiltinFont) -> String {
        if let Some((_, name)) = self.fonts.iter().find(|(f, _)| *f == font) {
            return name.clone();
        }
        let name = format!("F{}", self.fonts.len() + 1);
        self.fonts.push((font, name.clone()));
        name
    }

    /// Transparency state for a given constant alpha; `None` when fully opaque.
    fn ensure_gstate(&mut self, opacity: f64) -> Option<String> {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity >= 1.0 {
            return None;
        }
        let key = (opacity * 1000.0).round() as u32;
        if let Some((_, name)) = self.gstates.iter().find(|(k, _)| *k == key) {
            return Some(name.clone());
        }
        let name = format!("GS{}", self.gstates.len() + 1);
        self.gstates.push((key, name.clone()));
        Some(name)
    }

    pub fn draw_form(&mut self, name: &str, matrix: Matrix) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("cm", matrix.operands()));
        self.ops.push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    pub fn draw_text(
        &mut self,
        font: BuiltinFont,
        size: f64,
        color: Color,
        opacity: f64,
        matrix: Matrix,
        text: &str,
    ) {
        let font_name = self.ensure_font(font);
        let gstate = self.ensure_gstate(opacity);

        self.ops.push(Operation::new("q", vec![]));
        if let Some(gs) = gstate {
            self.ops.push(Operation::new("gs", vec![Object::Name(gs.into_bytes())]));
        }
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font_name.into_bytes()), (snap(size) as f32).into()],
        ));
        let (r, g, b) = color.to_unit_rgb();
        self.ops.push(Operation::new(
            "rg",
            vec![(r as f32).into(), (g as f32).into(), (b as f32).into()],
        ));
        self.ops.push(Operation::new("Tm", matrix.operands()));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_winansi(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    /// Draws sanitized watermark paths under one shared transform.
    /// Each path paints fill before stroke and carries its own style.
    pub fn draw_paths(
        &mut self,
        specs: &[PathSpec],
        opacity_mul: f64,
        matrix: Matrix,
    ) -> Result<(), LayoutError> {
        for spec in specs {
            let combined = (spec.opacity * opacity_mul).clamp(0.0, 1.0);
            let gstate = self.ensure_gstate(combined);

            self.ops.push(Operation::new("q", vec![]));
            if let Some(gs) = gstate {
                self.ops.push(Operation::new("gs", vec![Object::Name(gs.into_bytes())]));
            }
            self.ops.push(Operation::new("cm", matrix.operands()));

            if let Some(fill) = spec.fill {
                let (r, g, b) = fill.to_unit_rgb();
                self.ops.push(Operation::new(
                    "rg",
                    vec![(r as f32).into(), (g as f32).into(), (b as f32).into()],
                ));
            }
            if let Some(stroke) = spec.stroke {
                let (r, g, b) = stroke.to_unit_rgb();
                self.ops.push(Operation::new(
                    "RG",
                    vec![(r as f32).into(), (g as f32).into(), (b as f32).into()],
                ));
                self.ops.push(Operation::new("w", vec![(snap(spec.stroke_width) as f32).into()]));
                if let Some(cap) = spec.line_cap {
                    let v = match cap {
                        LineCap::Butt => 0,
                        LineCap::Round => 1,
                        LineCap::Square => 2,
                    };
                    self.ops.push(Operation::new("J", vec![v.into()]));
                }
                if let Some(join) = spec.line_join {
                    let v = match join {
                        LineJoin::Miter => 0,
                        LineJoin::Round => 1,
                        LineJoin::Bevel => 2,
                    };
                    self.ops.push(Operation::new("j", vec![v.into()]));
                }
                if !spec.dash_array.is_empty() {
                    let pattern: Vec<Object> =
                        spec.dash_array.iter().map(|v| (snap(*v) as f32).into()).collect();
                    self.ops.push(Operation::new(
                        "d",
                        vec![Object::Array(pattern), (snap(spec.dash_offset) as f32).into()],
                    ));
                }
            }

            self.ops.extend(path_operations(&spec.d)?);

            let paint = match (spec.fill.is_some(), spec.stroke.is_some()) {
                (true, true) => "B",
                (true, false) => "f",
                (false, true) => "S",
                (false, false) => "n",
            };
            self.ops.push(Operation::new(paint, vec![]));
            self.ops.push(Operation::new("Q", vec![]));
        }
        Ok(())
    }

    /// Serializes the page into standalone PDF bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, LayoutError> {
        let content = Content { operations: self.ops };
        let content_id = self.doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.encode()?,
        )));

        let mut resources = Dictionary::new();
        if !self.fonts.is_empty() {
            let mut font_dict = Dictionary::new();
            for (font, name) in &self.fonts {
                font_dict.set(
                    name.as_bytes(),
                    Object::Dictionary(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => font.postscript_name(),
                        "Encoding" => "WinAnsiEncoding",
                    }),
                );
            }
            resources.set("Font", Object::Dictionary(font_dict));
        }
        if !self.xobjects.is_empty() {
            let mut xobject_dict = Dictionary::new();
            for (name, id) in &self.xobjects {
                xobject_dict.set(name.as_bytes(), Object::Reference(*id));
            }
            resources.set("XObject", Object::Dictionary(xobject_dict));
        }
        if !self.gstates.is_empty() {
            let mut gs_dict = Dictionary::new();
            for (key, name) in &self.gstates {
                let alpha = *key as f32 / 1000.0;
                gs_dict.set(
                    name.as_bytes(),
                    Object::Dictionary(dictionary! {
                        "Type" => "ExtGState",
                        "ca" => alpha,
                        "CA" => alpha,
                    }),
                );
            }
            resources.set("ExtGState", Object::Dictionary(gs_dict));
        }

        let page_id = self.doc.add_object(Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(), 0.into(),
                (self.page_width as f32).into(), (self.page_height as f32).into(),
            ],
            "Contents" => content_id,
            "Resources" => Object::Dictionary(resources),
        }));

        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = self.doc.add_object(Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        }));
        self.doc.trailer.set("Root", catalog_id);

        let mut cursor = Cursor::new(Vec::new());
        self.doc.save_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Minimal PDF builders shared by this crate's unit tests.
#[cfg(test)]
pub mod test_support {
    use super::*;

    /// A one-page PDF of the given size with a short text run near the top.
    pub fn text_page_pdf(width: f64, height: f64, text: &str) -> Vec<u8> {
        let mut composer = PageComposer::new(width, height);
        composer.draw_text(
            BuiltinFont::Helvetica,
            12.0,
            Color::BLACK,
            1.0,
            Matrix::translate(20.0, height - 40.0),
            text,
        );
        composer.finish().unwrap_or_else(|e| panic!("test pdf build failed: {e}"))
    }

    /// A one-page PDF with no content.
    pub fn blank_page_pdf(width: f64, height: f64) -> Vec<u8> {
        PageComposer::new(width, height)
            .finish()
            .unwrap_or_else(|e| panic!("test pdf build failed: {e}"))
    }
}
