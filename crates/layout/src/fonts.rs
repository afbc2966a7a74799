//! Metrics for the built-in PDF base fonts.
//!
//! Output pages reference unembedded standard Type1 fonts with
//! WinAnsiEncoding, so measurement uses the published AFM metrics compiled in
//! here. Widths are in 1/1000 em for the printable ASCII range; everything
//! else falls back to the font's default width. This keeps text placement a
//! pure function of the inputs with no font discovery involved.

/// Helvetica widths for chars 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold widths for chars 32..=126.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Times-Roman widths for chars 32..=126.
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, //
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, //
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, //
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, //
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

/// Times-Bold widths for chars 32..=126.
const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, //
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778, //
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500, //
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500, //
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

/// Every Courier glyph advances the same amount.
const COURIER_WIDTH: u16 = 600;

/// The built-in base fonts the engine can measure and reference.
///
/// Oblique cuts share their upright widths, which matches the AFM tables.
/// Unknown family names resolve to Helvetica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl BuiltinFont {
    /// Case- and punctuation-tolerant family lookup with a Helvetica fallback.
    pub fn resolve(name: &str) -> BuiltinFont {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "helvetica" => BuiltinFont::Helvetica,
            "helveticabold" => BuiltinFont::HelveticaBold,
            "helveticaoblique" | "helveticaitalic" => BuiltinFont::HelveticaOblique,
            "helveticaboldoblique" | "helveticabolditalic" => BuiltinFont::HelveticaBoldOblique,
            "timesroman" | "times" => BuiltinFont::TimesRoman,
            "timesbold" => BuiltinFont::TimesBold,
            "courier" => BuiltinFont::Courier,
            "courierbold" => BuiltinFont::CourierBold,
            "courieroblique" | "courieritalic" => BuiltinFont::CourierOblique,
            "courierboldoblique" | "courierbolditalic" => BuiltinFont::CourierBoldOblique,
            _ => BuiltinFont::Helvetica,
        }
    }

    /// The PostScript name written as /BaseFont.
    pub fn postscript_name(&self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::HelveticaBold => "Helvetica-Bold",
            BuiltinFont::HelveticaOblique => "Helvetica-Oblique",
            BuiltinFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            BuiltinFont::TimesRoman => "Times-Roman",
            BuiltinFont::TimesBold => "Times-Bold",
            BuiltinFont::Courier => "Courier",
            BuiltinFont::CourierBold => "Courier-Bold",
            BuiltinFont::CourierOblique => "Courier-Oblique",
            BuiltinFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    fn width_table(&self) -> Option<&'static [u16; 95]> {
        match self {
            BuiltinFont::Helvetica | BuiltinFont::HelveticaOblique => Some(&HELVETICA_WIDTHS),
            BuiltinFont::HelveticaBold | BuiltinFont::HelveticaBoldOblique => {
                Some(&HELVETICA_BOLD_WIDTHS)
            }
            BuiltinFont::TimesRoman => Some(&TIMES_ROMAN_WIDTHS),
            BuiltinFont::TimesBold => Some(&TIMES_BOLD_WIDTHS),
            _ => None, // Courier cuts are monospaced
        }
    }

    /// Typographic ascender in 1/1000 em.
    pub fn ascent(&self) -> f64 {
        match self {
            BuiltinFont::Helvetica
            | BuiltinFont::HelveticaBold
            | BuiltinFont::HelveticaOblique
            | BuiltinFont::HelveticaBoldOblique => 718.0,
            BuiltinFont::TimesRoman | BuiltinFont::TimesBold => 683.0,
            BuiltinFont::Courier
            | BuiltinFont::CourierBold
            | BuiltinFont::CourierOblique
            | BuiltinFont::CourierBoldOblique => 629.0,
        }
    }

    /// Typographic descender in 1/1000 em (negative).
    pub fn descent(&self) -> f64 {
        match self {
            BuiltinFont::TimesRoman | BuiltinFont::TimesBold => -217.0,
            BuiltinFont::Courier
            | BuiltinFont::CourierBold
            | BuiltinFont::CourierOblique
            | BuiltinFont::CourierBoldOblique => -157.0,
            _ => -207.0,
        }
    }

    /// Ascender height in points at a given size.
    pub fn ascent_pt(&self, size: f64) -> f64 {
        self.ascent() / 1000.0 * size
    }

    /// Advance width of one char in 1/1000 em. Characters outside the
    /// printable ASCII range fall back to the font's default width.
    pub fn char_width(&self, ch: char) -> u16 {
        match self.width_table() {
            None => COURIER_WIDTH,
            Some(table) => {
                let code = ch as u32;
                if (32..=126).contains(&code) {
                    table[(code - 32) as usize]
                } else {
                    // Reasonable stand-in for unmapped glyphs.
                    table[('n' as u32 - 32) as usize]
                }
            }
        }
    }

    /// Advance width of a string at a given size, in points.
    pub fn width_of(&self, text: &str, size: f64) -> f64 {
        let units: u64 = text.chars().map(|c| self.char_width(c) as u64).sum();
        units as f64 / 1000.0 * size
    }
}
