use serde::{de, Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

/// An opaque RGB color. Watermark and series opacity is carried separately in
/// the metadata, so no alpha channel lives here.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

static RGB_FN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$")
        .unwrap_or_else(|e| panic!("invalid rgb() pattern: {e}"))
});

/// The small named palette accepted by metadata validation.
const NAMED: &[(&str, Color)] = &[
    ("black", Color { r: 0, g: 0, b: 0 }),
    ("white", Color { r: 255, g: 255, b: 255 }),
    ("red", Color { r: 255, g: 0, b: 0 }),
    ("green", Color { r: 0, g: 128, b: 0 }),
    ("blue", Color { r: 0, g: 0, b: 255 }),
    ("gray", Color { r: 128, g: 128, b: 128 }),
    ("grey", Color { r: 128, g: 128, b: 128 }),
    ("yellow", Color { r: 255, g: 255, b: 0 }),
    ("orange", Color { r: 255, g: 165, b: 0 }),
    ("purple", Color { r: 128, g: 0, b: 128 }),
];

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn gray(value: u8) -> Self {
        Self { r: value, g: value, b: value }
    }

    /// Parse a hex color string (#RGB or #RRGGBB format)
    fn parse_hex(s: &str) -> Result<Color, String> {
        let hex = &s[1..];
        match hex.len() {
            3 => {
                // #RGB format - expand each digit
                let r = u8::from_str_radix(&hex[0..1].repeat(2), 16)
                    .map_err(|e| format!("Invalid red component: {}", e))?;
                let g = u8::from_str_radix(&hex[1..2].repeat(2), 16)
                    .map_err(|e| format!("Invalid green component: {}", e))?;
                let b = u8::from_str_radix(&hex[2..3].repeat(2), 16)
                    .map_err(|e| format!("Invalid blue component: {}", e))?;
                Ok(Color { r, g, b })
            }
            6 => {
                // #RRGGBB format
                let r = u8::from_str_radix(&hex[0..2], 16)
                    .map_err(|e| format!("Invalid red component: {}", e))?;
                let g = u8::from_str_radix(&hex[2..4], 16)
                    .map_err(|e| format!("Invalid green component: {}", e))?;
                let b = u8::from_str_radix(&hex[4..6], 16)
                    .map_err(|e| format!("Invalid blue component: {}", e))?;
                Ok(Color { r, g, b })
            }
            _ => Err(format!(
                "Invalid hex color length: expected 3 or 6, got {}",
                hex.len()
            )),
        }
    }

    fn parse_rgb_fn(s: &str) -> Result<Color, String> {
        let caps = RGB_FN
            .captures(s)
            .ok_or_else(|| format!("Invalid rgb() color: {}", s))?;
        let channel = |i: usize| -> Result<u8, String> {
            caps[i]
                .parse::<u16>()
                .ok()
                .filter(|v| *v <= 255)
                .map(|v| v as u8)
                .ok_or_else(|| format!("rgb() channel out of range in: {}", s))
        };
        Ok(Color { r: channel(1)?, g: channel(2)?, b: channel(3)? })
    }

    /// Parses a hex (`#RGB`, `#RRGGBB`), `rgb(r,g,b)` or named color.
    pub fn parse(s: &str) -> Result<Color, String> {
        let s = s.trim();
        if s.starts_with('#') {
            return Self::parse_hex(s);
        }
        if s.starts_with("rgb(") {
            return Self::parse_rgb_fn(s);
        }
        let lower = s.to_ascii_lowercase();
        NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, c)| *c)
            .ok_or_else(|| format!("Unknown color: {}", s))
    }

    /// Whether a metadata color string is acceptable.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Unit-interval channels for PDF `rg`/`RG` operators.
    pub fn to_unit_rgb(&self) -> (f64, f64, f64) {
        (
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        )
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Color::parse("#000000").unwrap(), Color::BLACK);
        assert_eq!(Color::parse("#f00").unwrap(), Color { r: 255, g: 0, b: 0 });
        assert_eq!(
            Color::parse("#FF8000").unwrap(),
            Color { r: 255, g: 128, b: 0 }
        );
        assert!(Color::parse("#12345").is_err());
    }

    #[test]
    fn parses_rgb_function() {
        assert_eq!(
            Color::parse("rgb(12, 34, 56)").unwrap(),
            Color { r: 12, g: 34, b: 56 }
        );
        assert!(Color::parse("rgb(300,0,0)").is_err());
        assert!(Color::parse("rgb(1,2)").is_err());
    }

    #[test]
    fn parses_named_colors() {
        assert_eq!(Color::parse("Red").unwrap(), Color { r: 255, g: 0, b: 0 });
        assert!(Color::parse("mauve-ish").is_err());
    }
}
