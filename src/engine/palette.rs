// Floor usage types and their legend colors.
// Each usage maps to a light (default) and dark (selected) shade.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("invalid hex color `{0}` (expected #RRGGBB or #RGB)")]
    InvalidHex(String),
}

// ============================================================================
// COLOR
// ============================================================================

/// 8-bit sRGB color, written as `#RRGGBB` in scene files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::from_u32(0xFFFFFF);

    /// Build from a packed `0xRRGGBB` value.
    pub const fn from_u32(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >> 8) & 0xFF) as u8,
            b: (rgb & 0xFF) as u8,
        }
    }

    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let invalid = || ColorError::InvalidHex(hex.to_string());

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        match digits.len() {
            6 => {
                let rgb = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
                Ok(Self::from_u32(rgb))
            }
            // #RGB shorthand: each nibble is doubled
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&digits[i..i + 1], 16)
                        .map(|n| n * 17)
                        .map_err(|_| invalid())
                };
                Ok(Self { r: nibble(0)?, g: nibble(1)?, b: nibble(2)? })
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, 255])
    }

    /// Linear-space RGBA for shader uniforms (the surface format is sRGB).
    pub fn to_linear(self) -> [f32; 4] {
        let lin = |c: u8| {
            let c = c as f32 / 255.0;
            if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
        };
        [lin(self.r), lin(self.g), lin(self.b), 1.0]
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

// ============================================================================
// USAGE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Office,
    Store,
    Hotel,
    House,
    Parking,
    /// Catch-all legend entry, drawn with a diagonal hatch.
    Others,
}

impl UsageType {
    pub const ALL: [UsageType; 6] = [
        UsageType::Office,
        UsageType::Store,
        UsageType::Hotel,
        UsageType::House,
        UsageType::Parking,
        UsageType::Others,
    ];

    pub fn label(self) -> &'static str {
        match self {
            UsageType::Office => "office",
            UsageType::Store => "store",
            UsageType::Hotel => "hotel",
            UsageType::House => "house",
            UsageType::Parking => "parking",
            UsageType::Others => "others",
        }
    }

    pub const fn shade(self) -> Shade {
        match self {
            UsageType::Office => Shade::new(0xDFF2FE, 0xB8E6FE),  // sky 100 / 200
            UsageType::Store => Shade::new(0xFFE4E6, 0xFFCCD3),   // rose 100 / 200
            UsageType::Hotel => Shade::new(0xFFEDD4, 0xFFD6A8),   // orange 100 / 200
            UsageType::House => Shade::new(0xFEF3C6, 0xFEE685),   // amber 100 / 200
            UsageType::Parking => Shade::new(0xE2E8F0, 0xCAD5E2), // slate 200 / 300
            UsageType::Others => Shade::new(0xF8FAFC, 0xF1F5F9),  // slate 50 / 100
        }
    }
}

/// Light/dark color pair for one usage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shade {
    pub light: Color,
    pub dark: Color,
}

impl Shade {
    const fn new(light: u32, dark: u32) -> Self {
        Self { light: Color::from_u32(light), dark: Color::from_u32(dark) }
    }
}

// ============================================================================
// COLOR SEGMENTS
// ============================================================================

/// One stripe of the floor legend. Order in the list = left-to-right order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSegment {
    pub light: Color,
    pub dark: Color,
    pub usage: Option<UsageType>,
}

impl ColorSegment {
    pub fn from_usage(usage: UsageType) -> Self {
        let shade = usage.shade();
        Self { light: shade.light, dark: shade.dark, usage: Some(usage) }
    }

    pub fn is_hatched(&self) -> bool {
        self.usage == Some(UsageType::Others)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(Color::from_hex("#16A4C0").unwrap(), Color { r: 0x16, g: 0xA4, b: 0xC0 });
        assert_eq!(Color::from_hex("99a1af").unwrap(), Color::from_u32(0x99A1AF));
        assert_eq!(Color::from_hex("#fff").unwrap(), Color::WHITE);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#GGGGGG").is_err());
        assert!(Color::from_hex("").is_err());
    }

    #[test]
    fn hex_round_trips_through_serde() {
        let json = serde_json::to_string(&Color::from_u32(0xFEE685)).unwrap();
        assert_eq!(json, "\"#FEE685\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::from_u32(0xFEE685));
    }

    #[test]
    fn palette_matches_legend() {
        let parking = UsageType::Parking.shade();
        assert_eq!(parking.light.to_hex(), "#E2E8F0");
        assert_eq!(parking.dark.to_hex(), "#CAD5E2");
        assert_eq!(UsageType::Others.shade().light.to_hex(), "#F8FAFC");
    }

    #[test]
    fn only_others_is_hatched() {
        for usage in UsageType::ALL {
            let seg = ColorSegment::from_usage(usage);
            assert_eq!(seg.is_hatched(), usage == UsageType::Others, "{}", usage.label());
        }
    }

    #[test]
    fn linear_conversion_endpoints() {
        assert_eq!(Color::WHITE.to_linear(), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(Color::from_u32(0).to_linear(), [0.0, 0.0, 0.0, 1.0]);
    }
}
