//! RGBA color stored as a hex string on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a hex color string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color {0:?}, expected #rgb, #rrggbb or #rrggbbaa")]
pub struct ParseColorError(pub String);

/// An RGBA color.
///
/// Serialized as a hex string (`#rrggbb`, or `#rrggbbaa` when the alpha
/// channel is not fully opaque) so color values survive JSON transport and
/// compare exactly in color queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, ParseColorError> {
        let err = || ParseColorError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() {
            return Err(err());
        }

        let nibble =
            |range: &str| -> Result<u8, ParseColorError> { u8::from_str_radix(range, 16).map_err(|_| err()) };

        match hex.len() {
            3 => {
                // #rgb expands each digit, e.g. #f80 -> #ff8800
                let r = nibble(&hex[0..1])? * 17;
                let g = nibble(&hex[1..2])? * 17;
                let b = nibble(&hex[2..3])? * 17;
                Ok(Self::rgb(r, g, b))
            }
            6 => Ok(Self::rgb(nibble(&hex[0..2])?, nibble(&hex[2..4])?, nibble(&hex[4..6])?)),
            8 => Ok(Self::new(
                nibble(&hex[0..2])?,
                nibble(&hex[2..4])?,
                nibble(&hex[4..6])?,
                nibble(&hex[6..8])?,
            )),
            _ => Err(err()),
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when alpha is not 255.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_six_digit() {
        let c = Color::parse("#3b82f6").unwrap();
        assert_eq!(c, Color::rgb(0x3b, 0x82, 0xf6));
        assert_eq!(c.to_hex(), "#3b82f6");
    }

    #[test]
    fn test_parse_short_form() {
        let c = Color::parse("#f80").unwrap();
        assert_eq!(c, Color::rgb(0xff, 0x88, 0x00));
    }

    #[test]
    fn test_parse_with_alpha() {
        let c = Color::parse("#10b98180").unwrap();
        assert_eq!(c.a, 0x80);
        assert_eq!(c.to_hex(), "#10b98180");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Color::parse("3b82f6").is_err());
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("#gggggg").is_err());
        assert!(Color::parse("").is_err());
    }

    #[test]
    fn test_serde_hex_string() {
        let c = Color::rgb(0x3b, 0x82, 0xf6);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"#3b82f6\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
