//! Style types for chunk rendering
//!
//! A `ChunkStyle` is the resolved visual attribute set a theme assigns to
//! a style name. Themes declare colors as `#RRGGBB` values, so colors here
//! are plain RGB rather than a terminal palette.

use std::fmt;

/// A 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Create a color from components
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#RRGGBB` (or `#RGB`) hex string
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        match hex.len() {
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self { r, g, b })
            }
            3 => {
                let c = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
                Some(Self {
                    r: c(0)?,
                    g: c(1)?,
                    b: c(2)?,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    /// Formats as `#RRGGBB`, the form markup output uses
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Resolved visual attributes for one style name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStyle {
    /// Foreground color
    pub fg: Color,
    /// Background color (meaningful only when not transparent)
    pub bg: Color,
    /// Bold text
    pub bold: bool,
    /// Italic text
    pub italic: bool,
    /// Underlined text
    pub underline: bool,
    /// Whether the background is the editor's own background
    pub transparent_bg: bool,
}

impl Default for ChunkStyle {
    fn default() -> Self {
        Self {
            fg: Color::BLACK,
            bg: Color::WHITE,
            bold: false,
            italic: false,
            underline: false,
            transparent_bg: true,
        }
    }
}

impl ChunkStyle {
    /// Create a style with just a foreground color
    pub fn fg(color: Color) -> Self {
        Self {
            fg: color,
            ..Default::default()
        }
    }

    /// Builder: set background color
    pub fn with_bg(mut self, color: Color) -> Self {
        self.bg = color;
        self.transparent_bg = false;
        self
    }

    /// Builder: set bold
    pub fn with_bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Builder: set italic
    pub fn with_italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// Builder: set underline
    pub fn with_underline(mut self) -> Self {
        self.underline = true;
        self
    }

    /// True when the weight/decoration attributes match another style
    ///
    /// Markup rendering opens a new tag only when this or the foreground
    /// color differs from the currently open tag.
    pub fn same_decoration(&self, other: &ChunkStyle) -> bool {
        self.bold == other.bold && self.italic == other.italic && self.underline == other.underline
    }
}
