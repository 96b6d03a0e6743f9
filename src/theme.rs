//! Named style themes
//!
//! A theme maps dotted style names (`comment.tag.todo`) to visual
//! attributes. Lookup falls back by truncating the dotted path one segment
//! at a time, so a theme only has to define the prefixes it cares about.
//! Entries may also be aliases that reuse another entry's attributes, and
//! color values may go through a named palette table.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{HighlightError, Result};
use crate::style::{ChunkStyle, Color};

/// The style name every lookup finally falls back to
pub const DEFAULT_STYLE: &str = "text";

/// One theme entry: concrete attributes or a reference to another entry
#[derive(Debug, Clone)]
enum ThemeEntry {
    Style(ChunkStyle),
    Alias(String),
}

/// A named style theme
#[derive(Debug, Clone)]
pub struct Theme {
    name: String,
    description: String,
    entries: HashMap<String, ThemeEntry>,
    palette: HashMap<String, String>,
}

impl Theme {
    /// Create an empty theme with just the default style
    pub fn new(name: &str) -> Self {
        let mut theme = Self {
            name: name.to_string(),
            description: String::new(),
            entries: HashMap::new(),
            palette: HashMap::new(),
        };
        theme.set_style(DEFAULT_STYLE, ChunkStyle::default());
        theme
    }

    /// Theme name used as the registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Insert or replace a concrete style entry
    pub fn set_style(&mut self, name: &str, style: ChunkStyle) {
        self.entries
            .insert(name.to_string(), ThemeEntry::Style(style));
    }

    /// Insert an alias entry reusing the attributes of `target`
    pub fn set_alias(&mut self, name: &str, target: &str) {
        self.entries
            .insert(name.to_string(), ThemeEntry::Alias(target.to_string()));
    }

    /// Resolve a style name without the terminal default fallback
    ///
    /// Follows aliases and the dotted truncation chain; returns `None` when
    /// no entry (or truncated prefix) exists. Grammar validation uses this
    /// to tell a genuinely missing style from one that merely degrades.
    pub fn lookup(&self, name: &str) -> Option<ChunkStyle> {
        let mut current = name;
        loop {
            if let Some(style) = self.lookup_exact(current) {
                return Some(style);
            }
            match current.rfind('.') {
                Some(dot) if dot > 0 => current = &current[..dot],
                _ => return None,
            }
        }
    }

    /// Resolve a style name, falling back to the default style
    ///
    /// Never fails: styling degrades rather than blocking rendering.
    pub fn style(&self, name: &str) -> ChunkStyle {
        self.lookup(name)
            .or_else(|| self.lookup_exact(DEFAULT_STYLE))
            .unwrap_or_default()
    }

    /// Exact-name lookup, following alias chains only
    fn lookup_exact(&self, name: &str) -> Option<ChunkStyle> {
        let mut current = name;
        // Alias chains are short; the hop limit guards malformed cycles.
        for _ in 0..16 {
            match self.entries.get(current)? {
                ThemeEntry::Style(style) => return Some(*style),
                ThemeEntry::Alias(target) => current = target,
            }
        }
        None
    }

    /// Parse a theme definition document
    pub fn from_toml_str(text: &str) -> Result<Theme> {
        let doc: ThemeDoc = toml::from_str(text)
            .map_err(|e| HighlightError::theme("<unnamed>", e.message()))?;
        if doc.name.is_empty() {
            return Err(HighlightError::theme("<unnamed>", "missing theme name"));
        }
        let mut theme = Theme::new(&doc.name);
        theme.description = doc.description;
        theme.palette = doc.palette;
        for (name, style_doc) in &doc.styles {
            if let Some(target) = &style_doc.alias {
                theme.set_alias(name, target);
                continue;
            }
            let mut style = ChunkStyle::default();
            if let Some(fg) = &style_doc.fg {
                style.fg = theme.parse_color(&doc.name, fg)?;
            }
            if let Some(bg) = &style_doc.bg {
                style = style.with_bg(theme.parse_color(&doc.name, bg)?);
            }
            style.bold = style_doc.bold;
            style.italic = style_doc.italic;
            style.underline = style_doc.underline;
            if style_doc.transparent_bg {
                style.transparent_bg = true;
            }
            theme.set_style(name, style);
        }
        Ok(theme)
    }

    /// Parse a color value, resolving palette names first
    fn parse_color(&self, theme_name: &str, value: &str) -> Result<Color> {
        let resolved = self.palette.get(value).map(String::as_str).unwrap_or(value);
        Color::parse(resolved).ok_or_else(|| {
            HighlightError::theme(theme_name, format!("can't parse color: {value}"))
        })
    }

    /// The built-in theme shipped with the engine
    pub fn default_theme() -> Theme {
        let mut t = Theme::new("default");
        t.description = "Built-in default colors".to_string();

        t.set_style("text", ChunkStyle::fg(Color::BLACK));
        t.set_style("text.punctuation", ChunkStyle::fg(Color::BLACK));
        t.set_style("text.link", ChunkStyle::fg(Color::rgb(0, 0, 255)).with_underline());
        t.set_style("text.preprocessor", ChunkStyle::fg(Color::rgb(0, 128, 0)));
        t.set_style(
            "text.preprocessor.keyword",
            ChunkStyle::fg(Color::rgb(0, 128, 0)).with_bold(),
        );
        t.set_style("text.markup", ChunkStyle::fg(Color::rgb(0, 0x8a, 0x8c)));
        t.set_style("text.markup.tag", ChunkStyle::fg(Color::rgb(0x6a, 0x5a, 0xcd)));

        t.set_style("comment", ChunkStyle::fg(Color::rgb(0, 0, 255)));
        t.set_style(
            "comment.tag",
            ChunkStyle::fg(Color::rgb(128, 128, 128)).with_italic(),
        );
        t.set_style(
            "comment.keyword.todo",
            ChunkStyle::fg(Color::rgb(0, 0, 255)).with_bold(),
        );

        t.set_style("constant", ChunkStyle::fg(Color::rgb(255, 0, 255)));
        t.set_style("constant.digit", ChunkStyle::fg(Color::rgb(255, 0, 255)));
        t.set_style(
            "constant.language",
            ChunkStyle::fg(Color::rgb(165, 42, 42)).with_bold(),
        );

        t.set_style("string", ChunkStyle::fg(Color::rgb(255, 0, 255)));
        t.set_alias("string.single", "string");
        t.set_alias("string.double", "string");

        t.set_style("keyword", ChunkStyle::fg(Color::BLACK).with_bold());
        for sub in [
            "keyword.access",
            "keyword.operator",
            "keyword.selection",
            "keyword.iteration",
            "keyword.jump",
            "keyword.exceptions",
            "keyword.modifier",
            "keyword.declaration",
            "keyword.parameter",
            "keyword.misc",
        ] {
            t.set_style(sub, ChunkStyle::fg(Color::rgb(165, 42, 42)).with_bold());
        }
        t.set_style("keyword.type", ChunkStyle::fg(Color::rgb(46, 139, 87)).with_bold());

        t
    }
}

/// Serde shape of a `*.theme.toml` document
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThemeDoc {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    palette: HashMap<String, String>,
    #[serde(default)]
    styles: HashMap<String, StyleDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StyleDoc {
    fg: Option<String>,
    bg: Option<String>,
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
    #[serde(default)]
    underline: bool,
    #[serde(default, rename = "transparent-bg")]
    transparent_bg: bool,
    alias: Option<String>,
}
