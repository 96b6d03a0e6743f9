//! Syntax mode facade
//!
//! A [`SyntaxMode`] is one compiled grammar: the root rule, its named
//! sub-rules, the mime types it serves, and the mode-wide default style.
//! It resolves rule references (including `mode:<mime-type>` references
//! into other grammars through the registry), produces chunk lists for
//! arbitrary document ranges, and renders Pango-style markup.

use std::sync::{Arc, RwLock, Weak};

use crate::chunk::{Chunk, ChunkBuilder};
use crate::document::Document;
use crate::error::Result;
use crate::grammar::{
    compile_rule_body, GrammarDoc, Rule, SpanDef, DEFAULT_DELIMITERS, MODE_PREFIX, ROOT_RULE,
};
use crate::registry::HighlightRegistry;
use crate::scanner::{NullSink, SpanScanner};
use crate::semantic::SemanticRule;
use crate::style::ChunkStyle;
use crate::theme::{Theme, DEFAULT_STYLE};

/// Strategy producing the chunk list for one line range
///
/// The default engine drives the span scanner; hosts may install their own
/// engine on a mode (e.g. to splice in diff or search-result styling)
/// without touching the grammar.
pub trait ChunkEngine: Send + Sync {
    fn chunks(
        &self,
        mode: &Arc<SyntaxMode>,
        doc: &dyn Document,
        line: usize,
        offset: usize,
        length: usize,
    ) -> Vec<Chunk>;
}

/// The built-in engine: span scan, then chunk building
pub struct SpanChunkEngine;

impl ChunkEngine for SpanChunkEngine {
    fn chunks(
        &self,
        mode: &Arc<SyntaxMode>,
        doc: &dyn Document,
        line: usize,
        offset: usize,
        length: usize,
    ) -> Vec<Chunk> {
        let Some((line_start, _)) = doc.line_span(line) else {
            return Vec::new();
        };
        let Some(text) = doc.line_text(line) else {
            return Vec::new();
        };
        let end = offset + length;
        let from = offset.saturating_sub(line_start).min(text.len());
        let to = end.saturating_sub(line_start).min(text.len());

        let mut scanner = SpanScanner::new(mode.clone(), doc.start_stack(line));
        // Catch up silently from the line start to the requested offset.
        scanner.scan_range(line_start, &text, 0, from, &mut NullSink);
        let mut builder = ChunkBuilder::new(
            &scanner,
            &text,
            line_start,
            offset,
            mode.default_style().to_string(),
        );
        scanner.scan_range(line_start, &text, from, to, &mut builder);
        // finish() also covers trailing bytes past the line text (the line
        // break) so the chunks always sum to `length`.
        builder.finish(end)
    }
}

/// Rendering options for [`SyntaxMode::markup`]
#[derive(Debug, Clone, Copy)]
pub struct MarkupOptions {
    /// Emit `foreground` attributes (off for e.g. printing)
    pub use_colors: bool,
    /// Expand tabs to spaces
    pub replace_tabs: bool,
    pub tab_size: usize,
    /// Strip the shared leading indentation of the rendered lines
    pub remove_indent: bool,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            use_colors: true,
            replace_tabs: true,
            tab_size: 8,
            remove_indent: false,
        }
    }
}

/// One compiled grammar
pub struct SyntaxMode {
    name: String,
    mime_types: Vec<String>,
    default_style: String,
    root: Arc<Rule>,
    rules: Vec<Arc<Rule>>,
    /// Rule used inside spans that declare no rule of their own: nothing
    /// matches there, only the enclosing span's delimiters apply.
    plain: Arc<Rule>,
    registry: RwLock<Weak<HighlightRegistry>>,
    engine: RwLock<Arc<dyn ChunkEngine>>,
}

impl SyntaxMode {
    /// Compile a grammar document, merging an optional base grammar
    ///
    /// The base's spans, keywords and matches are appended behind the
    /// document's own (first match wins), and its named rules fill in
    /// where the document declares none of the same name.
    pub fn compile(doc: &GrammarDoc, base: Option<&SyntaxMode>) -> Result<SyntaxMode> {
        let name = doc.name.clone();
        let delimiters = doc
            .delimiters
            .clone()
            .or_else(|| base.map(|b| b.root.delimiters.clone()))
            .unwrap_or_else(|| DEFAULT_DELIMITERS.to_string());
        let default_style = doc
            .default_style
            .clone()
            .or_else(|| base.map(|b| b.default_style.clone()))
            .unwrap_or_else(|| DEFAULT_STYLE.to_string());

        let mut root = Rule::new(ROOT_RULE);
        root.delimiters = delimiters.clone();
        root.ignore_case = doc.ignore_case;
        compile_rule_body(&name, &mut root, &doc.spans, &doc.keywords, &doc.matches)?;
        if let Some(base) = base {
            root.merge_from(&base.root);
        }

        let mut rules: Vec<Arc<Rule>> = Vec::with_capacity(doc.rules.len());
        for rule_doc in &doc.rules {
            let mut rule = Rule::new(&rule_doc.name);
            rule.delimiters = rule_doc
                .delimiters
                .clone()
                .unwrap_or_else(|| delimiters.clone());
            rule.default_style = rule_doc.default_style.clone();
            rule.ignore_case = doc.ignore_case;
            compile_rule_body(
                &name,
                &mut rule,
                &rule_doc.spans,
                &rule_doc.keywords,
                &rule_doc.matches,
            )?;
            rules.push(Arc::new(rule));
        }
        if let Some(base) = base {
            for inherited in &base.rules {
                if !rules.iter().any(|own| own.name == inherited.name) {
                    rules.push(inherited.clone());
                }
            }
        }

        let mut plain = Rule::new("<span>");
        plain.delimiters = delimiters;
        plain.ignore_case = doc.ignore_case;

        Ok(SyntaxMode {
            name,
            mime_types: doc.mime_types.clone(),
            default_style,
            root: Arc::new(root),
            rules,
            plain: Arc::new(plain),
            registry: RwLock::new(Weak::new()),
            engine: RwLock::new(Arc::new(SpanChunkEngine)),
        })
    }

    /// Parse and compile a standalone grammar definition
    ///
    /// `extends` references need a registry and are ignored here.
    pub fn from_toml_str(text: &str) -> Result<SyntaxMode> {
        Self::compile(&GrammarDoc::parse(text)?, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// Style applied where no span, keyword or match decides otherwise
    pub fn default_style(&self) -> &str {
        &self.default_style
    }

    pub fn root_rule(&self) -> Arc<Rule> {
        self.root.clone()
    }

    /// Resolve a rule reference from within `enclosing`
    ///
    /// An empty name or [`ROOT_RULE`] is the grammar root; a
    /// `mode:<mime-type>` reference resolves through the registry to the
    /// other grammar's root. Unresolvable names degrade to `enclosing`, so
    /// a missing grammar never breaks scanning.
    pub fn resolve_rule(&self, name: &str, enclosing: &Arc<Rule>) -> Arc<Rule> {
        if name.is_empty() || name == ROOT_RULE {
            return self.root.clone();
        }
        if let Some(mime) = name.strip_prefix(MODE_PREFIX) {
            if let Some(registry) = self.registry.read().unwrap().upgrade() {
                match registry.syntax_mode(mime) {
                    Ok(other) => return other.root_rule(),
                    Err(err) => log::warn!("can't resolve '{name}': {err}"),
                }
            }
            return enclosing.clone();
        }
        self.rules
            .iter()
            .find(|rule| rule.name == name)
            .cloned()
            .unwrap_or_else(|| enclosing.clone())
    }

    /// The rule governing a span's body
    ///
    /// A span without a rule name scans with an empty rule: the enclosing
    /// grammar's keywords and spans do not apply inside it.
    pub fn resolve_span_rule(&self, span: &SpanDef, enclosing: &Arc<Rule>) -> Arc<Rule> {
        match span.rule.as_deref() {
            None => self.plain.clone(),
            Some(name) => self.resolve_rule(name, enclosing),
        }
    }

    /// Register a semantic post-pass on a named rule (or the root)
    ///
    /// Returns `false` when no rule of that name exists.
    pub fn add_semantic_rule(&self, rule_name: &str, rule: Arc<dyn SemanticRule>) -> bool {
        if rule_name.is_empty() || rule_name == ROOT_RULE {
            self.root.add_semantic_rule(rule);
            return true;
        }
        match self.rules.iter().find(|r| r.name == rule_name) {
            Some(target) => {
                target.add_semantic_rule(rule);
                true
            }
            None => false,
        }
    }

    /// Check that every style name this grammar uses resolves in `theme`
    ///
    /// Missing names are logged; rendering would silently degrade to the
    /// default style for them.
    pub fn validate(&self, theme: &Theme) -> bool {
        let mut ok = true;
        let mut check = |style: &str| {
            if theme.lookup(style).is_none() {
                log::warn!(
                    "theme '{}' defines no style for '{}' used by grammar '{}'",
                    theme.name(),
                    style,
                    self.name
                );
                ok = false;
            }
        };
        check(&self.default_style);
        for rule in std::iter::once(&self.root).chain(self.rules.iter()) {
            for style in rule.declared_styles() {
                check(style);
            }
        }
        ok
    }

    /// Replace the chunk engine for this mode
    pub fn set_chunk_engine(&self, engine: Arc<dyn ChunkEngine>) {
        *self.engine.write().unwrap() = engine;
    }

    pub fn chunk_engine(&self) -> Arc<dyn ChunkEngine> {
        self.engine.read().unwrap().clone()
    }

    pub(crate) fn attach_registry(&self, registry: &Arc<HighlightRegistry>) {
        *self.registry.write().unwrap() = Arc::downgrade(registry);
    }

    /// Chunk the range `[offset, offset + length)` of line `line`
    ///
    /// Scanning seeds from the line's cached start-of-line stack and is
    /// read-only on the document. Registered semantic rules run as a final
    /// post-pass over the produced list.
    pub fn get_chunks(
        self: &Arc<Self>,
        doc: &dyn Document,
        line: usize,
        offset: usize,
        length: usize,
    ) -> Vec<Chunk> {
        let engine = self.chunk_engine();
        let mut chunks = engine.chunks(self, doc, line, offset, length);

        let semantic: Vec<Arc<dyn SemanticRule>> = std::iter::once(&self.root)
            .chain(self.rules.iter())
            .flat_map(|rule| rule.semantic_rules())
            .collect();
        if !semantic.is_empty() {
            if let (Some((line_start, _)), Some(text)) = (doc.line_span(line), doc.line_text(line))
            {
                for rule in semantic {
                    rule.analyze(&text, line_start, &mut chunks);
                }
            }
        }
        chunks
    }

    /// Chunk a range and resolve each chunk's style against `theme`
    pub fn styled_chunks(
        self: &Arc<Self>,
        doc: &dyn Document,
        theme: &Theme,
        line: usize,
        offset: usize,
        length: usize,
    ) -> Vec<(Chunk, ChunkStyle)> {
        self.get_chunks(doc, line, offset, length)
            .into_iter()
            .map(|chunk| {
                let style = theme.style(&chunk.style);
                (chunk, style)
            })
            .collect()
    }

    /// Render `[offset, offset + length)` as Pango-style markup
    ///
    /// Adjacent chunks whose visible attributes agree share one `<span>`
    /// tag; `&`, `<` and `>` are escaped.
    pub fn markup(
        self: &Arc<Self>,
        doc: &dyn Document,
        theme: &Theme,
        options: MarkupOptions,
        offset: usize,
        length: usize,
    ) -> String {
        let mut out = String::new();
        let end = (offset + length).min(doc.len());
        let Some(mut line) = doc.line_index_at(offset) else {
            return out;
        };
        let indent_len = if options.remove_indent {
            shared_indent_len(doc, line, end)
        } else {
            0
        };

        let mut cur = offset;
        if indent_len > 0 {
            // The first line's indent is stripped like every other line's,
            // even when the caller passed the line-start offset.
            if let Some((first_start, first_len)) = doc.line_span(line) {
                cur = cur.max(first_start + indent_len.min(first_len));
            }
        }
        loop {
            let Some((line_start, edit_len)) = doc.line_span(line) else {
                break;
            };
            let to = (line_start + edit_len).min(end);
            if cur < to {
                let mut open: Option<ChunkStyle> = None;
                for (chunk, style) in self.styled_chunks(doc, theme, line, cur, to - cur) {
                    let reuse = open
                        .as_ref()
                        .is_some_and(|o| o.fg == style.fg && o.same_decoration(&style));
                    if !reuse {
                        if open.is_some() {
                            out.push_str("</span>");
                        }
                        write_span_tag(&mut out, &style, options.use_colors);
                        open = Some(style);
                    }
                    escape_markup(
                        &mut out,
                        &doc.text_at(chunk.offset, chunk.len.min(to - chunk.offset)),
                        options,
                    );
                }
                if open.is_some() {
                    out.push_str("</span>");
                }
            }
            if to >= end || line + 1 >= doc.line_count() {
                break;
            }
            out.push('\n');
            line += 1;
            let Some((next_start, next_edit)) = doc.line_span(line) else {
                break;
            };
            cur = next_start + indent_len.min(next_edit);
        }
        out
    }
}

impl std::fmt::Debug for SyntaxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxMode")
            .field("name", &self.name)
            .field("mime_types", &self.mime_types)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn write_span_tag(out: &mut String, style: &ChunkStyle, use_colors: bool) {
    out.push_str("<span");
    if use_colors {
        out.push_str(&format!(" foreground=\"{}\"", style.fg));
    }
    if style.bold {
        out.push_str(" weight=\"bold\"");
    }
    if style.italic {
        out.push_str(" style=\"italic\"");
    }
    if style.underline {
        out.push_str(" underline=\"single\"");
    }
    out.push('>');
}

fn escape_markup(out: &mut String, text: &str, options: MarkupOptions) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' if options.replace_tabs => {
                for _ in 0..options.tab_size {
                    out.push(' ');
                }
            }
            _ => out.push(ch),
        }
    }
}

/// Shortest leading whitespace among the non-blank lines from `line` to
/// the line containing `end`
fn shared_indent_len(doc: &dyn Document, mut line: usize, end: usize) -> usize {
    let mut shortest: Option<usize> = None;
    while let Some((start, _)) = doc.line_span(line) {
        if start >= end {
            break;
        }
        if let Some(text) = doc.line_text(line) {
            if !text.trim().is_empty() {
                let indent = text.len() - text.trim_start().len();
                shortest = Some(shortest.map_or(indent, |s| s.min(indent)));
            }
        }
        line += 1;
        if line >= doc.line_count() {
            break;
        }
    }
    shortest.unwrap_or(0)
}
