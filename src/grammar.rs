//! Grammar rules for syntax highlighting
//!
//! A grammar is a tree of named [`Rule`]s. Each rule owns ordered span
//! definitions (regions with begin/end delimiters), an exact-token keyword
//! table, ordered inline match patterns, and an optional default style.
//! Rules refer to each other by name, never by pointer, so a reference can
//! cross into another grammar (`mode:<mime-type>`) or simply degrade to the
//! enclosing rule when the name does not resolve.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::{HighlightError, Result};
use crate::semantic::SemanticRule;

/// Name of the implicit root rule of every grammar
pub const ROOT_RULE: &str = "<root>";

/// Prefix marking a rule reference into another grammar
pub const MODE_PREFIX: &str = "mode:";

/// Delimiter set used when a grammar does not declare its own
pub const DEFAULT_DELIMITERS: &str = "&()<>{}[]~!%^*-+=|\\#/:;\"' ,\t.?";

/// A compiled pattern anchored to the scan position
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    /// Compile a pattern; matching is anchored at the probe position
    pub fn compile(pattern: &str, ignore_case: bool) -> std::result::Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})"))
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self { regex })
    }

    /// Length in bytes of a match starting exactly at `at`, if any
    ///
    /// Zero-length matches are rejected: they would stall the scanner.
    pub fn match_len(&self, text: &str, at: usize) -> Option<usize> {
        if at > text.len() {
            return None;
        }
        match self.regex.find(&text[at..]) {
            Some(m) if !m.is_empty() => Some(m.len()),
            _ => None,
        }
    }
}

/// A lexical region with explicit begin and end/exit delimiters
///
/// `end` consumes its match and closes the span; `exit` closes the span
/// too but the matched text belongs to the enclosing rule's style. A span
/// without `stop_at_eol = false` implicitly closes at the end of the line
/// unless the line's trailing text matches `continuation`.
#[derive(Debug)]
pub struct SpanDef {
    /// Style for the span body (falls back to the enclosing span's style)
    pub color: Option<String>,
    /// Style for the begin/end delimiter tokens themselves
    pub tag_color: Option<String>,
    /// Rule governing the span body; may be a `mode:` cross-grammar reference
    pub rule: Option<String>,
    pub begin: Matcher,
    pub end: Option<Matcher>,
    pub exit: Option<Matcher>,
    /// Literal escape sequence under which the span cannot close
    pub escape: Option<String>,
    /// Begin may only match at the first offset of a line
    pub starts_line: bool,
    /// Begin may only match when preceded by whitespace only
    pub first_non_ws: bool,
    /// Whether the span implicitly closes at end of line
    pub stop_at_eol: bool,
    /// Trailing token that carries the span across a line break
    pub continuation: Option<String>,
}

impl SpanDef {
    /// Whether this span survives the line break after `line_text`
    ///
    /// `None` means there is no previous line (document start).
    pub fn continues_after(&self, line_text: Option<&str>) -> bool {
        if !self.stop_at_eol {
            return true;
        }
        match (&self.continuation, line_text) {
            (Some(cont), Some(text)) if !cont.is_empty() => text.trim_end().ends_with(cont.as_str()),
            _ => false,
        }
    }
}

/// An inline token pattern matched at chunk starts
#[derive(Debug, Clone)]
pub struct InlineMatch {
    pub color: String,
    pub pattern: Matcher,
}

/// A named sub-grammar
pub struct Rule {
    pub name: String,
    /// Characters separating words; everything else is a word character
    pub delimiters: String,
    pub spans: Vec<Arc<SpanDef>>,
    keywords: HashMap<String, String>,
    pub matches: Vec<InlineMatch>,
    pub default_style: Option<String>,
    pub ignore_case: bool,
    semantic_rules: RwLock<Vec<Arc<dyn SemanticRule>>>,
}

impl Rule {
    /// Create an empty rule with the default delimiter set
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delimiters: DEFAULT_DELIMITERS.to_string(),
            spans: Vec::new(),
            keywords: HashMap::new(),
            matches: Vec::new(),
            default_style: None,
            ignore_case: false,
            semantic_rules: RwLock::new(Vec::new()),
        }
    }

    /// Whether `ch` separates words for keyword and chunk boundaries
    pub fn is_delimiter(&self, ch: char) -> bool {
        self.delimiters.contains(ch)
    }

    /// Add a keyword-table entry mapping `word` to `style`
    pub fn add_keyword(&mut self, word: &str, style: &str) {
        let key = if self.ignore_case {
            word.to_lowercase()
        } else {
            word.to_string()
        };
        self.keywords.insert(key, style.to_string());
    }

    /// Exact-token keyword lookup
    pub fn keyword_style(&self, word: &str) -> Option<&str> {
        if self.ignore_case {
            self.keywords.get(&word.to_lowercase()).map(String::as_str)
        } else {
            self.keywords.get(word).map(String::as_str)
        }
    }

    /// Style names declared directly on this rule (for theme validation)
    pub fn declared_styles(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(style) = &self.default_style {
            names.push(style);
        }
        for span in &self.spans {
            if let Some(color) = &span.color {
                names.push(color);
            }
            if let Some(color) = &span.tag_color {
                names.push(color);
            }
        }
        names.extend(self.keywords.values().map(String::as_str));
        names.extend(self.matches.iter().map(|m| m.color.as_str()));
        names
    }

    /// Append entries inherited from `base` behind this rule's own
    ///
    /// Own spans and matches keep first-match priority; own keywords
    /// shadow inherited ones.
    pub(crate) fn merge_from(&mut self, base: &Rule) {
        self.spans.extend(base.spans.iter().cloned());
        self.matches.extend(base.matches.iter().cloned());
        for (word, style) in &base.keywords {
            self.keywords
                .entry(word.clone())
                .or_insert_with(|| style.clone());
        }
        if self.default_style.is_none() {
            self.default_style = base.default_style.clone();
        }
    }

    /// Register a semantic post-pass on this rule
    pub fn add_semantic_rule(&self, rule: Arc<dyn SemanticRule>) {
        self.semantic_rules.write().unwrap().push(rule);
    }

    /// Snapshot of the registered semantic rules
    pub fn semantic_rules(&self) -> Vec<Arc<dyn SemanticRule>> {
        self.semantic_rules.read().unwrap().clone()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("spans", &self.spans.len())
            .field("keywords", &self.keywords.len())
            .finish()
    }
}

/// The ordered set of open spans at a scan position, bottom first
///
/// Persisted per line as the start-of-line stack so a scan can resume at
/// any line. Equality is pointer identity per element: span definitions
/// are shared `Arc`s owned by their grammar.
#[derive(Debug, Clone, Default)]
pub struct SpanStack(Vec<Arc<SpanDef>>);

impl SpanStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, span: Arc<SpanDef>) {
        self.0.push(span);
    }

    pub fn pop(&mut self) -> Option<Arc<SpanDef>> {
        self.0.pop()
    }

    /// The innermost open span
    pub fn top(&self) -> Option<&Arc<SpanDef>> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate bottom to top
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<SpanDef>> {
        self.0.iter()
    }

    /// Drop every span that does not survive the line break after `line_text`
    pub fn retain_continuing(&mut self, line_text: Option<&str>) {
        self.0.retain(|span| span.continues_after(line_text));
    }
}

impl PartialEq for SpanStack {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for SpanStack {}

impl FromIterator<Arc<SpanDef>> for SpanStack {
    fn from_iter<T: IntoIterator<Item = Arc<SpanDef>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Grammar definition documents (`*.mode.toml`)

/// Serde shape of a grammar definition document
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "mime-types")]
    pub mime_types: Vec<String>,
    /// Base grammar to merge rules from (resolved through the registry)
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub delimiters: Option<String>,
    #[serde(default, rename = "default-style")]
    pub default_style: Option<String>,
    #[serde(default, rename = "ignore-case")]
    pub ignore_case: bool,
    #[serde(default, rename = "span")]
    pub spans: Vec<SpanDoc>,
    #[serde(default, rename = "keywords")]
    pub keywords: Vec<KeywordsDoc>,
    #[serde(default, rename = "match")]
    pub matches: Vec<MatchDoc>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDoc {
    pub name: String,
    #[serde(default)]
    pub delimiters: Option<String>,
    #[serde(default, rename = "default-style")]
    pub default_style: Option<String>,
    #[serde(default, rename = "span")]
    pub spans: Vec<SpanDoc>,
    #[serde(default, rename = "keywords")]
    pub keywords: Vec<KeywordsDoc>,
    #[serde(default, rename = "match")]
    pub matches: Vec<MatchDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpanDoc {
    pub begin: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub escape: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, rename = "tag-color")]
    pub tag_color: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default, rename = "starts-line")]
    pub starts_line: bool,
    #[serde(default, rename = "first-non-ws")]
    pub first_non_ws: bool,
    #[serde(default = "default_true", rename = "stop-at-eol")]
    pub stop_at_eol: bool,
    #[serde(default)]
    pub continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordsDoc {
    pub color: String,
    pub words: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchDoc {
    pub color: String,
    pub pattern: String,
}

fn default_true() -> bool {
    true
}

impl GrammarDoc {
    /// Parse a grammar definition document
    pub fn parse(text: &str) -> Result<GrammarDoc> {
        let doc: GrammarDoc = toml::from_str(text)
            .map_err(|e| HighlightError::grammar("<unnamed>", e.message()))?;
        if doc.name.is_empty() {
            return Err(HighlightError::grammar("<unnamed>", "missing grammar name"));
        }
        Ok(doc)
    }
}

/// Compile one span definition
pub(crate) fn compile_span(grammar: &str, doc: &SpanDoc, ignore_case: bool) -> Result<SpanDef> {
    let compile = |pattern: &str| {
        Matcher::compile(pattern, ignore_case)
            .map_err(|e| HighlightError::grammar(grammar, format!("bad pattern '{pattern}': {e}")))
    };
    Ok(SpanDef {
        color: doc.color.clone(),
        tag_color: doc.tag_color.clone(),
        rule: doc.rule.clone(),
        begin: compile(&doc.begin)?,
        end: doc.end.as_deref().map(&compile).transpose()?,
        exit: doc.exit.as_deref().map(&compile).transpose()?,
        escape: doc.escape.clone(),
        starts_line: doc.starts_line,
        first_non_ws: doc.first_non_ws,
        stop_at_eol: doc.stop_at_eol,
        continuation: doc.continuation.clone(),
    })
}

/// Compile the span/keyword/match body of a rule document into `rule`
pub(crate) fn compile_rule_body(
    grammar: &str,
    rule: &mut Rule,
    spans: &[SpanDoc],
    keywords: &[KeywordsDoc],
    matches: &[MatchDoc],
) -> Result<()> {
    for span_doc in spans {
        rule.spans
            .push(Arc::new(compile_span(grammar, span_doc, rule.ignore_case)?));
    }
    for table in keywords {
        for word in &table.words {
            rule.add_keyword(word, &table.color);
        }
    }
    for match_doc in matches {
        rule.matches.push(InlineMatch {
            color: match_doc.color.clone(),
            pattern: Matcher::compile(&match_doc.pattern, rule.ignore_case).map_err(|e| {
                HighlightError::grammar(
                    grammar,
                    format!("bad pattern '{}': {e}", match_doc.pattern),
                )
            })?,
        });
    }
    Ok(())
}
