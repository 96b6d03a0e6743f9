//! Chunk building
//!
//! A chunk is a maximal run of text sharing one resolved style name. The
//! [`ChunkBuilder`] consumes scanner events and closes/opens its current
//! chunk on every style-changing boundary: span begin/end/exit, inline
//! matches, keyword hits, and word/non-word transitions. Adjacent chunks
//! with identical style are coalesced, and the produced list always covers
//! the requested range exactly.

use std::sync::Arc;

use crate::grammar::{Rule, SpanDef, SpanStack, MODE_PREFIX};
use crate::scanner::{ScanSink, SpanScanner};

/// A run of text with one resolved style name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute byte offset where this chunk starts
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
    /// Resolved style name (theme lookup happens later)
    pub style: String,
}

impl Chunk {
    pub fn new(offset: usize, len: usize, style: String) -> Self {
        Self { offset, len, style }
    }

    /// Exclusive end offset
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Builds the chunk list for one scanned range
///
/// Mirrors the scanner's span/rule stacks from the events it receives, so
/// style resolution never has to reach back into the scanner mid-scan.
pub struct ChunkBuilder<'a> {
    line_text: &'a str,
    line_offset: usize,
    default_style: String,
    span_stack: SpanStack,
    rule_stack: Vec<Arc<Rule>>,
    chunks: Vec<Chunk>,
    cur_start: usize,
    cur_end: usize,
    in_word: bool,
}

impl<'a> ChunkBuilder<'a> {
    /// Seed a builder from a scanner positioned at `range_start`
    pub fn new(
        scanner: &SpanScanner,
        line_text: &'a str,
        line_offset: usize,
        range_start: usize,
        default_style: String,
    ) -> Self {
        Self {
            line_text,
            line_offset,
            default_style,
            span_stack: scanner.stack_snapshot(),
            rule_stack: scanner.rule_stack_snapshot(),
            chunks: Vec::new(),
            cur_start: range_start,
            cur_end: range_start,
            in_word: false,
        }
    }

    /// Close the current chunk at `range_end` and return the chunk list
    ///
    /// Covers any trailing bytes that produced no events (e.g. escape
    /// sequences at end of line), so the lengths sum to the full range.
    pub fn finish(mut self, range_end: usize) -> Vec<Chunk> {
        if range_end > self.cur_end {
            self.cur_end = range_end;
        }
        let style = self.keyword_or_span_style();
        self.flush(style);
        self.chunks
    }

    fn cur_rule(&self) -> &Arc<Rule> {
        self.rule_stack.last().expect("root rule is never popped")
    }

    /// Append the current chunk (if non-empty) and open a new one after it
    fn flush(&mut self, style: String) {
        if self.cur_end > self.cur_start {
            let chunk = Chunk::new(self.cur_start, self.cur_end - self.cur_start, style);
            match self.chunks.last_mut() {
                Some(last) if last.style == chunk.style && last.end() == chunk.offset => {
                    last.len += chunk.len;
                }
                _ => self.chunks.push(chunk),
            }
        }
        self.cur_start = self.cur_end;
    }

    /// Style for the current position from the open-span chain
    ///
    /// Nearest enclosing span with a declared color wins; a cross-grammar
    /// span renders its delegated content in this mode's default style.
    fn span_style(&self) -> String {
        for span in self.span_stack.iter().rev() {
            if let Some(color) = &span.color {
                return color.clone();
            }
            if span
                .rule
                .as_deref()
                .is_some_and(|r| r.starts_with(MODE_PREFIX))
            {
                break;
            }
        }
        self.rule_default()
    }

    fn rule_default(&self) -> String {
        self.cur_rule()
            .default_style
            .clone()
            .unwrap_or_else(|| self.default_style.clone())
    }

    /// Current chunk's style: keyword-table hit, else the span chain
    fn keyword_or_span_style(&self) -> String {
        if self.cur_end > self.cur_start {
            let rel_start = self.cur_start - self.line_offset;
            let rel_end = (self.cur_end - self.line_offset).min(self.line_text.len());
            if rel_start < rel_end {
                let word = &self.line_text[rel_start..rel_end];
                if let Some(style) = self.cur_rule().keyword_style(word) {
                    return style.to_string();
                }
            }
        }
        self.span_style()
    }

    /// Style of a span's own delimiter tokens
    fn delimiter_style(&self, span: &SpanDef) -> String {
        span.tag_color
            .clone()
            .or_else(|| span.color.clone())
            .unwrap_or_else(|| self.span_style())
    }

    /// Longest inline match of the current rule at `offset`, if any
    fn inline_match_at(&self, offset: usize) -> Option<(usize, String)> {
        let rel = offset - self.line_offset;
        let mut best: Option<(usize, &str)> = None;
        for m in &self.cur_rule().matches {
            if let Some(len) = m.pattern.match_len(self.line_text, rel) {
                if best.map_or(true, |(blen, _)| len > blen) {
                    best = Some((len, &m.color));
                }
            }
        }
        best.map(|(len, color)| {
            let style = if color.is_empty() {
                self.span_style()
            } else {
                color.to_string()
            };
            (len, style)
        })
    }
}

impl ScanSink for ChunkBuilder<'_> {
    fn on_span_begin(&mut self, span: &Arc<SpanDef>, rule: &Arc<Rule>, offset: usize, len: usize) {
        self.cur_end = offset;
        let style = self.keyword_or_span_style();
        self.flush(style);

        self.cur_start = offset;
        self.cur_end = offset + len;
        let style = self.delimiter_style(span);
        self.flush(style);

        self.span_stack.push(span.clone());
        self.rule_stack.push(rule.clone());
        self.in_word = false;
    }

    fn on_span_end(&mut self, span: &Arc<SpanDef>, offset: usize, len: usize) {
        self.cur_end = offset;
        let style = self.keyword_or_span_style();
        self.flush(style);

        self.span_stack.pop();
        if self.rule_stack.len() > 1 {
            self.rule_stack.pop();
        }

        self.cur_start = offset;
        self.cur_end = offset + len;
        let style = self.delimiter_style(span);
        self.flush(style);
        self.in_word = false;
    }

    fn on_span_exit(&mut self, _span: &Arc<SpanDef>, offset: usize, len: usize) {
        // The exit-matched text belongs to the enclosing rule's style.
        self.cur_end = offset;
        let style = self.keyword_or_span_style();
        self.flush(style);

        self.span_stack.pop();
        if self.rule_stack.len() > 1 {
            self.rule_stack.pop();
        }
        self.cur_end = offset + len;
        self.in_word = false;
    }

    fn on_char(&mut self, offset: usize, ch: char) -> usize {
        let is_word = !self.cur_rule().is_delimiter(ch);
        if is_word != self.in_word && self.cur_end > self.cur_start {
            let style = self.keyword_or_span_style();
            self.flush(style);
        }
        self.in_word = is_word;

        // Inline matches are only tried at a chunk start.
        if offset == self.cur_start {
            if let Some((len, style)) = self.inline_match_at(offset) {
                self.cur_end = offset + len;
                self.flush(style);
                self.in_word = false;
                return len - ch.len_utf8();
            }
        }

        self.cur_end = offset + ch.len_utf8();
        0
    }
}
