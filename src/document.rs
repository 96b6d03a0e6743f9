//! Host document contract
//!
//! The engine reads text through the [`Document`] trait and stores one
//! [`SpanStack`] per line (the open spans at the line start). Offsets are
//! byte offsets into the whole text; lines are separated by `'\n'`.
//! [`TextBuffer`] is the reference implementation used by embedding hosts
//! without an editor buffer of their own, and by the tests.

use std::sync::RwLock;

use crate::grammar::SpanStack;

/// Identifies a document across the registry's update queue
pub type DocumentId = u64;

/// Read access to text plus per-line start-stack storage
///
/// Reads must be consistent within one call; the rescan worker tolerates
/// the text changing between calls (a newer job covers the newer text).
pub trait Document: Send + Sync {
    fn id(&self) -> DocumentId;

    /// Total length in bytes, line breaks included
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn line_count(&self) -> usize;

    /// Index of the line containing `offset` (`len()` maps to the last line)
    fn line_index_at(&self, offset: usize) -> Option<usize>;

    /// Start offset and length of a line, excluding the line break
    fn line_span(&self, line: usize) -> Option<(usize, usize)>;

    /// A line's text without the trailing line break
    fn line_text(&self, line: usize) -> Option<String>;

    /// The character starting at `offset`
    fn char_at(&self, offset: usize) -> Option<char>;

    /// Text of `[offset, offset + len)`, clamped to the document
    fn text_at(&self, offset: usize, len: usize) -> String;

    /// The cached open-span stack at the start of `line`
    fn start_stack(&self, line: usize) -> SpanStack;

    /// Store the open-span stack at the start of `line`
    ///
    /// Only the rescan worker writes these; readers see a line's stack as
    /// of the last completed rescan that reached it.
    fn set_start_stack(&self, line: usize, stack: SpanStack);
}

struct BufferInner {
    text: String,
    /// Start offset of each line; always holds at least `[0]`
    starts: Vec<usize>,
    stacks: Vec<SpanStack>,
}

impl BufferInner {
    fn reindex(&mut self) {
        self.starts.clear();
        self.starts.push(0);
        for (i, b) in self.text.bytes().enumerate() {
            if b == b'\n' {
                self.starts.push(i + 1);
            }
        }
    }

    fn line_end(&self, line: usize) -> usize {
        match self.starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        }
    }
}

/// An in-memory text document
pub struct TextBuffer {
    id: DocumentId,
    inner: RwLock<BufferInner>,
}

impl TextBuffer {
    pub fn new(id: DocumentId, text: &str) -> Self {
        let mut inner = BufferInner {
            text: text.to_string(),
            starts: Vec::new(),
            stacks: Vec::new(),
        };
        inner.reindex();
        inner.stacks.resize(inner.starts.len(), SpanStack::new());
        Self {
            id,
            inner: RwLock::new(inner),
        }
    }

    /// Replace `[offset, offset + len)` with `text`
    ///
    /// Cached stacks outside the edited lines survive the edit (shifted
    /// by the line-count delta); the rescan worker depends on that to
    /// stop early once stacks converge. Lines added by the edit start
    /// with an empty stack, and the queued rescan corrects them.
    pub fn replace(&self, offset: usize, len: usize, text: &str) {
        let mut inner = self.inner.write().unwrap();
        let end = (offset + len).min(inner.text.len());
        let offset = offset.min(end);
        let first = inner.starts.partition_point(|&s| s <= offset) - 1;
        let last = inner.starts.partition_point(|&s| s <= end) - 1;

        let split_at = (last + 1).min(inner.stacks.len());
        let mut tail = inner.stacks.split_off(split_at);
        inner.stacks.truncate(first + 1);

        inner.text.replace_range(offset..end, text);
        inner.reindex();
        let keep_with_segment = inner.starts.len() - tail.len();
        inner.stacks.resize(keep_with_segment, SpanStack::new());
        inner.stacks.append(&mut tail);
    }

    pub fn insert(&self, offset: usize, text: &str) {
        self.replace(offset, 0, text);
    }

    pub fn text(&self) -> String {
        self.inner.read().unwrap().text.clone()
    }
}

impl Document for TextBuffer {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap().text.len()
    }

    fn line_count(&self) -> usize {
        self.inner.read().unwrap().starts.len()
    }

    fn line_index_at(&self, offset: usize) -> Option<usize> {
        let inner = self.inner.read().unwrap();
        if offset > inner.text.len() {
            return None;
        }
        Some(inner.starts.partition_point(|&s| s <= offset) - 1)
    }

    fn line_span(&self, line: usize) -> Option<(usize, usize)> {
        let inner = self.inner.read().unwrap();
        let start = *inner.starts.get(line)?;
        Some((start, inner.line_end(line) - start))
    }

    fn line_text(&self, line: usize) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let start = *inner.starts.get(line)?;
        Some(inner.text[start..inner.line_end(line)].to_string())
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        let inner = self.inner.read().unwrap();
        inner.text.get(offset..).and_then(|rest| rest.chars().next())
    }

    fn text_at(&self, offset: usize, len: usize) -> String {
        let inner = self.inner.read().unwrap();
        let start = offset.min(inner.text.len());
        let end = (offset + len).min(inner.text.len());
        inner.text[start..end].to_string()
    }

    fn start_stack(&self, line: usize) -> SpanStack {
        self.inner
            .read()
            .unwrap()
            .stacks
            .get(line)
            .cloned()
            .unwrap_or_default()
    }

    fn set_start_stack(&self, line: usize, stack: SpanStack) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.stacks.get_mut(line) {
            *slot = stack;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_layout() {
        let doc = TextBuffer::new(1, "one\ntwo\n\nfour");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.line_span(0), Some((0, 3)));
        assert_eq!(doc.line_span(1), Some((4, 3)));
        assert_eq!(doc.line_span(2), Some((8, 0)));
        assert_eq!(doc.line_span(3), Some((9, 4)));
        assert_eq!(doc.line_text(2).as_deref(), Some(""));
        assert_eq!(doc.line_span(4), None);
    }

    #[test]
    fn test_trailing_newline_makes_empty_line() {
        let doc = TextBuffer::new(1, "a\n");
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.line_span(1), Some((2, 0)));
    }

    #[test]
    fn test_line_index_at() {
        let doc = TextBuffer::new(1, "one\ntwo");
        assert_eq!(doc.line_index_at(0), Some(0));
        assert_eq!(doc.line_index_at(3), Some(0)); // the '\n' itself
        assert_eq!(doc.line_index_at(4), Some(1));
        assert_eq!(doc.line_index_at(7), Some(1)); // end of document
        assert_eq!(doc.line_index_at(8), None);
    }

    #[test]
    fn test_text_at_clamps() {
        let doc = TextBuffer::new(1, "hello");
        assert_eq!(doc.text_at(1, 3), "ell");
        assert_eq!(doc.text_at(3, 100), "lo");
        assert_eq!(doc.text_at(100, 5), "");
    }

    #[test]
    fn test_char_at() {
        let doc = TextBuffer::new(1, "a\nb");
        assert_eq!(doc.char_at(0), Some('a'));
        assert_eq!(doc.char_at(1), Some('\n'));
        assert_eq!(doc.char_at(3), None);
        // Not a char boundary:
        let doc = TextBuffer::new(1, "é");
        assert_eq!(doc.char_at(1), None);
    }

    #[test]
    fn test_replace_reindexes() {
        let doc = TextBuffer::new(1, "one\ntwo\nthree");
        doc.replace(4, 3, "2\n2b");
        assert_eq!(doc.text(), "one\n2\n2b\nthree");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.line_text(1).as_deref(), Some("2"));
        assert_eq!(doc.line_text(3).as_deref(), Some("three"));
    }

    fn one_span_stack() -> SpanStack {
        use crate::grammar::{compile_span, SpanDoc};
        use std::sync::Arc;

        let span = Arc::new(
            compile_span(
                "test",
                &toml::from_str::<SpanDoc>("begin = '\"'").unwrap(),
                false,
            )
            .unwrap(),
        );
        let mut stack = SpanStack::new();
        stack.push(span);
        stack
    }

    #[test]
    fn test_replace_keeps_unaffected_stacks() {
        let doc = TextBuffer::new(1, "a\nb\nc");
        let stack = one_span_stack();
        doc.set_start_stack(0, stack.clone());
        doc.set_start_stack(2, stack.clone());

        doc.replace(2, 1, "B");
        // Neither line 0 nor line 2 was touched by the edit.
        assert_eq!(doc.start_stack(0), stack);
        assert_eq!(doc.start_stack(2), stack);
    }

    #[test]
    fn test_replace_shifts_stacks_for_inserted_lines() {
        let doc = TextBuffer::new(1, "a\nb\nc");
        let stack = one_span_stack();
        doc.set_start_stack(2, stack.clone());

        doc.insert(2, "x\ny\n");
        assert_eq!(doc.line_count(), 5);
        // "c" moved from line 2 to line 4 and kept its stack.
        assert_eq!(doc.line_text(4).as_deref(), Some("c"));
        assert_eq!(doc.start_stack(4), stack);
        // The inserted lines start with empty stacks.
        assert!(doc.start_stack(2).is_empty());
        assert!(doc.start_stack(3).is_empty());
    }

    #[test]
    fn test_stack_storage_out_of_range_is_ignored() {
        let doc = TextBuffer::new(1, "a");
        doc.set_start_stack(9, SpanStack::new());
        assert!(doc.start_stack(9).is_empty());
    }
}
