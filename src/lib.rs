//! chroma - an incremental syntax-highlighting engine
//!
//! Grammars are trees of rules with span definitions (regions opened and
//! closed by regex delimiters), keyword tables and inline match patterns.
//! Scanning a line is a pure function of the open-span stack at its start
//! plus the line text, so per-line cached stacks let highlighting resume
//! at any line without rescanning the whole document.
//!
//! The pieces:
//!
//! - [`grammar`]: compiled rules, span definitions and the span stack
//! - [`scanner`]: the span state machine, emitting events into a sink
//! - [`chunk`]: turns scanner events into styled text runs
//! - [`theme`] / [`style`]: named styles with dotted-path fallback
//! - [`mode`]: one compiled grammar; chunking and markup for documents
//! - [`semantic`]: post-pass rules re-tagging produced chunks
//! - [`document`]: the host text contract and a reference buffer
//! - [`registry`]: mime-type/theme registry and the background rescan
//!   worker that keeps cached line stacks current after edits
//!
//! ```
//! use chroma::{Document, HighlightRegistry, TextBuffer};
//!
//! let registry = HighlightRegistry::new();
//! let mode = registry.syntax_mode("text/x-csrc").unwrap();
//! let doc = TextBuffer::new(1, "int main(void) { return 0; }\n");
//! let chunks = mode.get_chunks(&doc, 0, 0, doc.len());
//! assert_eq!(chunks[0].style, "keyword.type");
//! ```

pub mod builtin;
pub mod chunk;
pub mod document;
pub mod error;
pub mod grammar;
pub mod mode;
pub mod registry;
pub mod scanner;
pub mod semantic;
pub mod style;
pub mod theme;

pub use chunk::{Chunk, ChunkBuilder};
pub use document::{Document, DocumentId, TextBuffer};
pub use error::{HighlightError, Result};
pub use grammar::{GrammarDoc, Rule, SpanDef, SpanStack};
pub use mode::{ChunkEngine, MarkupOptions, SyntaxMode};
pub use registry::{DefinitionSource, EmbeddedSource, FileSource, HighlightRegistry, UpdateJob};
pub use scanner::{NullSink, ScanSink, SpanScanner};
pub use semantic::{SemanticRule, UrlHighlightRule};
pub use style::{ChunkStyle, Color};
pub use theme::Theme;
