//! Semantic post-pass rules
//!
//! After a line's chunks are produced, semantic rules may re-tag
//! sub-ranges based on higher-level meaning. The shipped example detects
//! URLs inside comment and string chunks and restyles them as links.

use regex::Regex;

use crate::chunk::Chunk;

/// A post-pass over a produced chunk list
///
/// Implementations must preserve the coverage invariant: the rewritten
/// chunks stay contiguous, non-overlapping, and cover the same range.
pub trait SemanticRule: Send + Sync {
    /// Re-tag chunks in place; `line_text` starts at `line_offset`
    fn analyze(&self, line_text: &str, line_offset: usize, chunks: &mut Vec<Chunk>);
}

/// Re-tags URLs found inside chunks of a given style family
pub struct UrlHighlightRule {
    /// Dotted style prefix the rule applies within (e.g. `comment`)
    within: String,
    /// Style assigned to detected URLs
    link_style: String,
    url: Regex,
}

impl UrlHighlightRule {
    pub fn new(within: &str, link_style: &str) -> Self {
        Self {
            within: within.to_string(),
            link_style: link_style.to_string(),
            // Trailing punctuation is left out of the link.
            url: Regex::new(r#"(?:https?://|www\.)[^\s<>"']+[^\s<>"'.,;:!?)]"#)
                .expect("url pattern is valid"),
        }
    }

    fn applies_to(&self, style: &str) -> bool {
        style == self.within
            || style
                .strip_prefix(self.within.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl SemanticRule for UrlHighlightRule {
    fn analyze(&self, line_text: &str, line_offset: usize, chunks: &mut Vec<Chunk>) {
        let mut result: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks.drain(..) {
            if !self.applies_to(&chunk.style) {
                result.push(chunk);
                continue;
            }
            let rel_start = chunk.offset.saturating_sub(line_offset);
            let rel_end = (rel_start + chunk.len).min(line_text.len());
            if rel_start >= rel_end {
                result.push(chunk);
                continue;
            }
            let text = &line_text[rel_start..rel_end];
            let mut cursor = 0;
            for m in self.url.find_iter(text) {
                if m.start() > cursor {
                    result.push(Chunk::new(
                        chunk.offset + cursor,
                        m.start() - cursor,
                        chunk.style.clone(),
                    ));
                }
                result.push(Chunk::new(
                    chunk.offset + m.start(),
                    m.len(),
                    self.link_style.clone(),
                ));
                cursor = m.end();
            }
            if cursor == 0 {
                result.push(chunk);
            } else if cursor < chunk.len {
                result.push(Chunk::new(
                    chunk.offset + cursor,
                    chunk.len - cursor,
                    chunk.style,
                ));
            }
        }
        *chunks = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_len(chunks: &[Chunk]) -> usize {
        chunks.iter().map(|c| c.len).sum()
    }

    #[test]
    fn test_url_retagged_inside_comment() {
        let line = "// see https://example.org/doc for details";
        let mut chunks = vec![Chunk::new(0, line.len(), "comment".to_string())];
        let rule = UrlHighlightRule::new("comment", "text.link");
        rule.analyze(line, 0, &mut chunks);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].style, "text.link");
        let url_start = line.find("https").unwrap();
        assert_eq!(chunks[1].offset, url_start);
        assert_eq!(chunks[1].len, "https://example.org/doc".len());
        assert_eq!(total_len(&chunks), line.len());
    }

    #[test]
    fn test_applies_to_sub_styles_only() {
        let rule = UrlHighlightRule::new("comment", "text.link");
        assert!(rule.applies_to("comment"));
        assert!(rule.applies_to("comment.block"));
        assert!(!rule.applies_to("commentary"));
        assert!(!rule.applies_to("string"));
    }

    #[test]
    fn test_non_matching_chunks_untouched() {
        let line = "let url = \"https://example.org\";";
        let original = vec![
            Chunk::new(0, 10, "text".to_string()),
            Chunk::new(10, line.len() - 10, "string".to_string()),
        ];
        let mut chunks = original.clone();
        let rule = UrlHighlightRule::new("comment", "text.link");
        rule.analyze(line, 0, &mut chunks);
        assert_eq!(chunks, original);
    }

    #[test]
    fn test_coverage_preserved_with_offset() {
        let line = "x // www.example.org tail";
        let line_offset = 100;
        let mut chunks = vec![
            Chunk::new(100, 2, "text".to_string()),
            Chunk::new(102, line.len() - 2, "comment.line".to_string()),
        ];
        let rule = UrlHighlightRule::new("comment", "text.link");
        rule.analyze(line, line_offset, &mut chunks);

        assert_eq!(total_len(&chunks), line.len());
        let mut expected = 100;
        for chunk in &chunks {
            assert_eq!(chunk.offset, expected);
            expected += chunk.len;
        }
        assert!(chunks.iter().any(|c| c.style == "text.link"));
    }
}
