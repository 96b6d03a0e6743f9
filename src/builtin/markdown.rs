//! Built-in Markdown grammar
//!
//! Fenced code blocks delegate their body to the C grammar through a
//! cross-grammar rule reference.

pub const GRAMMAR: &str = r##"
name = "Markdown"
mime-types = ["text/markdown", "text/x-markdown"]

[[span]]
tag-color = "text.punctuation"
rule = "mode:text/x-csrc"
begin = '```[^\s`]*'
end = '```'
stop-at-eol = false

[[span]]
color = "text.markup"
begin = '`'
end = '`'

[[span]]
color = "keyword"
begin = '#{1,6} '
starts-line = true

[[span]]
color = "comment"
begin = '> '
starts-line = true

[[span]]
color = "text.markup.tag"
begin = '\*\*'
end = '\*\*'
"##;
