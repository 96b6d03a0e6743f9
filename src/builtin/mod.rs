//! Built-in grammars and the default theme
//!
//! Registered on every new registry. The definitions are embedded TOML
//! documents in the same format external `*.mode.toml` files use.

use std::sync::Arc;

use crate::grammar::ROOT_RULE;
use crate::registry::{EmbeddedSource, HighlightRegistry};
use crate::semantic::UrlHighlightRule;
use crate::theme::Theme;

mod c;
mod markdown;

pub use c::GRAMMAR as C_GRAMMAR;
pub use markdown::GRAMMAR as MARKDOWN_GRAMMAR;

pub(crate) fn install(registry: &Arc<HighlightRegistry>) {
    registry.install_theme(Arc::new(Theme::default_theme()));
    for text in [c::GRAMMAR, markdown::GRAMMAR] {
        if let Err(err) = registry.add_grammar(Arc::new(EmbeddedSource::new(text))) {
            log::error!("broken built-in grammar: {err}");
        }
    }
    // URLs in C comments and strings render as links.
    match registry.syntax_mode("text/x-csrc") {
        Ok(mode) => {
            mode.add_semantic_rule(
                ROOT_RULE,
                Arc::new(UrlHighlightRule::new("comment", "text.link")),
            );
            mode.add_semantic_rule(
                ROOT_RULE,
                Arc::new(UrlHighlightRule::new("string", "text.link")),
            );
        }
        Err(err) => log::error!("broken built-in grammar: {err}"),
    }
}
