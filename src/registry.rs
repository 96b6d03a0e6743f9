//! Grammar and theme registry with the background rescan worker
//!
//! The [`HighlightRegistry`] maps mime types to lazily loaded syntax
//! modes and theme names to lazily loaded themes. It owns a single
//! background thread that processes queued [`UpdateJob`]s in FIFO order:
//! each job rescans start-of-line span stacks from an edited range
//! downward, stopping early once the stacks converge with the cached
//! ones. The worker is the only writer of cached stacks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::builtin;
use crate::document::{Document, DocumentId};
use crate::error::{HighlightError, Result};
use crate::grammar::GrammarDoc;
use crate::mode::SyntaxMode;
use crate::scanner::{NullSink, SpanScanner};
use crate::theme::Theme;

/// Provider of a grammar or theme definition document
///
/// Sources are re-read on (re)load, so replacing a file on disk and
/// re-adding its source picks up the new content.
pub trait DefinitionSource: Send + Sync {
    fn read(&self) -> Result<String>;
}

/// Definition loaded from a file on each (re)load
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DefinitionSource for FileSource {
    fn read(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }
}

/// Definition embedded in the binary
pub struct EmbeddedSource {
    text: &'static str,
}

impl EmbeddedSource {
    pub const fn new(text: &'static str) -> Self {
        Self { text }
    }
}

impl DefinitionSource for EmbeddedSource {
    fn read(&self) -> Result<String> {
        Ok(self.text.to_string())
    }
}

/// Host callback invoked when a finished job changed cached stacks
pub type RedrawHook = Box<dyn Fn(DocumentId) + Send + Sync>;

/// One queued rescan of a document's start-of-line stacks
pub struct UpdateJob {
    doc: Arc<dyn Document>,
    mode: Arc<SyntaxMode>,
    start_offset: usize,
    end_offset: usize,
    lines_visited: AtomicUsize,
    finished: Mutex<bool>,
    done: Condvar,
}

impl UpdateJob {
    fn new(
        doc: Arc<dyn Document>,
        mode: Arc<SyntaxMode>,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            doc,
            mode,
            start_offset,
            end_offset,
            lines_visited: AtomicUsize::new(0),
            finished: Mutex::new(false),
            done: Condvar::new(),
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.doc.id()
    }

    /// Lines the rescan actually visited; stays small when the stacks
    /// converge right after the edited range
    pub fn lines_visited(&self) -> usize {
        self.lines_visited.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap()
    }

    /// Block until the worker has processed this job
    pub fn wait(&self) {
        let mut finished = self.finished.lock().unwrap();
        while !*finished {
            finished = self.done.wait(finished).unwrap();
        }
    }

    fn mark_finished(&self) {
        *self.finished.lock().unwrap() = true;
        self.done.notify_all();
    }

    /// Rescan from the edited range downward; returns whether any cached
    /// stack changed
    ///
    /// Lines inside `[start_offset, end_offset]` are always rescanned.
    /// Past the range the scan stops as soon as the incoming stack equals
    /// the cached one: every line below would compute unchanged too.
    fn scan(&self) -> bool {
        let doc = self.doc.as_ref();
        let Some(first) = doc.line_index_at(self.start_offset.min(doc.len())) else {
            return false;
        };
        let mut line = first;
        let mut prev_text = if line > 0 { doc.line_text(line - 1) } else { None };
        let mut scanner = SpanScanner::new(self.mode.clone(), doc.start_stack(line));
        let mut changed = false;
        loop {
            let Some((line_start, _)) = doc.line_span(line) else {
                break;
            };
            let Some(text) = doc.line_text(line) else {
                break;
            };
            scanner.carry_past_eol(prev_text.as_deref());
            let incoming = scanner.stack_snapshot();
            let cached = doc.start_stack(line);
            if line_start > self.end_offset && incoming == cached {
                break;
            }
            if incoming != cached {
                changed = true;
                doc.set_start_stack(line, incoming);
            }
            self.lines_visited.fetch_add(1, Ordering::Relaxed);
            scanner.scan_line(line_start, &text, &mut NullSink);
            prev_text = Some(text);
            line += 1;
            if line >= doc.line_count() {
                break;
            }
        }
        changed
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Arc<UpdateJob>>,
    shutdown: bool,
}

#[derive(Default)]
struct JobQueue {
    state: Mutex<QueueState>,
    signal: Condvar,
    redraw: Mutex<Option<RedrawHook>>,
}

fn worker_loop(queue: Arc<JobQueue>) {
    loop {
        let job = {
            let mut state = queue.state.lock().unwrap();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.pending.front().cloned() {
                    break job;
                }
                state = queue.signal.wait(state).unwrap();
            }
        };
        // A panicking grammar or document must not kill the worker.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.scan()));

        let mut state = queue.state.lock().unwrap();
        state.pending.retain(|pending| !Arc::ptr_eq(pending, &job));
        drop(state);

        match outcome {
            Ok(changed) => {
                log::debug!(
                    "rescanned document {}: {} lines, changed: {changed}",
                    job.doc.id(),
                    job.lines_visited()
                );
                if changed {
                    if let Some(hook) = queue.redraw.lock().unwrap().as_ref() {
                        hook(job.doc.id());
                    }
                }
            }
            Err(_) => log::error!("rescan of document {} panicked", job.doc.id()),
        }
        job.mark_finished();
    }
}

#[derive(Default)]
struct RegistryInner {
    modes: HashMap<String, Arc<SyntaxMode>>,
    mode_sources: HashMap<String, Arc<dyn DefinitionSource>>,
    themes: HashMap<String, Arc<Theme>>,
    theme_sources: HashMap<String, Arc<dyn DefinitionSource>>,
}

/// The process-wide entry point of the highlighting engine
pub struct HighlightRegistry {
    inner: Mutex<RegistryInner>,
    queue: Arc<JobQueue>,
}

impl HighlightRegistry {
    /// Create a registry with the built-in grammars and theme, and spawn
    /// its rescan worker
    pub fn new() -> Arc<Self> {
        let queue = Arc::new(JobQueue::default());
        let registry = Arc::new(Self {
            inner: Mutex::new(RegistryInner::default()),
            queue: queue.clone(),
        });
        thread::Builder::new()
            .name("syntax highlighting".to_string())
            .spawn(move || worker_loop(queue))
            .expect("worker thread spawns");
        builtin::install(&registry);
        registry
    }

    /// Look up (and lazily load) the syntax mode for a mime type
    pub fn syntax_mode(self: &Arc<Self>, mime: &str) -> Result<Arc<SyntaxMode>> {
        self.syntax_mode_guarded(mime, &mut HashSet::new())
    }

    /// `loading` holds the mime types of the current `extends` chain, so
    /// cycle detection never trips over another thread loading the same
    /// grammar at the same time.
    fn syntax_mode_guarded(
        self: &Arc<Self>,
        mime: &str,
        loading: &mut HashSet<String>,
    ) -> Result<Arc<SyntaxMode>> {
        let source = {
            let inner = self.inner.lock().unwrap();
            if let Some(mode) = inner.modes.get(mime) {
                return Ok(mode.clone());
            }
            inner
                .mode_sources
                .get(mime)
                .cloned()
                .ok_or_else(|| HighlightError::UnknownMimeType(mime.to_string()))?
        };
        if !loading.insert(mime.to_string()) {
            return Err(HighlightError::grammar(mime, "cyclic extends chain"));
        }

        let mode = self.load_mode(mime, source.as_ref(), loading)?;
        loading.remove(mime);
        log::debug!("loaded grammar '{}' for '{mime}'", mode.name());
        let mut inner = self.inner.lock().unwrap();
        for served in mode.mime_types() {
            inner.modes.insert(served.clone(), mode.clone());
        }
        inner.modes.insert(mime.to_string(), mode.clone());
        Ok(mode)
    }

    fn load_mode(
        self: &Arc<Self>,
        mime: &str,
        source: &dyn DefinitionSource,
        loading: &mut HashSet<String>,
    ) -> Result<Arc<SyntaxMode>> {
        let doc = GrammarDoc::parse(&source.read()?)?;
        let base = match &doc.extends {
            Some(base_mime) => Some(self.syntax_mode_guarded(base_mime, loading)?),
            None => None,
        };
        let mode = Arc::new(SyntaxMode::compile(&doc, base.as_deref())?);
        if !mode.mime_types().iter().any(|m| m == mime) {
            return Err(HighlightError::grammar(
                mode.name(),
                format!("grammar does not serve mime type '{mime}'"),
            ));
        }
        mode.attach_registry(self);
        Ok(mode)
    }

    /// Look up (and lazily load) a theme by name
    pub fn theme(&self, name: &str) -> Result<Arc<Theme>> {
        let source = {
            let inner = self.inner.lock().unwrap();
            if let Some(theme) = inner.themes.get(name) {
                return Ok(theme.clone());
            }
            inner
                .theme_sources
                .get(name)
                .cloned()
                .ok_or_else(|| HighlightError::UnknownTheme(name.to_string()))?
        };
        let theme = Arc::new(Theme::from_toml_str(&source.read()?)?);
        log::debug!("loaded theme '{name}'");
        if theme.name() != name {
            return Err(HighlightError::theme(
                name,
                format!("document declares name '{}'", theme.name()),
            ));
        }
        self.inner
            .lock()
            .unwrap()
            .themes
            .insert(name.to_string(), theme.clone());
        Ok(theme)
    }

    /// Register a grammar source; returns the mime types it serves
    ///
    /// Re-adding a source for already-registered mime types drops the
    /// cached compiled mode, so the next lookup reloads it.
    pub fn add_grammar(&self, source: Arc<dyn DefinitionSource>) -> Result<Vec<String>> {
        let doc = GrammarDoc::parse(&source.read()?)?;
        if doc.mime_types.is_empty() {
            return Err(HighlightError::grammar(&doc.name, "no mime types declared"));
        }
        let mut inner = self.inner.lock().unwrap();
        for mime in &doc.mime_types {
            inner.mode_sources.insert(mime.clone(), source.clone());
            inner.modes.remove(mime);
        }
        Ok(doc.mime_types)
    }

    /// Register a theme source; returns the theme's name
    pub fn add_theme(&self, source: Arc<dyn DefinitionSource>) -> Result<String> {
        let theme = Theme::from_toml_str(&source.read()?)?;
        let name = theme.name().to_string();
        let mut inner = self.inner.lock().unwrap();
        inner.theme_sources.insert(name.clone(), source);
        inner.themes.remove(&name);
        Ok(name)
    }

    /// Register an already compiled mode under its mime types
    pub fn install_syntax_mode(self: &Arc<Self>, mode: Arc<SyntaxMode>) {
        mode.attach_registry(self);
        let mut inner = self.inner.lock().unwrap();
        for mime in mode.mime_types() {
            inner.modes.insert(mime.clone(), mode.clone());
        }
    }

    pub fn install_theme(&self, theme: Arc<Theme>) {
        self.inner
            .lock()
            .unwrap()
            .themes
            .insert(theme.name().to_string(), theme);
    }

    /// Drop the mode and source registered for a mime type
    pub fn remove_syntax_mode(&self, mime: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.modes.remove(mime);
        inner.mode_sources.remove(mime);
    }

    pub fn remove_theme(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.themes.remove(name);
        inner.theme_sources.remove(name);
    }

    /// Register every `*.mode.toml` and `*.theme.toml` under `dir`
    ///
    /// Broken definitions are logged and skipped; the rest still load.
    pub fn load_directory(&self, dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let result = if file_name.ends_with(".mode.toml") {
                self.add_grammar(Arc::new(FileSource::new(&path))).map(|_| ())
            } else if file_name.ends_with(".theme.toml") {
                self.add_theme(Arc::new(FileSource::new(&path))).map(|_| ())
            } else {
                continue;
            };
            if let Err(err) = result {
                log::warn!("skipping {}: {err}", path.display());
            }
        }
        Ok(())
    }

    /// Names of all registered themes, loaded or not
    pub fn theme_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .themes
            .keys()
            .chain(inner.theme_sources.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Mime types of all registered grammars, loaded or not
    pub fn mime_types(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut mimes: Vec<String> = inner
            .modes
            .keys()
            .chain(inner.mode_sources.keys())
            .cloned()
            .collect();
        mimes.sort();
        mimes.dedup();
        mimes
    }

    /// Load everything and check every grammar against every theme
    ///
    /// Mismatches and broken definitions are logged; returns whether all
    /// combinations check out.
    pub fn validate_all(self: &Arc<Self>) -> bool {
        let mut ok = true;
        let mut modes = Vec::new();
        for mime in self.mime_types() {
            match self.syntax_mode(&mime) {
                Ok(mode) => modes.push(mode),
                Err(err) => {
                    log::warn!("can't load grammar for '{mime}': {err}");
                    ok = false;
                }
            }
        }
        for name in self.theme_names() {
            match self.theme(&name) {
                Ok(theme) => {
                    for mode in &modes {
                        ok &= mode.validate(&theme);
                    }
                }
                Err(err) => {
                    log::warn!("can't load theme '{name}': {err}");
                    ok = false;
                }
            }
        }
        ok
    }

    /// Install the callback invoked when a rescan changed cached stacks
    pub fn set_redraw_hook(&self, hook: impl Fn(DocumentId) + Send + Sync + 'static) {
        *self.queue.redraw.lock().unwrap() = Some(Box::new(hook));
    }

    /// Queue an incremental rescan of `[start_offset, end_offset]`
    ///
    /// No job is ever canceled once enqueued: a superseding edit enqueues
    /// an additional job. Each job reads the then-current text and cached
    /// stacks and converges, so stale-then-fresh execution leaves the
    /// cache consistent, and every returned handle reaches completion.
    pub fn start_update(
        &self,
        doc: Arc<dyn Document>,
        mode: Arc<SyntaxMode>,
        start_offset: usize,
        end_offset: usize,
    ) -> Arc<UpdateJob> {
        let job = Arc::new(UpdateJob::new(doc, mode, start_offset, end_offset));
        let mut state = self.queue.state.lock().unwrap();
        state.pending.push_back(job.clone());
        drop(state);
        self.queue.signal.notify_one();
        job
    }

    /// Block until every queued job for `doc_id` has been processed
    ///
    /// A coarse barrier: after it returns, cached stacks reflect all
    /// updates queued before the call.
    pub fn wait_update(&self, doc_id: DocumentId) {
        let jobs: Vec<Arc<UpdateJob>> = {
            let state = self.queue.state.lock().unwrap();
            state
                .pending
                .iter()
                .filter(|job| job.doc.id() == doc_id)
                .cloned()
                .collect()
        };
        for job in jobs {
            job.wait();
        }
    }
}

impl Drop for HighlightRegistry {
    fn drop(&mut self) {
        self.queue.state.lock().unwrap().shutdown = true;
        self.queue.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextBuffer;

    fn toy_grammar() -> &'static str {
        r#"
name = "toy"
mime-types = ["text/x-toy"]

[[span]]
color = "comment.block"
begin = '/\*'
end = '\*/'
stop-at-eol = false
"#
    }

    #[test]
    fn test_unknown_mime_type() {
        let registry = HighlightRegistry::new();
        let err = registry.syntax_mode("application/x-nope").unwrap_err();
        assert!(matches!(err, HighlightError::UnknownMimeType(_)));
    }

    #[test]
    fn test_lazy_load_and_cache() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let a = registry.syntax_mode("text/x-toy").unwrap();
        let b = registry.syntax_mode("text/x-toy").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "toy");
    }

    #[test]
    fn test_re_adding_grammar_reloads() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let before = registry.syntax_mode("text/x-toy").unwrap();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let after = registry.syntax_mode("text/x-toy").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_cyclic_extends_chain_is_an_error() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(
                "name = \"a\"\nmime-types = [\"text/x-a\"]\nextends = \"text/x-b\"\n",
            )))
            .unwrap();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(
                "name = \"b\"\nmime-types = [\"text/x-b\"]\nextends = \"text/x-a\"\n",
            )))
            .unwrap();
        let err = registry.syntax_mode("text/x-a").unwrap_err();
        assert!(matches!(err, HighlightError::Grammar { .. }));
    }

    #[test]
    fn test_concurrent_lookups_of_same_grammar() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();

        // Several threads racing on the same not-yet-loaded mime type all
        // get the grammar; none of them trips the extends cycle guard.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry
                        .syntax_mode("text/x-toy")
                        .map(|mode| mode.name().to_string())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "toy");
        }
    }

    #[test]
    fn test_builtin_registrations() {
        let registry = HighlightRegistry::new();
        assert!(registry.theme("default").is_ok());
        assert!(registry.syntax_mode("text/x-csrc").is_ok());
        assert!(registry.syntax_mode("text/markdown").is_ok());
        assert!(registry.theme_names().contains(&"default".to_string()));
    }

    #[test]
    fn test_unknown_theme() {
        let registry = HighlightRegistry::new();
        assert!(matches!(
            registry.theme("midnight").unwrap_err(),
            HighlightError::UnknownTheme(_)
        ));
    }

    #[test]
    fn test_validate_all_builtins() {
        let registry = HighlightRegistry::new();
        assert!(registry.validate_all());
    }

    #[test]
    fn test_update_job_waits_and_counts() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let mode = registry.syntax_mode("text/x-toy").unwrap();
        let doc: Arc<dyn Document> = Arc::new(TextBuffer::new(7, "a\nb\nc\nd"));

        let job = registry.start_update(doc.clone(), mode, 0, doc.len());
        job.wait();
        assert!(job.is_finished());
        assert_eq!(job.lines_visited(), 4);
        registry.wait_update(7); // nothing pending; returns immediately
    }

    #[test]
    fn test_no_job_is_canceled_by_a_later_one() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let mode = registry.syntax_mode("text/x-toy").unwrap();
        let doc: Arc<dyn Document> = Arc::new(TextBuffer::new(7, "a\nb\nc"));

        // Two edits in quick succession enqueue two jobs for the same
        // document. The first is never dropped, so its handle always
        // reaches completion and waiting on it cannot hang.
        let first = registry.start_update(doc.clone(), mode.clone(), 0, 1);
        let second = registry.start_update(doc.clone(), mode, 0, doc.len());
        second.wait();
        assert!(first.is_finished());
        first.wait();
    }

    #[test]
    fn test_cascading_invalidation_fires_redraw() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let mode = registry.syntax_mode("text/x-toy").unwrap();
        let doc = Arc::new(TextBuffer::new(3, "aaa\nbbb\nccc"));
        registry
            .start_update(doc.clone(), mode.clone(), 0, doc.len())
            .wait();

        let redrawn = Arc::new(Mutex::new(Vec::new()));
        let sink = redrawn.clone();
        registry.set_redraw_hook(move |id| sink.lock().unwrap().push(id));

        // Opening a comment at the top re-stacks every following line.
        doc.insert(0, "/* ");
        let job = registry.start_update(doc.clone(), mode, 0, 3);
        job.wait();
        assert_eq!(job.lines_visited(), 3);
        assert_eq!(redrawn.lock().unwrap().as_slice(), &[3]);

        // Lines 1 and 2 now start inside the comment.
        assert_eq!(doc.start_stack(1).len(), 1);
        assert_eq!(doc.start_stack(2).len(), 1);
        assert!(doc.start_stack(0).is_empty());
    }

    #[test]
    fn test_convergence_stops_early() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let mode = registry.syntax_mode("text/x-toy").unwrap();
        let doc = Arc::new(TextBuffer::new(4, "/* a\nb */\nc\nd\ne"));
        registry
            .start_update(doc.clone(), mode.clone(), 0, doc.len())
            .wait();
        assert_eq!(doc.start_stack(1).len(), 1);

        // An edit that leaves the span structure alone converges after
        // the edited line: the job never visits the rest.
        doc.replace(3, 1, "x");
        let job = registry.start_update(doc.clone(), mode, 3, 4);
        job.wait();
        assert_eq!(job.lines_visited(), 1);
        assert_eq!(doc.start_stack(1).len(), 1);
    }

    #[test]
    fn test_implicit_eol_close_does_not_leak_to_next_line() {
        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(
                r#"
name = "liney"
mime-types = ["text/x-liney"]

[[span]]
color = "comment.line"
begin = '//'
"#,
            )))
            .unwrap();
        let mode = registry.syntax_mode("text/x-liney").unwrap();
        let doc = Arc::new(TextBuffer::new(5, "// all comment\ncode"));
        registry
            .start_update(doc.clone(), mode.clone(), 0, doc.len())
            .wait();

        assert!(doc.start_stack(1).is_empty());
        let (start, len) = doc.line_span(1).unwrap();
        let chunks = mode.get_chunks(doc.as_ref(), 1, start, len);
        assert_eq!(chunks[0].style, "text");
    }

    #[test]
    fn test_worker_survives_panicking_document() {
        struct PanicDoc;
        impl Document for PanicDoc {
            fn id(&self) -> DocumentId {
                99
            }
            fn len(&self) -> usize {
                4
            }
            fn line_count(&self) -> usize {
                1
            }
            fn line_index_at(&self, _offset: usize) -> Option<usize> {
                Some(0)
            }
            fn line_span(&self, _line: usize) -> Option<(usize, usize)> {
                Some((0, 4))
            }
            fn line_text(&self, _line: usize) -> Option<String> {
                panic!("broken document")
            }
            fn char_at(&self, _offset: usize) -> Option<char> {
                None
            }
            fn text_at(&self, _offset: usize, _len: usize) -> String {
                String::new()
            }
            fn start_stack(&self, _line: usize) -> crate::grammar::SpanStack {
                crate::grammar::SpanStack::new()
            }
            fn set_start_stack(&self, _line: usize, _stack: crate::grammar::SpanStack) {}
        }

        let registry = HighlightRegistry::new();
        registry
            .add_grammar(Arc::new(EmbeddedSource::new(toy_grammar())))
            .unwrap();
        let mode = registry.syntax_mode("text/x-toy").unwrap();

        let bad = registry.start_update(Arc::new(PanicDoc), mode.clone(), 0, 4);
        bad.wait();
        assert!(bad.is_finished());

        // The worker is still alive and processes the next job.
        let doc: Arc<dyn Document> = Arc::new(TextBuffer::new(7, "a\nb"));
        let good = registry.start_update(doc, mode, 0, 3);
        good.wait();
        assert_eq!(good.lines_visited(), 2);
    }

    #[test]
    fn test_markdown_delegates_fenced_code() {
        let registry = HighlightRegistry::new();
        let mode = registry.syntax_mode("text/markdown").unwrap();
        let doc = Arc::new(TextBuffer::new(8, "```c\nint x;\n```\n"));
        registry
            .start_update(doc.clone(), mode.clone(), 0, doc.len())
            .wait();

        // Inside the fence the C grammar's keywords apply.
        let (start, len) = doc.line_span(1).unwrap();
        let chunks = mode.get_chunks(doc.as_ref(), 1, start, len);
        assert_eq!(chunks[0].style, "keyword.type");
        let total: usize = chunks.iter().map(|c| c.len).sum();
        assert_eq!(total, len);

        // The fence closed: the last line is back in Markdown.
        assert!(doc.start_stack(3).is_empty());
    }
}
