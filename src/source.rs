//! Corpus loading from a documentation directory.
//!
//! Walks the directory tree in sorted order, extracts plain text from
//! the supported formats, and derives each document's stable key from
//! its path relative to the corpus root. Extraction runs in parallel;
//! the returned order is the sorted walk order regardless.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::{SourceDocument, document_key};
use crate::error::SourceError;
use crate::io::read_file;

/// File extensions the loader recognizes, compared case-insensitively.
const SUPPORTED_EXTENSIONS: [&str; 4] = ["html", "htm", "md", "txt"];

static SCRIPT_AND_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>")
        .unwrap_or_else(|_| unreachable!())
});
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap_or_else(|_| unreachable!()));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|div|h[1-6]|li|tr|section|article)\s*>|<br\s*/?>")
        .unwrap_or_else(|_| unreachable!())
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap_or_else(|_| unreachable!()));

/// Walks a documentation directory and loads its documents.
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    root: PathBuf,
    limit: Option<usize>,
}

impl CorpusLoader {
    /// Creates a loader rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            limit: None,
        }
    }

    /// Caps the corpus to the first `limit` files in walk order.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Loads every supported document under the root.
    ///
    /// Hidden files and directories are skipped, as are files whose
    /// extracted text is empty. Document keys must be unique across the
    /// corpus; a collision aborts the load.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotADirectory`] for an unusable root,
    /// [`SourceError::Io`] when a file cannot be read,
    /// [`SourceError::DuplicateKey`] on a key collision, and
    /// [`SourceError::Empty`] when nothing loadable was found.
    pub fn load(&self) -> Result<Vec<SourceDocument>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NotADirectory {
                path: self.root.display().to_string(),
            });
        }

        let mut files = Vec::new();
        collect_files(&self.root, &mut files)?;
        if let Some(limit) = self.limit {
            files.truncate(limit);
        }

        let loaded: Vec<Option<SourceDocument>> = files
            .par_iter()
            .map(|path| self.load_one(path))
            .collect::<Result<_, _>>()?;

        let mut seen = HashSet::new();
        let mut documents = Vec::with_capacity(loaded.len());
        for doc in loaded.into_iter().flatten() {
            if !seen.insert(doc.key.clone()) {
                return Err(SourceError::DuplicateKey { key: doc.key });
            }
            documents.push(doc);
        }
        if documents.is_empty() {
            return Err(SourceError::Empty {
                path: self.root.display().to_string(),
            });
        }

        debug!(documents = documents.len(), "corpus loaded");
        Ok(documents)
    }

    fn load_one(&self, path: &Path) -> Result<Option<SourceDocument>, SourceError> {
        let raw = read_file(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let text = if is_html(path) {
            extract_html(&raw)
        } else {
            tidy_whitespace(&raw)
        };
        if text.is_empty() {
            warn!(path = %path.display(), "skipping document with no extractable text");
            return Ok(None);
        }

        Ok(Some(SourceDocument::new(self.key_for(path), text)))
    }

    /// Derives the document key from the path relative to the root.
    ///
    /// Top-level files key under the synthetic parent `root`, so
    /// `pricing.html` at the corpus root becomes `root_pricing`.
    fn key_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        document_key(&Path::new("root").join(relative))
    }
}

/// Recursively collects supported files under `dir` in sorted order.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), SourceError> {
    let reader = fs::read_dir(dir).map_err(|e| SourceError::Io {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| SourceError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        if !is_hidden(&entry.path()) {
            entries.push(entry.path());
        }
    }
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if is_supported(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        })
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Reduces an HTML document to its visible text.
///
/// Scripts, styles, and comments are removed outright; block-closing
/// tags become line breaks so paragraph structure survives for the
/// sentence splitter.
fn extract_html(html: &str) -> String {
    let text = SCRIPT_AND_STYLE.replace_all(html, " ");
    let text = HTML_COMMENT.replace_all(&text, " ");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = HTML_TAG.replace_all(&text, " ");
    tidy_whitespace(&decode_entities(&text))
}

/// Decodes the handful of entities common in documentation HTML.
///
/// `&amp;` is decoded last so double-escaped text stays escaped once.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapses horizontal whitespace runs and squeezes blank-line runs
/// down to a single paragraph break.
fn tidy_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        blank_run = false;
        out.push_str(&line);
    }
    out
}
