//! Document identity and raw source text.

use std::path::Path;

/// A raw document supplied by the source collaborator.
///
/// `key` is the stable identity every downstream artifact (chunks,
/// indices, summaries, tools) is keyed by; `text` is the full extracted
/// plain text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable document key, unique within a corpus.
    pub key: String,
    /// Full extracted text of the document.
    pub text: String,
}

impl SourceDocument {
    /// Creates a new source document.
    #[must_use]
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Derives a stable document key from a file path.
///
/// The key is `<parent-directory-name>_<file-stem>`, lowercased, with
/// every character outside `[a-z0-9]` folded to `_`. Example:
/// `root/pricing.html` → `root_pricing`.
///
/// Stability matters more than prettiness here: cached indices, summaries,
/// and tool names are all keyed by this string across runs.
#[must_use]
pub fn document_key(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or("doc");

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");

    sanitize(&format!("{parent}_{stem}"))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("root/pricing.html", "root_pricing"; "plain html file")]
    #[test_case("root/faq.html", "root_faq"; "second file same dir")]
    #[test_case("docs/getting-started/install.md", "getting_started_install"; "hyphenated dir")]
    #[test_case("Docs/API.v2.html", "docs_api_v2"; "mixed case and dots")]
    fn test_document_key(path: &str, expected: &str) {
        assert_eq!(document_key(Path::new(path)), expected);
    }

    #[test]
    fn test_document_key_without_parent() {
        let key = document_key(Path::new("orphan.txt"));
        assert_eq!(key, "doc_orphan");
    }

    #[test]
    fn test_source_document_new() {
        let doc = SourceDocument::new("root_pricing", "Plans start at $10.");
        assert_eq!(doc.key, "root_pricing");
        assert_eq!(doc.text, "Plans start at $10.");
    }
}
