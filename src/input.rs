use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::segmenter::{SourceDocument, SourcePage};

const FORM_FEED: char = '\x0c';

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Document(SourceDocument),
    Pages(Vec<SourcePage>),
}

/// `.json` files hold a document object or a bare page array; anything else is
/// treated as plain text with form feeds between pages.
pub fn load_document(path: &Path) -> Result<SourceDocument> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    let source = path.display().to_string();

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let parsed: JsonInput = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse page JSON: {}", path.display()))?;
        return Ok(match parsed {
            JsonInput::Document(mut doc) => {
                if doc.source.is_empty() {
                    doc.source = source;
                }
                doc
            }
            JsonInput::Pages(pages) => SourceDocument { source, pages },
        });
    }

    Ok(from_form_feed_text(source, &contents))
}

pub fn from_form_feed_text(source: String, text: &str) -> SourceDocument {
    let mut segments: Vec<&str> = text.split(FORM_FEED).collect();
    if segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }
    let pages = segments
        .into_iter()
        .enumerate()
        .map(|(i, text)| SourcePage {
            page_number: i as u32 + 1,
            text: text.to_string(),
            layout: None,
        })
        .collect();
    SourceDocument { source, pages }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feed_split_drops_trailing_segment() {
        let doc = from_form_feed_text("x".into(), "page one\x0cpage two\x0c");
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].page_number, 2);
        assert_eq!(doc.pages[1].text, "page two");
    }

    #[test]
    fn blank_middle_page_is_kept() {
        let doc = from_form_feed_text("x".into(), "one\x0c\x0cthree");
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[1].text, "");
    }

    #[test]
    fn empty_text_has_no_pages() {
        assert!(from_form_feed_text("x".into(), "").pages.is_empty());
    }

    #[test]
    fn json_document_and_bare_array() {
        let dir = tempfile::tempdir().unwrap();

        let doc_path = dir.path().join("doc.json");
        std::fs::write(
            &doc_path,
            r#"{"source":"chart-17.pdf","pages":[{"page_number":1,"text":"LAB REPORT"}]}"#,
        )
        .unwrap();
        let doc = load_document(&doc_path).unwrap();
        assert_eq!(doc.source, "chart-17.pdf");
        assert_eq!(doc.pages.len(), 1);

        let arr_path = dir.path().join("pages.JSON");
        std::fs::write(&arr_path, r#"[{"page_number":1,"text":"a"},{"page_number":2}]"#).unwrap();
        let doc = load_document(&arr_path).unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].text, "");
        assert!(doc.source.ends_with("pages.JSON"));
    }

    #[test]
    fn text_fixture_loads() {
        let doc = load_document(Path::new("tests/fixtures/chart.txt")).unwrap();
        assert_eq!(doc.pages.len(), 5);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_document(&path).is_err());
    }
}
