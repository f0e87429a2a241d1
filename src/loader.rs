//! Document loading and text extraction.
//!
//! Turns a store key into one or more [`LogicalDocument`]s. PDF objects yield
//! one document per page; anything else is decoded as UTF-8 text into a
//! single page-0 document. Parsing is a pure function of the raw bytes, so
//! fixture-based tests are fully deterministic.

use thiserror::Error;

use crate::store::{BlobStore, StoreError};

/// One extracted text unit (a PDF page, or a whole non-PDF object).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDocument {
    pub source_key: String,
    pub page_index: u32,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("document not found: {key}")]
    NotFound { key: String },
    #[error("failed to read {key}: {message}")]
    Store { key: String, message: String },
    #[error("failed to parse {key}: {message}")]
    Parse { key: String, message: String },
}

impl LoadError {
    fn from_store(key: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => LoadError::NotFound { key },
            StoreError::Storage(message) => LoadError::Store {
                key: key.to_string(),
                message,
            },
        }
    }
}

/// Load a store object and parse it into per-page logical documents.
pub async fn load(store: &dyn BlobStore, key: &str) -> Result<Vec<LogicalDocument>, LoadError> {
    let bytes = store
        .get(key)
        .await
        .map_err(|e| LoadError::from_store(key, e))?;
    parse_document(key, &bytes)
}

/// Load a store object as a single whole-object text document, no pagination.
pub async fn load_raw(store: &dyn BlobStore, key: &str) -> Result<LogicalDocument, LoadError> {
    let bytes = store
        .get(key)
        .await
        .map_err(|e| LoadError::from_store(key, e))?;
    Ok(parse_raw(key, &bytes))
}

/// Parse raw object bytes into logical documents. Pure function of its input.
pub fn parse_document(key: &str, bytes: &[u8]) -> Result<Vec<LogicalDocument>, LoadError> {
    if is_pdf(key, bytes) {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
            LoadError::Parse {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| LogicalDocument {
                source_key: key.to_string(),
                page_index: i as u32,
                text: clean_text(&text),
            })
            .collect())
    } else {
        Ok(vec![parse_raw(key, bytes)])
    }
}

/// Parse object bytes as one page-0 text document.
pub fn parse_raw(key: &str, bytes: &[u8]) -> LogicalDocument {
    LogicalDocument {
        source_key: key.to_string(),
        page_index: 0,
        text: clean_text(&String::from_utf8_lossy(bytes)),
    }
}

fn is_pdf(key: &str, bytes: &[u8]) -> bool {
    let by_extension = key
        .rsplit('.')
        .next()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    by_extension || bytes.starts_with(b"%PDF-")
}

/// Strip embedded null characters that PDF extractors occasionally emit.
fn clean_text(text: &str) -> String {
    if text.contains('\u{0000}') {
        text.replace('\u{0000}', "")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_text_is_a_single_page_zero_document() {
        let doc = parse_raw("uploaded/notes.txt", b"hello world");
        assert_eq!(doc.source_key, "uploaded/notes.txt");
        assert_eq!(doc.page_index, 0);
        assert_eq!(doc.text, "hello world");
    }

    #[test]
    fn null_characters_are_stripped() {
        let doc = parse_raw("uploaded/notes.txt", b"he\x00llo\x00");
        assert_eq!(doc.text, "hello");
    }

    #[test]
    fn non_pdf_bytes_parse_as_one_document() {
        let docs = parse_document("uploaded/notes.txt", b"plain body").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "plain body");
    }

    #[test]
    fn corrupt_pdf_is_a_parse_error() {
        let err = parse_document("uploaded/bad.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn pdf_detection_uses_extension_or_magic() {
        assert!(is_pdf("uploaded/a.pdf", b""));
        assert!(is_pdf("uploaded/a.PDF", b""));
        assert!(is_pdf("uploaded/a.bin", b"%PDF-1.7 rest"));
        assert!(!is_pdf("uploaded/a.txt", b"plain"));
    }
}
