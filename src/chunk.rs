//! Paragraph-boundary text chunker.
//!
//! Splits logical documents into bounded-size chunks suitable for embedding.
//! Splitting occurs on paragraph boundaries (`\n\n`) where possible; a single
//! paragraph longer than the bound is hard-split at whitespace. Chunking is
//! deterministic: identical input always yields byte-identical chunks with
//! identical ordinals, which is what makes re-embedding a document after a
//! failed archive idempotent.

use crate::loader::LogicalDocument;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A bounded-length text unit with ordering preserved within its source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_key: String,
    pub page_index: u32,
    /// Sequential position within the source page, starting at 0.
    pub ordinal: u32,
    pub text: String,
}

/// Split documents into token-bounded chunks. Ordinals restart at 0 for each
/// logical document. Pages with no non-whitespace text yield no chunks.
pub fn split(documents: &[LogicalDocument], max_tokens: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in documents {
        split_page(doc, max_tokens, &mut chunks);
    }
    chunks
}

fn split_page(doc: &LogicalDocument, max_tokens: usize, out: &mut Vec<Chunk>) {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let mut ordinal: u32 = 0;
    let mut current = String::new();

    let flush = |buf: &mut String, ordinal: &mut u32, out: &mut Vec<Chunk>| {
        if !buf.is_empty() {
            out.push(Chunk {
                source_key: doc.source_key.clone(),
                page_index: doc.page_index,
                ordinal: *ordinal,
                text: std::mem::take(buf),
            });
            *ordinal += 1;
        }
    };

    for para in doc.text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Flush the buffer when appending this paragraph would exceed the bound
        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };
        if would_be > max_chars && !current.is_empty() {
            flush(&mut current, &mut ordinal, out);
        }

        if trimmed.len() > max_chars {
            flush(&mut current, &mut ordinal, out);
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = split_point(remaining, max_chars);
                let piece = remaining[..split_at].trim();
                if !piece.is_empty() {
                    out.push(Chunk {
                        source_key: doc.source_key.clone(),
                        page_index: doc.page_index,
                        ordinal,
                        text: piece.to_string(),
                    });
                    ordinal += 1;
                }
                remaining = &remaining[split_at..];
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    flush(&mut current, &mut ordinal, out);
}

/// Pick a split offset at most `max_chars` bytes in, preferring a newline or
/// space boundary and never landing inside a UTF-8 sequence.
fn split_point(text: &str, max_chars: usize) -> usize {
    if text.len() <= max_chars {
        return text.len();
    }
    let mut limit = max_chars;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    text[..limit]
        .rfind('\n')
        .or_else(|| text[..limit].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str, page: u32, text: &str) -> LogicalDocument {
        LogicalDocument {
            source_key: key.to_string(),
            page_index: page,
            text: text.to_string(),
        }
    }

    #[test]
    fn small_text_is_a_single_chunk() {
        let chunks = split(&[doc("doc1", 0, "Hello, world!")], 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        let chunks = split(&[doc("doc1", 0, "   \n\n  ")], 700);
        assert!(chunks.is_empty());
    }

    #[test]
    fn paragraphs_under_limit_stay_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split(&[doc("doc1", 0, text)], 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn paragraphs_over_limit_split_with_contiguous_ordinals() {
        // max_tokens=5 => 20 chars
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = split(&[doc("doc1", 0, text)], 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i as u32);
            assert!(c.text.len() <= 20);
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits_at_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = split(&[doc("doc1", 0, text)], 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20, "chunk too long: {:?}", c.text);
            assert!(!c.text.starts_with(' '));
            assert!(!c.text.ends_with(' '));
        }
    }

    #[test]
    fn ordinals_restart_per_page() {
        let docs = vec![
            doc("doc1", 0, "Page one alpha.\n\nPage one beta."),
            doc("doc1", 1, "Page two alpha.\n\nPage two beta."),
        ];
        let chunks = split(&docs, 4);
        let page0: Vec<_> = chunks.iter().filter(|c| c.page_index == 0).collect();
        let page1: Vec<_> = chunks.iter().filter(|c| c.page_index == 1).collect();
        assert!(!page0.is_empty() && !page1.is_empty());
        assert_eq!(page0[0].ordinal, 0);
        assert_eq!(page1[0].ordinal, 0);
        for (i, c) in page0.iter().enumerate() {
            assert_eq!(c.ordinal, i as u32);
        }
        for (i, c) in page1.iter().enumerate() {
            assert_eq!(c.ordinal, i as u32);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = split(&[doc("doc1", 0, text)], 5);
        let b = split(&[doc("doc1", 0, text)], 5);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_character() {
        let text = "é".repeat(100);
        let chunks = split(&[doc("doc1", 0, &text)], 5);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().all(|ch| ch == 'é'));
        }
    }
}
