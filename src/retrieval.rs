//! Similarity retrieval and context assembly.
//!
//! Turns a user query into a context block by fetching chunks above the
//! similarity threshold from the vector index and concatenating their texts
//! in the order the index returned them.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::index::{IndexError, VectorIndex};

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Nothing cleared the similarity threshold and empty context is
    /// disallowed. The caller decides refusal behavior.
    #[error("no context cleared the similarity threshold")]
    NoContext,
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct RetrievalAugmenter {
    index: Arc<dyn VectorIndex>,
    threshold: f32,
    top_k: usize,
    allow_empty_context: bool,
}

impl RetrievalAugmenter {
    pub fn new(index: Arc<dyn VectorIndex>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            threshold: config.similarity_threshold,
            top_k: config.top_k,
            allow_empty_context: config.allow_empty_context,
        }
    }

    /// Assemble the context block for a query.
    ///
    /// Results are re-filtered against the threshold here so a
    /// below-threshold hit from an index implementation can never leak into
    /// the prompt.
    pub async fn augment(&self, query: &str) -> Result<String, RetrievalError> {
        let hits = self.index.search(query, self.threshold, self.top_k).await?;

        let texts: Vec<&str> = hits
            .iter()
            .filter(|hit| hit.score >= self.threshold)
            .map(|hit| hit.text.as_str())
            .collect();

        debug!(
            retrieved = hits.len(),
            kept = texts.len(),
            threshold = self.threshold,
            "assembled retrieval context"
        );

        if texts.is_empty() {
            if self.allow_empty_context {
                return Ok(String::new());
            }
            return Err(RetrievalError::NoContext);
        }

        Ok(texts.join("\n\n"))
    }
}
