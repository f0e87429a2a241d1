//! Vector index: embed-and-store plus similarity search.
//!
//! Records carry a deterministic id derived from `(source_key, page_index,
//! ordinal)`, so re-indexing a document replaces its previous records instead
//! of duplicating them. That makes re-embedding after a failed archive copy
//! idempotent — the repair path for the embedded-but-still-pending state.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use thiserror::Error;

use crate::chunk::Chunk;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("index storage failed: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A similarity search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub source_key: String,
    pub page_index: u32,
    pub ordinal: u32,
    pub score: f32,
}

/// The shared persistent store for both pipelines: ingestion writes, queries
/// read, and the implementation must tolerate both concurrently.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and persist a batch of chunks. Returns the number of records
    /// written.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize, IndexError>;

    /// Return chunks whose similarity to the query meets `threshold`, best
    /// first, at most `top_k`.
    async fn search(
        &self,
        query: &str,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError>;
}

/// SQLite-backed vector index with brute-force cosine scan.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    /// Deterministic record id: same chunk identity, same id, always.
    fn record_id(chunk: &Chunk) -> String {
        let mut hasher = Sha256::new();
        hasher.update(chunk.source_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.page_index.to_le_bytes());
        hasher.update(chunk.ordinal.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO records
                    (id, source_key, page_index, ordinal, text, embedding, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Self::record_id(chunk))
            .bind(&chunk.source_key)
            .bind(chunk.page_index as i64)
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &str,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        let rows = sqlx::query(
            "SELECT text, source_key, page_index, ordinal, embedding FROM records",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                if score >= threshold {
                    Some(ScoredChunk {
                        text: row.get("text"),
                        source_key: row.get("source_key"),
                        page_index: row.get::<i64, _>("page_index") as u32,
                        ordinal: row.get::<i64, _>("ordinal") as u32,
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(key: &str, page: u32, ordinal: u32) -> Chunk {
        Chunk {
            source_key: key.to_string(),
            page_index: page,
            ordinal,
            text: "body".to_string(),
        }
    }

    #[test]
    fn record_ids_are_deterministic() {
        let a = SqliteVectorIndex::record_id(&chunk("uploaded/doc1.pdf", 0, 3));
        let b = SqliteVectorIndex::record_id(&chunk("uploaded/doc1.pdf", 0, 3));
        assert_eq!(a, b);
    }

    #[test]
    fn record_ids_distinguish_identity_fields() {
        let base = SqliteVectorIndex::record_id(&chunk("uploaded/doc1.pdf", 0, 0));
        assert_ne!(
            base,
            SqliteVectorIndex::record_id(&chunk("uploaded/doc2.pdf", 0, 0))
        );
        assert_ne!(
            base,
            SqliteVectorIndex::record_id(&chunk("uploaded/doc1.pdf", 1, 0))
        );
        assert_ne!(
            base,
            SqliteVectorIndex::record_id(&chunk("uploaded/doc1.pdf", 0, 1))
        );
    }
}
