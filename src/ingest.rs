//! Ingestion pipeline orchestration.
//!
//! Each tick runs discover → load → chunk → embed → archive over the pending
//! prefix. Document failures are contained at the document boundary: a bad
//! object is logged and left pending while the rest of the tick proceeds. A
//! listing failure aborts the tick before any side effects.
//!
//! Archiving moves a key from the pending prefix to the archived prefix only
//! after every chunk derived from it has been indexed: verify the target does
//! not exist (skip with a warning if it does — never overwrite), copy, verify
//! the copy, and delete the source only after verification.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::chunk;
use crate::config::Config;
use crate::index::VectorIndex;
use crate::loader;
use crate::store::{archived_key, BlobStore, StoreError};

/// Outcome summary for one ingestion tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Keys found under the pending prefix at the start of the tick.
    pub discovered: usize,
    /// Total chunks written to the vector index this tick.
    pub indexed_chunks: usize,
    /// Keys that completed load → chunk → embed.
    pub succeeded: Vec<String>,
    /// Keys that failed somewhere before the archive step.
    pub failed: Vec<String>,
    /// Keys moved to the archived prefix.
    pub archived: usize,
    /// Keys whose archive target already existed (left untouched).
    pub archive_skipped: usize,
}

pub struct IngestionPipeline {
    store: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    pending_prefix: String,
    archived_prefix: String,
    max_tokens: usize,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            index,
            pending_prefix: config.store.pending_prefix.clone(),
            archived_prefix: config.store.archived_prefix.clone(),
            max_tokens: config.chunking.max_tokens,
            include: build_globset(&config.store.include_globs)?,
            exclude: build_globset(&config.store.exclude_globs)?,
        })
    }

    /// List the pending keys that form a tick's work order.
    pub async fn discover(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.list(&self.pending_prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|key| {
                let rel = key.strip_prefix(&self.pending_prefix).unwrap_or(key);
                if let Some(exclude) = &self.exclude {
                    if exclude.is_match(rel) {
                        return false;
                    }
                }
                if let Some(include) = &self.include {
                    return include.is_match(rel);
                }
                true
            })
            .collect())
    }

    /// Run one full ingestion tick.
    ///
    /// The discovery listing is the complete work order: keys appearing
    /// mid-tick wait for the next tick. A listing failure aborts with no
    /// side effects.
    pub async fn run_tick(&self) -> Result<TickReport, StoreError> {
        let keys = self.discover().await?;

        let mut report = TickReport {
            discovered: keys.len(),
            ..TickReport::default()
        };
        if keys.is_empty() {
            info!("no pending documents");
            return Ok(report);
        }
        info!(pending = keys.len(), "starting ingestion tick");

        for key in &keys {
            match self.ingest_key(key).await {
                Ok(0) => {
                    info!(key = %key, "no chunks to index, leaving pending");
                }
                Ok(count) => {
                    info!(key = %key, chunks = count, "indexed document");
                    report.indexed_chunks += count;
                    report.succeeded.push(key.clone());
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to ingest document");
                    report.failed.push(key.clone());
                }
            }
        }

        let succeeded = report.succeeded.clone();
        self.archive_embedded(&succeeded, &mut report).await;

        info!(
            discovered = report.discovered,
            indexed_chunks = report.indexed_chunks,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            archived = report.archived,
            archive_skipped = report.archive_skipped,
            "ingestion tick finished"
        );
        Ok(report)
    }

    /// Load, chunk, and index one pending document. Returns the number of
    /// chunks written.
    async fn ingest_key(&self, key: &str) -> anyhow::Result<usize> {
        let documents = loader::load(self.store.as_ref(), key).await?;
        if documents.is_empty() {
            return Ok(0);
        }
        let chunks = chunk::split(&documents, self.max_tokens);
        if chunks.is_empty() {
            return Ok(0);
        }
        let written = self.index.add(&chunks).await?;
        Ok(written)
    }

    /// Move fully-indexed documents from the pending to the archived prefix.
    ///
    /// Never overwrites: an existing target is skipped with a warning, both
    /// objects left untouched. The source is deleted only after the copy has
    /// been verified; a verification failure leaves the document indexed but
    /// still pending, which the deterministic record ids repair on the next
    /// tick.
    pub async fn archive_embedded(&self, keys: &[String], report: &mut TickReport) {
        if keys.is_empty() {
            return;
        }
        info!(count = keys.len(), "archiving embedded documents");

        for key in keys {
            let target = archived_key(key, &self.pending_prefix, &self.archived_prefix);

            match self.store.exists(&target).await {
                Ok(true) => {
                    warn!(key = %key, target = %target, "archive target already exists, skipping");
                    report.archive_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(key = %key, target = %target, error = %e, "failed to probe archive target");
                    continue;
                }
            }

            if let Err(e) = self.store.copy(key, &target).await {
                error!(key = %key, target = %target, error = %e, "failed to copy document to archive");
                continue;
            }

            match self.store.exists(&target).await {
                Ok(true) => {}
                Ok(false) => {
                    error!(key = %key, target = %target, "archive copy verification failed, source left in place");
                    continue;
                }
                Err(e) => {
                    error!(key = %key, target = %target, error = %e, "archive copy verification failed");
                    continue;
                }
            }

            match self.store.delete(key).await {
                Ok(true) => {
                    info!(key = %key, target = %target, "archived document");
                    report.archived += 1;
                }
                Ok(false) => {
                    warn!(key = %key, "copy succeeded but source was already gone");
                    report.archived += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "copy succeeded but failed to delete source");
                }
            }
        }
    }
}

/// Drive the pipeline on a fixed interval.
///
/// A single consumer task makes ticks non-reentrant, and skipped tick
/// behavior means a trigger that fires while a tick is still running is
/// dropped rather than queued.
pub async fn run_scheduler(pipeline: Arc<IngestionPipeline>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if let Err(e) = pipeline.run_tick().await {
            error!(error = %e, "ingestion tick aborted");
        }
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}
