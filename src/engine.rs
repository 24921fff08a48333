//! Analysis engine facade.
//!
//! Wires the pipeline together behind the four operations collaborators
//! call: `ingest`, `query`, `graph`, and `status` (plus a `stats`
//! summary). Ingestion runs the full flow — parse → hierarchy +
//! dependencies → chunk → embed — under the store's single-flight
//! discipline and publishes one immutable snapshot at the end. Queries
//! and graph generation are pure reads against published snapshots and
//! run concurrently with unrelated ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::answer;
use crate::chunk::{chunk_file, reassemble};
use crate::config::Config;
use crate::deps::extract_dependencies;
use crate::error::{RepoLensError, Result};
use crate::graph::build_graph;
use crate::hierarchy::build_hierarchy;
use crate::index::IndexStore;
use crate::inference::InferenceService;
use crate::models::{
    Answer, Chunk, DependencyGraph, IndexStats, IndexStatus, IngestReport, IngestStatus,
    KnowledgeIndex,
};
use crate::parser::parse_dump;
use crate::retrieve;

pub struct Engine {
    config: Config,
    service: Arc<dyn InferenceService>,
    store: Arc<IndexStore>,
}

impl Engine {
    pub fn new(config: Config, service: Arc<dyn InferenceService>) -> Self {
        let store = Arc::new(IndexStore::new(config.index.capacity));
        Self {
            config,
            service,
            store,
        }
    }

    /// Ingest a repository dump under its content fingerprint.
    ///
    /// Re-ingesting a fingerprint that is already resident is a no-op.
    /// Concurrent calls for one fingerprint share a single build; late
    /// arrivals receive the published result. On timeout or cancellation
    /// nothing is published and the fingerprint stays "not indexed".
    pub async fn ingest(&self, fingerprint: &str, raw_text: &str) -> Result<IngestReport> {
        let timeout = Duration::from_secs(self.config.index.ingest_timeout_secs);
        match tokio::time::timeout(timeout, self.ingest_inner(fingerprint, raw_text)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(fingerprint, "ingestion timed out; nothing published");
                Err(RepoLensError::Timeout(self.config.index.ingest_timeout_secs))
            }
        }
    }

    async fn ingest_inner(&self, fingerprint: &str, raw_text: &str) -> Result<IngestReport> {
        let build_lock = self.store.build_lock(fingerprint);
        let _flight = build_lock.lock().await;

        // Content-addressed reuse: identical content across re-fetches
        // keeps the resident snapshot and issues no embedding calls.
        if let Some(existing) = self.store.peek(fingerprint) {
            info!(fingerprint, "fingerprint already indexed; no-op");
            return Ok(IngestReport {
                fingerprint: fingerprint.to_string(),
                status: IngestStatus::Unchanged,
                file_count: existing.files.len(),
                chunk_count: existing.chunks.len(),
                warnings: Vec::new(),
            });
        }

        let files = parse_dump(raw_text)?;
        let mut warnings = Vec::new();

        let binary_count = files.iter().filter(|f| f.is_binary).count();
        if binary_count > 0 {
            warnings.push(format!(
                "{binary_count} binary file(s) indexed as metadata-only stubs"
            ));
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            let file_chunks = chunk_file(file, &self.config.chunking);
            if !file.is_binary && !file.content.is_empty() && reassemble(&file_chunks) != file.content
            {
                error!(path = %file.path, "chunker failed to partition file content");
                return Err(RepoLensError::Chunking {
                    path: file.path.clone(),
                    reason: "chunk concatenation does not reproduce file content".to_string(),
                });
            }
            chunks.extend(file_chunks);
        }

        let hierarchy = build_hierarchy(&files);
        let dependencies = extract_dependencies(&files);

        let mut language_stats: BTreeMap<String, u64> = BTreeMap::new();
        for file in &files {
            *language_stats
                .entry(file.language.as_str().to_string())
                .or_insert(0) += 1;
        }

        info!(
            fingerprint,
            files = files.len(),
            chunks = chunks.len(),
            dependencies = dependencies.len(),
            "parsed ingestion dump"
        );

        let guard = self.store.begin_build(fingerprint, chunks.len());
        let outcome = crate::embedder::embed_chunks(
            Arc::clone(&self.service),
            &self.config.inference,
            &chunks,
            Some(guard.progress()),
        )
        .await;

        let status = if outcome.failed > 0 {
            warnings.push(format!(
                "{} of {} chunks have no embedding; retrieval precision is degraded",
                outcome.failed,
                chunks.len()
            ));
            IngestStatus::Partial
        } else {
            IngestStatus::Ready
        };

        let report = IngestReport {
            fingerprint: fingerprint.to_string(),
            status,
            file_count: files.len(),
            chunk_count: chunks.len(),
            warnings,
        };

        guard.publish(KnowledgeIndex {
            fingerprint: fingerprint.to_string(),
            files,
            hierarchy,
            dependencies,
            chunks,
            embeddings: outcome.records,
            language_stats,
            created_at: Utc::now(),
        });

        info!(fingerprint, status = ?report.status, "index published");
        Ok(report)
    }

    /// Answer a question about an indexed repository.
    pub async fn query(&self, fingerprint: &str, question: &str) -> Result<Answer> {
        let index = self.store.get(fingerprint)?;

        // Nothing embedded (fresh partial failure, or inference disabled):
        // retrieval cannot rank anything, so skip the service entirely.
        if index.embeddings.is_empty() {
            return Ok(answer::no_context_answer());
        }

        let query_vecs = self
            .service
            .embed(&[question.to_string()])
            .await
            .map_err(RepoLensError::Inference)?;
        let query_vec = query_vecs
            .into_iter()
            .next()
            .ok_or_else(|| RepoLensError::Inference(anyhow::anyhow!("empty embedding response")))?;

        let retrieved = retrieve::top_k(
            &index,
            &query_vec,
            self.config.retrieval.top_k,
            self.config.retrieval.min_score,
        );
        info!(
            fingerprint,
            retrieved = retrieved.len(),
            top_score = retrieved.first().map(|r| f64::from(r.score)).unwrap_or(0.0),
            "retrieval complete"
        );

        answer::synthesize(
            self.service.as_ref(),
            &self.config.synthesis,
            question,
            &retrieved,
        )
        .await
    }

    /// Regenerate the dependency graph from the current snapshot.
    pub fn graph(&self, fingerprint: &str) -> Result<DependencyGraph> {
        let index = self.store.get(fingerprint)?;
        Ok(build_graph(&index))
    }

    /// Observable state of a fingerprint's index.
    pub fn status(&self, fingerprint: &str) -> IndexStatus {
        self.store.status(fingerprint)
    }

    /// Corpus statistics for an indexed repository.
    pub fn stats(&self, fingerprint: &str) -> Result<IndexStats> {
        let index = self.store.get(fingerprint)?;

        let mut file_kinds: BTreeMap<String, u64> = BTreeMap::new();
        for file in &index.files {
            *file_kinds
                .entry(file.kind().as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(IndexStats {
            fingerprint: fingerprint.to_string(),
            file_count: index.files.len(),
            chunk_count: index.chunks.len(),
            embedded_count: index.embeddings.len(),
            dependency_count: index.dependencies.len(),
            languages: index.language_stats.clone(),
            file_kinds,
        })
    }
}
