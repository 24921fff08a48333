//! Batched embedding of chunks.
//!
//! Chunks are embedded in batches of `batch_size`, with at most
//! `parallelism` batches in flight at once to respect the external
//! service's rate limits. Batch failures are isolated: a batch that fails
//! after the provider's own retries marks only its chunks as missing, and
//! sibling batches proceed. The caller decides what a partial result means
//! (index degraded to "partial", never data loss).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::index::BuildProgress;
use crate::inference::InferenceService;
use crate::models::{Chunk, EmbeddingRecord};

/// Result of one embedding pass.
pub struct EmbedOutcome {
    /// One record per successfully embedded chunk, in chunk order.
    pub records: Vec<EmbeddingRecord>,
    /// Chunks whose batch failed permanently.
    pub failed: usize,
}

/// Embed every chunk, isolating per-batch failures.
pub async fn embed_chunks(
    service: Arc<dyn InferenceService>,
    config: &InferenceConfig,
    chunks: &[Chunk],
    progress: Option<Arc<BuildProgress>>,
) -> EmbedOutcome {
    if chunks.is_empty() {
        return EmbedOutcome {
            records: Vec::new(),
            failed: 0,
        };
    }

    let batch_size = config.batch_size.max(1);
    let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
    let mut join_set: JoinSet<(usize, Option<Vec<Vec<f32>>>)> = JoinSet::new();

    let batches: Vec<Vec<Chunk>> = chunks.chunks(batch_size).map(|b| b.to_vec()).collect();
    let batch_count = batches.len();

    for (batch_idx, batch) in batches.iter().enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let service = Arc::clone(&service);
        let semaphore = Arc::clone(&semaphore);
        let progress = progress.clone();
        let expected = texts.len();

        join_set.spawn(async move {
            // Closing the semaphore is not part of this flow; acquire only
            // fails if it were, so treat that as a failed batch.
            let Ok(_permit) = semaphore.acquire().await else {
                return (batch_idx, None);
            };
            match service.embed(&texts).await {
                Ok(vectors) if vectors.len() == expected && uniform_dims(&vectors) => {
                    if let Some(p) = &progress {
                        p.embedded.fetch_add(expected, Ordering::Relaxed);
                    }
                    (batch_idx, Some(vectors))
                }
                Ok(vectors) => {
                    warn!(
                        batch = batch_idx,
                        got = vectors.len(),
                        expected,
                        "embedding batch returned malformed vector set"
                    );
                    (batch_idx, None)
                }
                Err(e) => {
                    warn!(batch = batch_idx, error = %e, "embedding batch failed");
                    (batch_idx, None)
                }
            }
        });
    }

    let mut results: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
    while let Some(joined) = join_set.join_next().await {
        if let Ok((batch_idx, vectors)) = joined {
            results[batch_idx] = vectors;
        }
    }

    // Vectors within one snapshot must share a dimensionality; a batch
    // disagreeing with the first successful one is dropped like a failure.
    let dims = results
        .iter()
        .flatten()
        .flat_map(|v| v.first())
        .map(|v| v.len())
        .next();

    let mut records = Vec::with_capacity(chunks.len());
    let mut failed = 0;

    for (batch, result) in batches.iter().zip(results.into_iter()) {
        match result {
            Some(vectors) if dims.is_none_or(|d| vectors.iter().all(|v| v.len() == d)) => {
                for (chunk, vector) in batch.iter().zip(vectors) {
                    records.push(EmbeddingRecord {
                        chunk_id: chunk.id.clone(),
                        vector,
                    });
                }
            }
            Some(_) => {
                warn!("embedding batch dropped: dimensionality mismatch");
                failed += batch.len();
            }
            None => failed += batch.len(),
        }
    }

    debug!(
        chunks = chunks.len(),
        embedded = records.len(),
        failed,
        "embedding pass complete"
    );

    EmbedOutcome { records, failed }
}

fn uniform_dims(vectors: &[Vec<f32>]) -> bool {
    match vectors.first() {
        Some(first) => !first.is_empty() && vectors.iter().all(|v| v.len() == first.len()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingStub {
        calls: AtomicUsize,
        fail_batches_containing: Option<String>,
    }

    #[async_trait]
    impl InferenceService for CountingStub {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(marker) = &self.fail_batches_containing {
                if texts.iter().any(|t| t.contains(marker.as_str())) {
                    bail!("simulated embedding outage");
                }
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            bail!("not used")
        }
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_file: "a.txt".to_string(),
            start_line: 1,
            end_line: 1,
            text: text.to_string(),
            ordinal: 0,
        }
    }

    fn config(batch_size: usize) -> InferenceConfig {
        InferenceConfig {
            provider: "openai".to_string(),
            batch_size,
            parallelism: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_embeds_all_chunks_in_batches() {
        let stub = Arc::new(CountingStub {
            calls: AtomicUsize::new(0),
            fail_batches_containing: None,
        });
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("c{i}"), "text")).collect();

        let outcome = embed_chunks(stub.clone(), &config(2), &chunks, None).await;
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3); // ceil(5/2)
        // Records stay aligned with chunk order.
        assert_eq!(outcome.records[0].chunk_id, "c0");
        assert_eq!(outcome.records[4].chunk_id, "c4");
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let stub = Arc::new(CountingStub {
            calls: AtomicUsize::new(0),
            fail_batches_containing: Some("poison".to_string()),
        });
        let chunks = vec![
            chunk("c0", "fine"),
            chunk("c1", "poison pill"),
            chunk("c2", "also fine"),
        ];

        let outcome = embed_chunks(stub, &config(1), &chunks, None).await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records.iter().all(|r| r.chunk_id != "c1"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let stub = Arc::new(CountingStub {
            calls: AtomicUsize::new(0),
            fail_batches_containing: None,
        });
        let outcome = embed_chunks(stub.clone(), &config(4), &[], None).await;
        assert!(outcome.records.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }
}
