//! Indexer (C8): acquire → chunk → batch-embed → persist, producing a
//! structured summary.
//!
//! Sequencing is grounded on the teacher's `ingest::run_sync` (scan →
//! filter → per-item chunk/embed/persist, one transactional replace per
//! item, non-fatal embedding failures), generalized from its
//! connector-specific scan to the generic [`Acquisition`] collaborator
//! and narrowed to per-input error accumulation rather than incremental
//! sync bookkeeping (checkpoints are out of scope per SPEC_FULL.md §4).

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::acquire::Acquisition;
use crate::chunk::{chunk_document, ChunkOptions};
use crate::embed::{EmbedBatchOptions, Embedder};
use crate::models::Chunk as ChunkModel;
use crate::store::StorageAdapter;

/// One input to index: an [`Acquisition`] collaborator plus the options
/// governing how its acquired items are chunked.
pub struct IndexInput<'a> {
    pub acquisition: &'a dyn Acquisition,
    pub chunk_options: ChunkOptions,
    pub batch_size: usize,
}

/// The structured result of an indexing run (spec §4.8).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSummary {
    pub items_indexed: usize,
    pub chunks_created: usize,
    pub errors: Vec<String>,
}

/// A deterministic source id derived from a path/id string, so repeated
/// indexing of the same input resolves to the same `Source` row.
fn source_id_for(path_or_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path_or_id.as_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// Orchestrates one or more [`IndexInput`]s against `store`, embedding
/// chunks through `embedder`. One input's failure is accumulated into
/// `errors` and does not abort the remainder; each input's chunks are
/// all-or-nothing at the `insert_batch` granularity.
pub async fn run_index(
    store: &Arc<dyn StorageAdapter>,
    embedder: &dyn Embedder,
    inputs: Vec<IndexInput<'_>>,
) -> IndexSummary {
    let mut summary = IndexSummary::default();

    for input in inputs {
        let items = match input.acquisition.acquire().await {
            Ok(items) => items,
            Err(e) => {
                summary.errors.push(e.to_string());
                continue;
            }
        };

        for item in items {
            match index_one(store, embedder, &item, &input.chunk_options, input.batch_size).await {
                Ok(chunks_created) => {
                    summary.items_indexed += 1;
                    summary.chunks_created += chunks_created;
                }
                Err(message) => summary.errors.push(message),
            }
        }
    }

    summary
}

async fn index_one(
    store: &Arc<dyn StorageAdapter>,
    embedder: &dyn Embedder,
    item: &crate::acquire::AcquiredItem,
    chunk_options: &ChunkOptions,
    batch_size: usize,
) -> Result<usize, String> {
    let raw_chunks = chunk_document(&item.path_or_id, &item.bytes_utf8, chunk_options);
    if raw_chunks.is_empty() {
        return Err("No chunks generated from text".to_string());
    }

    let texts: Vec<String> = raw_chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts, EmbedBatchOptions { batch_size, on_progress: None })
        .await
        .map_err(|e| e.to_string())?;

    let source_id = source_id_for(&item.path_or_id);
    let total = raw_chunks.len();
    let mut chunks = Vec::with_capacity(total);

    for (index, (raw, embedding)) in raw_chunks.into_iter().zip(embeddings).enumerate() {
        let mut chunk = ChunkModel::new(raw.text);
        chunk.source_id = Some(source_id.clone());
        chunk.embedding = embedding;
        chunk.chunk_index = Some(index as i64);
        chunk.total_chunks = Some(total as i64);

        if index == 0 {
            chunk
                .metadata
                .insert("originalContent".to_string(), item.bytes_utf8.clone().into());
        }
        if let Some(title) = &item.title {
            chunk.metadata.insert("title".to_string(), title.clone().into());
        }
        if let Some(url) = &item.url {
            chunk.metadata.insert("url".to_string(), url.clone().into());
        }
        chunk
            .metadata
            .insert("sourceId".to_string(), source_id.clone().into());
        chunk
            .metadata
            .insert("chunkIndex".to_string(), crate::models::MetadataValue::Number(index as f64));
        chunk
            .metadata
            .insert("totalChunks".to_string(), crate::models::MetadataValue::Number(total as f64));

        chunks.push(chunk);
    }

    store
        .insert_batch(chunks)
        .await
        .map(|ids| ids.len())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::TextInput;
    use crate::embed::DisabledEmbedder;
    use crate::store_memory::MemoryAdapter;

    #[tokio::test]
    async fn indexing_text_persists_chunks_with_source_metadata() {
        let store: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new(0));
        store.initialize().await.unwrap();

        let input = TextInput { id: "S1".to_string(), text: "ORIG".to_string(), title: None };
        let summary = run_index(
            &store,
            &DisabledEmbedder,
            vec![IndexInput { acquisition: &input, chunk_options: ChunkOptions::default(), batch_size: 100 }],
        )
        .await;

        assert_eq!(summary.items_indexed, 1);
        assert_eq!(summary.chunks_created, 1);
        assert!(summary.errors.is_empty());

        let listed = store.list(Default::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].metadata.get("originalContent").and_then(|v| v.as_str()),
            Some("ORIG")
        );
        assert_eq!(
            listed[0].metadata.get("sourceId").and_then(|v| v.as_str()),
            Some(source_id_for("S1").as_str())
        );
    }

    #[tokio::test]
    async fn second_chunk_of_same_source_does_not_duplicate_source_row() {
        let store: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new(0));
        store.initialize().await.unwrap();

        let long_text = "a".repeat(50);
        let input = TextInput { id: "S1".to_string(), text: long_text, title: None };
        let summary = run_index(
            &store,
            &DisabledEmbedder,
            vec![IndexInput {
                acquisition: &input,
                chunk_options: ChunkOptions { chunk_size: Some(20), chunk_overlap: Some(2), preserve_boundaries: false },
                batch_size: 100,
            }],
        )
        .await;

        assert!(summary.chunks_created >= 2);
    }

    #[tokio::test]
    async fn acquisition_failure_is_collected_not_fatal() {
        struct Failing;
        #[async_trait::async_trait]
        impl Acquisition for Failing {
            async fn acquire(&self) -> crate::error::Result<Vec<crate::acquire::AcquiredItem>> {
                Err(crate::error::Error::Acquisition("boom".to_string()))
            }
        }

        let store: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new(0));
        store.initialize().await.unwrap();
        let failing = Failing;
        let summary = run_index(
            &store,
            &DisabledEmbedder,
            vec![IndexInput { acquisition: &failing, chunk_options: ChunkOptions::default(), batch_size: 100 }],
        )
        .await;
        assert_eq!(summary.items_indexed, 0);
        assert_eq!(summary.errors.len(), 1);
    }
}
