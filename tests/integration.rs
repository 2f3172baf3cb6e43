//! End-to-end coverage of the acquire → index → store → retrieve pipeline,
//! exercised entirely through the crate's public API, in the spirit of the
//! teacher's `traits_integration.rs`.

use std::sync::Arc;

use ragcore::acquire::{Acquisition, TextInput};
use ragcore::chunk::ChunkOptions;
use ragcore::embed::DisabledEmbedder;
use ragcore::indexer::{run_index, IndexInput};
use ragcore::models::MetadataValue;
use ragcore::registry::{AdapterConfig, Factory, Registry};
use ragcore::retriever::{Retriever, SemanticSearchOptions};
use ragcore::store::StorageAdapter;

async fn memory_store() -> Arc<dyn StorageAdapter> {
    let registry = Registry::with_builtins();
    let factory = Factory::default();
    let partial = AdapterConfig { provider: "memory".to_string(), path: String::new(), dimension: 0 };
    factory.create(&registry, partial).await.unwrap()
}

#[tokio::test]
async fn indexing_then_searching_round_trips_through_the_public_api() {
    let store = memory_store().await;
    let embedder = DisabledEmbedder;

    let alpha = TextInput { id: "S1".to_string(), text: "Rust cargo crates and tooling".to_string(), title: None };
    let beta = TextInput { id: "S2".to_string(), text: "Python machine learning frameworks".to_string(), title: None };

    let summary = run_index(
        &store,
        &embedder,
        vec![
            IndexInput { acquisition: &alpha, chunk_options: ChunkOptions::default(), batch_size: 100 },
            IndexInput { acquisition: &beta, chunk_options: ChunkOptions::default(), batch_size: 100 },
        ],
    )
    .await;

    assert_eq!(summary.items_indexed, 2);
    assert_eq!(summary.chunks_created, 2);
    assert!(summary.errors.is_empty());

    let retriever = Retriever::new(store.clone(), Arc::new(DisabledEmbedder));
    let hits = retriever.search("rust crates", SemanticSearchOptions::default()).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].chunk.content.contains("Rust"));

    let reconstructed = retriever.reconstruct_full_content(&hits[0]).await.unwrap();
    assert_eq!(reconstructed.as_deref(), Some("Rust cargo crates and tooling"));
}

#[tokio::test]
async fn listed_chunks_are_ordered_newest_first_and_carry_source_id() {
    let store = memory_store().await;
    let embedder = DisabledEmbedder;

    let first = TextInput { id: "older".to_string(), text: "older document".to_string(), title: None };
    run_index(
        &store,
        &embedder,
        vec![IndexInput { acquisition: &first, chunk_options: ChunkOptions::default(), batch_size: 100 }],
    )
    .await;

    let second = TextInput { id: "newer".to_string(), text: "newer document".to_string(), title: None };
    run_index(
        &store,
        &embedder,
        vec![IndexInput { acquisition: &second, chunk_options: ChunkOptions::default(), batch_size: 100 }],
    )
    .await;

    let listed = store
        .list(ragcore::store::ListOptions { limit: 10, offset: 0, filter: ragcore::filter::Filter::new() })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].content, "newer document");
    assert_eq!(listed[1].content, "older document");
    assert!(listed[0].metadata.get("sourceId").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn custom_adapter_registration_rejects_a_nonexistent_library_path() {
    let mut registry = Registry::with_builtins();
    let err = registry.register_custom("bogus", "/nonexistent/path/to/adapter.so").unwrap_err();
    assert!(matches!(err, ragcore::error::Error::AdapterLoad { .. }));
    // A failed load must not clobber an already-registered builtin provider.
    assert!(registry.is_registered("memory"));
}

struct FailingAcquisition;

#[async_trait::async_trait]
impl Acquisition for FailingAcquisition {
    async fn acquire(&self) -> ragcore::error::Result<Vec<ragcore::acquire::AcquiredItem>> {
        Err(ragcore::error::Error::Acquisition("network down".to_string()))
    }
}

#[tokio::test]
async fn one_failing_input_does_not_abort_the_rest_of_the_run() {
    let store = memory_store().await;
    let embedder = DisabledEmbedder;
    let failing = FailingAcquisition;
    let good = TextInput { id: "S1".to_string(), text: "still indexed".to_string(), title: None };

    let summary = run_index(
        &store,
        &embedder,
        vec![
            IndexInput { acquisition: &failing, chunk_options: ChunkOptions::default(), batch_size: 100 },
            IndexInput { acquisition: &good, chunk_options: ChunkOptions::default(), batch_size: 100 },
        ],
    )
    .await;

    assert_eq!(summary.items_indexed, 1);
    assert_eq!(summary.errors.len(), 1);

    let listed = store
        .list(ragcore::store::ListOptions { limit: 10, offset: 0, filter: ragcore::filter::Filter::new() })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "still indexed");
}

#[tokio::test]
async fn filtering_search_by_metadata_excludes_non_matching_chunks() {
    use ragcore::filter::Filter;
    use ragcore::store::ListOptions;

    let store = memory_store().await;
    let embedder = DisabledEmbedder;
    let code = TextInput { id: "code-source".to_string(), text: "fn main() {}".to_string(), title: None };
    run_index(
        &store,
        &embedder,
        vec![IndexInput { acquisition: &code, chunk_options: ChunkOptions::default(), batch_size: 100 }],
    )
    .await;

    let mut filter = Filter::new();
    filter.insert("chunkIndex".to_string(), MetadataValue::Number(0.0));
    let listed = store.list(ListOptions { limit: 10, offset: 0, filter }).await.unwrap();
    assert_eq!(listed.len(), 1);

    let mut missing_filter = Filter::new();
    missing_filter.insert("chunkIndex".to_string(), MetadataValue::Number(7.0));
    let none = store.list(ListOptions { limit: 10, offset: 0, filter: missing_filter }).await.unwrap();
    assert!(none.is_empty());
}
