//! Storage Adapter Contract (C3): the capability set every backend
//! implements.
//!
//! Shaped directly on the `VectorStorage` trait in
//! `codetriever-indexer`'s `storage::traits` (an `#[async_trait]` over
//! `&self` with a small config/stats struct pair), generalized to the
//! insert/get/update/delete/search/list/count/info/close surface spec
//! §4.3 names.

use async_trait::async_trait;

use crate::error::Result;
use crate::filter::Filter;
use crate::models::{Chunk, ChunkUpdate, Hit};

/// Options governing a [`StorageAdapter::search`] call.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub k: usize,
    pub filter: Filter,
}

/// Options governing a [`StorageAdapter::list`] call.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub filter: Filter,
}

/// Options governing a [`StorageAdapter::count`] call.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub filter: Filter,
}

/// Static description of a backend, returned by [`StorageAdapter::info`].
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub provider: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// The capability set every storage backend must implement.
///
/// Every method other than `initialize` fails with [`crate::error::Error::NotInitialized`]
/// when called before `initialize` or after `close`, per spec §4.3.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Idempotent setup; subsequent calls after the first are no-ops.
    async fn initialize(&self) -> Result<()>;

    /// Inserts or replaces (by `chunk_id`) a chunk, validating embedding
    /// dimension first. Returns the persisted `chunk_id`.
    async fn insert(&self, chunk: Chunk) -> Result<String>;

    /// Inserts a batch of chunks in input order, all-or-nothing: a
    /// failing element leaves the store unchanged.
    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<String>>;

    /// Returns the chunk with its embedding and reconstructed metadata,
    /// or `None` if absent.
    async fn get(&self, id: &str) -> Result<Option<Chunk>>;

    /// Applies `partial` atomically, refreshing `updated_at`. Fails with
    /// `NotFound` if `id` is absent.
    async fn update(&self, id: &str, partial: ChunkUpdate) -> Result<()>;

    /// Deletes the chunk, its vector, and (if it was the last referent)
    /// its source. Fails with `NotFound` if `id` is absent.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Best-effort batch delete: any `NotFound` aborts without partial
    /// effect.
    async fn delete_batch(&self, ids: &[String]) -> Result<()>;

    /// Returns up to `options.k` hits sorted by descending score.
    async fn search(&self, embedding: &[f32], options: SearchOptions) -> Result<Vec<Hit>>;

    /// Returns chunks ordered by `created_at` descending.
    async fn list(&self, options: ListOptions) -> Result<Vec<Chunk>>;

    /// Returns the cardinality of chunks matching `options.filter`.
    async fn count(&self, options: CountOptions) -> Result<usize>;

    /// Releases resources; subsequent operations fail with `NotInitialized`.
    async fn close(&self) -> Result<()>;

    /// Returns static backend metadata.
    async fn info(&self) -> Result<AdapterInfo>;
}
