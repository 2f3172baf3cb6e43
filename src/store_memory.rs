//! In-memory Backend (C4): a reference [`StorageAdapter`] over a
//! `HashMap`, using on-the-fly cosine similarity for search.
//!
//! Grounded on the teacher's `fetch_vector_candidates` brute-force cosine
//! scan in `search.rs` (no persistence, linear scan, `cosine_similarity`
//! from `embedding.rs`), adapted into a standalone backend rather than one
//! arm of a combined search function.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::filter::CompiledFilter;
use crate::models::{ensure_dimension, Chunk, ChunkUpdate, Hit, Source};
use crate::store::{AdapterInfo, CountOptions, ListOptions, SearchOptions, StorageAdapter};

const DEFAULT_DIMENSION: usize = 768;

struct State {
    initialized: bool,
    closed: bool,
    chunks: HashMap<String, Chunk>,
    /// Insertion order of chunk ids, for `list`'s stable ordering and the
    /// in-memory backend's documented non-transactional batch semantics.
    order: Vec<String>,
    sources: HashMap<String, Source>,
    /// Count of live chunks per source, for cascade-delete bookkeeping.
    source_refcounts: HashMap<String, usize>,
}

impl State {
    fn new() -> Self {
        Self {
            initialized: false,
            closed: false,
            chunks: HashMap::new(),
            order: Vec::new(),
            sources: HashMap::new(),
            source_refcounts: HashMap::new(),
        }
    }
}

/// A process-local, non-persistent [`StorageAdapter`] backed by a
/// `HashMap<String, Chunk>`.
pub struct MemoryAdapter {
    dimension: usize,
    state: RwLock<State>,
}

impl MemoryAdapter {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(State::new()),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

fn require_live(state: &State) -> Result<()> {
    if !state.initialized || state.closed {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

/// `cos(a,b) = Σ aᵢbᵢ / (√Σaᵢ² · √Σbᵢ²)`; `0` if either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Attaches source-derived metadata (`originalContent` on chunk 0 only,
/// plus `title`/`url`/`sourceType` when known) onto a retrieved chunk,
/// mirroring the SQL backend's read path (spec §4.5).
fn hydrate(mut chunk: Chunk, sources: &HashMap<String, Source>) -> Chunk {
    if let Some(source_id) = chunk.source_id.clone() {
        chunk
            .metadata
            .insert("sourceId".to_string(), source_id.clone().into());
        if let Some(source) = sources.get(&source_id) {
            if let Some(title) = &source.title {
                chunk
                    .metadata
                    .insert("title".to_string(), title.clone().into());
            }
            if let Some(url) = &source.url {
                chunk.metadata.insert("url".to_string(), url.clone().into());
            }
            if let Some(kind) = source.source_kind {
                chunk
                    .metadata
                    .insert("sourceType".to_string(), kind.as_str().into());
            }
            if chunk.chunk_index == Some(0) {
                chunk.metadata.insert(
                    "originalContent".to_string(),
                    source.original_content.clone().into(),
                );
            }
        }
    }
    chunk
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.initialized && !state.closed {
            return Ok(());
        }
        state.initialized = true;
        state.closed = false;
        Ok(())
    }

    async fn insert(&self, chunk: Chunk) -> Result<String> {
        let ids = self.insert_batch(vec![chunk]).await?;
        Ok(ids.into_iter().next().unwrap())
    }

    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<String>> {
        let mut state = self.state.write().unwrap();
        require_live(&state)?;

        for chunk in &chunks {
            ensure_dimension(&chunk.embedding, self.dimension)?;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let original_content = chunk.metadata.get("originalContent").and_then(|v| v.as_str()).map(String::from);
            let is_first = matches!(chunk.chunk_index, None | Some(0));

            if let Some(source_id) = chunk.source_id.clone() {
                if !state.sources.contains_key(&source_id) {
                    if is_first {
                        if let Some(content) = original_content {
                            let title = chunk.metadata.get("title").and_then(|v| v.as_str()).map(String::from);
                            let url = chunk.metadata.get("url").and_then(|v| v.as_str()).map(String::from);
                            let kind = chunk
                                .metadata
                                .get("sourceType")
                                .and_then(|v| v.as_str())
                                .and_then(crate::models::SourceKind::parse);
                            state.sources.insert(
                                source_id.clone(),
                                Source {
                                    source_id: source_id.clone(),
                                    original_content: content,
                                    title,
                                    url,
                                    source_kind: kind,
                                    created_at: Utc::now(),
                                },
                            );
                        }
                    }
                }
            }

            let mut to_store = chunk.clone();
            to_store.metadata.remove("originalContent");

            let replaced = state.chunks.insert(to_store.chunk_id.clone(), to_store.clone());
            if replaced.is_none() {
                state.order.push(to_store.chunk_id.clone());
            }

            // Only adjust refcounts for an actual change of source
            // association; re-inserting the same chunk_id under the same
            // source_id (re-indexing unchanged content) must not inflate
            // the count, or a source would never be reclaimed on delete.
            let old_source_id = replaced.and_then(|c| c.source_id);
            if old_source_id != to_store.source_id {
                if let Some(old_source_id) = &old_source_id {
                    if let Some(count) = state.source_refcounts.get_mut(old_source_id) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            state.source_refcounts.remove(old_source_id);
                            state.sources.remove(old_source_id);
                        }
                    }
                }
                if let Some(source_id) = &to_store.source_id {
                    *state.source_refcounts.entry(source_id.clone()).or_insert(0) += 1;
                }
            }

            ids.push(to_store.chunk_id);
        }

        Ok(ids)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let state = self.state.read().unwrap();
        require_live(&state)?;
        Ok(state.chunks.get(id).cloned().map(|c| hydrate(c, &state.sources)))
    }

    async fn update(&self, id: &str, partial: ChunkUpdate) -> Result<()> {
        let mut state = self.state.write().unwrap();
        require_live(&state)?;

        if let Some(embedding) = &partial.embedding {
            ensure_dimension(embedding, self.dimension)?;
        }

        let chunk = state
            .chunks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(content) = partial.content {
            chunk.content = content;
        }
        if let Some(embedding) = partial.embedding {
            chunk.embedding = embedding;
        }
        if let Some(metadata) = partial.metadata {
            chunk.metadata = metadata;
            chunk.metadata.remove("originalContent");
        }
        chunk.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        require_live(&state)?;

        let chunk = state
            .chunks
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        state.order.retain(|existing| existing != id);

        if let Some(source_id) = chunk.source_id {
            if let Some(count) = state.source_refcounts.get_mut(&source_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.source_refcounts.remove(&source_id);
                    state.sources.remove(&source_id);
                }
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let state = self.state.read().unwrap();
        require_live(&state)?;
        for id in ids {
            if !state.chunks.contains_key(id) {
                return Err(Error::NotFound(id.clone()));
            }
        }
        drop(state);
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], options: SearchOptions) -> Result<Vec<Hit>> {
        let state = self.state.read().unwrap();
        require_live(&state)?;
        ensure_dimension(embedding, self.dimension)?;

        let compiled = CompiledFilter::compile(&options.filter)?;

        let mut scored: Vec<Hit> = state
            .order
            .iter()
            .filter_map(|id| state.chunks.get(id))
            .filter(|chunk| compiled.matches(&chunk.metadata))
            .map(|chunk| {
                let score = cosine_similarity(embedding, &chunk.embedding);
                Hit {
                    chunk: hydrate(chunk.clone(), &state.sources),
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.k);
        Ok(scored)
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<Chunk>> {
        let state = self.state.read().unwrap();
        require_live(&state)?;
        let compiled = CompiledFilter::compile(&options.filter)?;

        let mut matching: Vec<Chunk> = state
            .order
            .iter()
            .filter_map(|id| state.chunks.get(id))
            .filter(|chunk| compiled.matches(&chunk.metadata))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .map(|c| hydrate(c, &state.sources))
            .collect())
    }

    async fn count(&self, options: CountOptions) -> Result<usize> {
        let state = self.state.read().unwrap();
        require_live(&state)?;
        let compiled = CompiledFilter::compile(&options.filter)?;
        Ok(state
            .chunks
            .values()
            .filter(|chunk| compiled.matches(&chunk.metadata))
            .count())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        *state = State::new();
        state.closed = true;
        Ok(())
    }

    async fn info(&self) -> Result<AdapterInfo> {
        Ok(AdapterInfo {
            provider: "memory".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["search".into(), "list".into(), "count".into()],
        })
    }
}
