//! Retriever (C9): embed query → backend search → optional hybrid blend
//! → optional keyword re-rank → optional full-content reconstruction →
//! stats.
//!
//! The re-ranker and hybrid blend are grounded on the teacher's
//! `search.rs` hybrid-mode scoring (`normalize_scores`, convex
//! combination of keyword/vector scores) generalized from "two
//! independent candidate lists blended" into "one semantic result list
//! boosted/blended by a lexical match ratio", per spec §4.9's narrower
//! re-ranker/hybrid contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::embed::Embedder;
use crate::error::Result;
use crate::filter::Filter;
use crate::models::{Hit, MetadataValue, SearchStats};
use crate::store::{SearchOptions, StorageAdapter};

const DEFAULT_RERANK_BOOST: f64 = 0.1;
const DEFAULT_HYBRID_KEYWORD_WEIGHT: f64 = 0.3;

/// Options for [`Retriever::search`].
#[derive(Debug, Clone)]
pub struct SemanticSearchOptions {
    pub k: usize,
    pub source_type: Option<String>,
    pub rerank: bool,
    pub rerank_boost: f64,
}

impl Default for SemanticSearchOptions {
    fn default() -> Self {
        Self { k: 5, source_type: None, rerank: true, rerank_boost: DEFAULT_RERANK_BOOST }
    }
}

/// Options for [`Retriever::hybrid_search`].
#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
    pub k: usize,
    pub source_type: Option<String>,
    pub keyword_weight: f64,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self { k: 5, source_type: None, keyword_weight: DEFAULT_HYBRID_KEYWORD_WEIGHT }
    }
}

/// Embeds queries and searches a [`StorageAdapter`], with optional
/// lexical re-ranking/hybrid blending and full-content reconstruction.
pub struct Retriever {
    store: Arc<dyn StorageAdapter>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(store: Arc<dyn StorageAdapter>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    fn filter_for(source_type: &Option<String>) -> Filter {
        let mut filter = Filter::new();
        if let Some(source_type) = source_type {
            filter.insert("sourceType".to_string(), MetadataValue::from(source_type.as_str()));
        }
        filter
    }

    /// Semantic search: embed `query`, call the backend, optionally
    /// re-rank (spec §4.9).
    pub async fn search(&self, query: &str, options: SemanticSearchOptions) -> Result<Vec<Hit>> {
        let embedding = self.embedder.embed(query).await?;
        let filter = Self::filter_for(&options.source_type);
        let hits = self.store.search(&embedding, SearchOptions { k: options.k, filter }).await?;

        if options.rerank {
            Ok(rerank(query, hits, options.rerank_boost))
        } else {
            Ok(hits)
        }
    }

    /// Hybrid search: semantic search with reranking disabled, blended
    /// with a lexical match ratio via convex combination (spec §4.9).
    pub async fn hybrid_search(&self, query: &str, options: HybridSearchOptions) -> Result<Vec<Hit>> {
        let semantic = self
            .search(
                query,
                SemanticSearchOptions {
                    k: options.k,
                    source_type: options.source_type.clone(),
                    rerank: false,
                    rerank_boost: DEFAULT_RERANK_BOOST,
                },
            )
            .await?;
        Ok(hybrid_blend(query, semantic, options.keyword_weight))
    }

    /// Resolves the hit's `sourceId` and returns `(chunk_text,
    /// original_content)`. Free when the hit already carries
    /// `originalContent` (chunk 0); otherwise fetches the source's first
    /// chunk from the adapter.
    pub async fn reconstruct_full_content(&self, hit: &Hit) -> Result<Option<String>> {
        if let Some(original) = hit.chunk.metadata.get("originalContent").and_then(|v| v.as_str()) {
            return Ok(Some(original.to_string()));
        }
        let Some(source_id) = &hit.chunk.source_id else {
            return Ok(None);
        };
        let mut filter = Filter::new();
        filter.insert("sourceId".to_string(), MetadataValue::from(source_id.as_str()));
        filter.insert("chunkIndex".to_string(), MetadataValue::Number(0.0));
        let list = self
            .store
            .list(crate::store::ListOptions { limit: 1, offset: 0, filter })
            .await?;
        Ok(list
            .into_iter()
            .find_map(|c| c.metadata.get("originalContent").and_then(|v| v.as_str()).map(String::from)))
    }
}

fn query_words(query: &str) -> Vec<String> {
    query.to_lowercase().split_whitespace().filter(|w| !w.is_empty()).map(String::from).collect()
}

/// Counts how many `words` appear as substrings of `content` (lowercased),
/// counting each word at most once.
fn match_count(words: &[String], content: &str) -> usize {
    let lower = content.to_lowercase();
    words.iter().filter(|w| lower.contains(w.as_str())).count()
}

/// The lexical re-ranker: `hit.score += matchCount * boost`, re-sorted
/// descending (spec §4.9). Returns `hits` unchanged if `query` has no
/// words.
pub fn rerank(query: &str, mut hits: Vec<Hit>, boost: f64) -> Vec<Hit> {
    let words = query_words(query);
    if words.is_empty() {
        return hits;
    }
    for hit in &mut hits {
        let count = match_count(&words, &hit.chunk.content);
        hit.score += count as f64 * boost;
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

/// The hybrid blend: `hit.score = hit.score * (1 - keywordWeight) +
/// wordScore * keywordWeight`, re-sorted descending (spec §4.9).
pub fn hybrid_blend(query: &str, mut hits: Vec<Hit>, keyword_weight: f64) -> Vec<Hit> {
    let words = query_words(query);
    for hit in &mut hits {
        let word_score = if words.is_empty() {
            0.0
        } else {
            match_count(&words, &hit.chunk.content) as f64 / words.len() as f64
        };
        hit.score = hit.score * (1.0 - keyword_weight) + word_score * keyword_weight;
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

/// Aggregate statistics over a result list (spec §4.9). The empty list
/// yields all-zero numeric fields and an empty histogram.
pub fn search_stats(hits: &[Hit]) -> SearchStats {
    if hits.is_empty() {
        return SearchStats {
            total_results: 0,
            average_score: 0.0,
            min_score: 0.0,
            max_score: 0.0,
            source_types: BTreeMap::new(),
        };
    }

    let total_results = hits.len();
    let sum: f64 = hits.iter().map(|h| h.score).sum();
    let average_score = sum / total_results as f64;
    let min_score = hits.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
    let max_score = hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);

    let mut source_types: BTreeMap<String, usize> = BTreeMap::new();
    for hit in hits {
        let key = hit
            .chunk
            .metadata
            .get("sourceType")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        *source_types.entry(key).or_insert(0) += 1;
    }

    SearchStats { total_results, average_score, min_score, max_score, source_types }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::DisabledEmbedder;
    use crate::models::Chunk as ChunkModel;
    use crate::store::StorageAdapter;
    use crate::store_memory::MemoryAdapter;

    fn hit(content: &str, score: f64) -> Hit {
        Hit { chunk: ChunkModel::new(content), score }
    }

    #[tokio::test]
    async fn reconstruct_full_content_fetches_chunk_zero_not_newest_chunk() {
        let store: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new(0));
        store.initialize().await.unwrap();

        let mut first = ChunkModel::new("intro text");
        first.source_id = Some("S1".to_string());
        first.chunk_index = Some(0);
        first.metadata.insert("sourceId".to_string(), "S1".into());
        first.metadata.insert("chunkIndex".to_string(), MetadataValue::Number(0.0));
        first.metadata.insert("originalContent".to_string(), "full original document".into());

        let mut second = ChunkModel::new("tail text");
        second.source_id = Some("S1".to_string());
        second.chunk_index = Some(1);
        second.metadata.insert("sourceId".to_string(), "S1".into());
        second.metadata.insert("chunkIndex".to_string(), MetadataValue::Number(1.0));

        store.insert_batch(vec![first.clone(), second.clone()]).await.unwrap();

        let retriever = Retriever::new(store, Arc::new(DisabledEmbedder));
        let tail_hit = Hit { chunk: second, score: 1.0 };
        let reconstructed = retriever.reconstruct_full_content(&tail_hit).await.unwrap();
        assert_eq!(reconstructed.as_deref(), Some("full original document"));
    }

    #[test]
    fn rerank_returns_unchanged_for_empty_query() {
        let hits = vec![hit("a", 0.5)];
        let result = rerank("", hits.clone(), 0.1);
        assert_eq!(result, hits);
    }

    #[test]
    fn rerank_is_monotonic_in_match_count() {
        let hits = vec![hit("no keywords here", 0.5), hit("test document words", 0.5)];
        let result = rerank("test document", hits, 0.1);
        assert!(result[0].chunk.content.contains("test document words"));
    }

    #[test]
    fn scenario_s6_reranker() {
        let hits = vec![
            hit("This is a test document", 0.5),
            hit("Another document without keywords", 0.8),
            hit("Test document with multiple test words", 0.3),
        ];
        let result = rerank("test document", hits, 0.2);
        let scores: Vec<f64> = result.iter().map(|h| (h.score * 10.0).round() / 10.0).collect();
        assert_eq!(scores, vec![1.0, 0.9, 0.7]);
        assert_eq!(result[0].chunk.content, "Another document without keywords");
        assert_eq!(result[1].chunk.content, "This is a test document");
        assert_eq!(result[2].chunk.content, "Test document with multiple test words");
    }

    #[test]
    fn scenario_s5_hybrid() {
        let hits = vec![hit("javascript code example", 0.8), hit("python script", 0.2)];
        let result = hybrid_blend("javascript code", hits, 0.4);
        assert!((result[0].score - 0.88).abs() < 1e-9);
        assert!((result[1].score - 0.12).abs() < 1e-9);
        assert_eq!(result[0].chunk.content, "javascript code example");
    }

    #[test]
    fn hybrid_score_is_a_convex_combination() {
        let semantic_hit = hit("javascript code", 0.8);
        let hits = vec![semantic_hit.clone()];
        for weight in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let blended = hybrid_blend("javascript code example extra", hits.clone(), weight);
            let word_score = 2.0 / 4.0;
            let lo = semantic_hit.score.min(word_score);
            let hi = semantic_hit.score.max(word_score);
            assert!(blended[0].score >= lo - 1e-9 && blended[0].score <= hi + 1e-9);
        }
    }

    #[test]
    fn stats_on_empty_list_are_all_zero() {
        let stats = search_stats(&[]);
        assert_eq!(stats.total_results, 0);
        assert_eq!(stats.average_score, 0.0);
        assert!(stats.source_types.is_empty());
    }

    #[test]
    fn stats_histogram_buckets_missing_source_type_as_unknown() {
        let mut a = hit("a", 0.9);
        a.chunk.metadata.insert("sourceType".to_string(), "gist".into());
        let b = hit("b", 0.1);
        let stats = search_stats(&[a, b]);
        assert_eq!(stats.total_results, 2);
        assert_eq!(stats.source_types.get("gist"), Some(&1));
        assert_eq!(stats.source_types.get("unknown"), Some(&1));
        assert!((stats.average_score - 0.5).abs() < 1e-9);
    }
}
