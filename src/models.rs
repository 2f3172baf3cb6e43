//! Core data model: [`Source`], [`Chunk`], [`Hit`], and validation helpers.
//!
//! Mirrors the teacher's `models.rs` (plain structs, no business logic) but
//! generalizes `Document`/`Chunk`/`SearchResult` into the Source/Chunk/Hit
//! shape the storage contract (§3, §4.1) requires, with a typed metadata
//! value instead of a raw `serde_json::Value` on the hot path.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Metadata keys with reserved, store-assigned semantics (§3).
pub const RESERVED_KEYS: &[&str] = &[
    "sourceId",
    "chunkIndex",
    "totalChunks",
    "title",
    "url",
    "sourceType",
    "createdAt",
    "updatedAt",
    "originalContent",
];

/// A metadata value: a scalar, null, or a nested map of the same.
///
/// Using a closed enum (rather than `serde_json::Value`) keeps the
/// in-memory backend's equality/canonicalization logic dependency-free;
/// the SQL backend converts to/from `serde_json::Value` only at the
/// storage boundary (see `store_sqlite`).
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Canonical string form used for scalar filter comparison (§4.2).
    pub fn canonical_string(&self) -> String {
        match self {
            MetadataValue::Null => "null".to_string(),
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            MetadataValue::String(s) => s.clone(),
            MetadataValue::Map(_) => self.canonical_json(),
        }
    }

    /// Canonical JSON form, used to compare object-typed values (open
    /// question in spec §9, resolved in DESIGN.md: canonical JSON, not
    /// deep structural equality on decoded values).
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Null => serde_json::Value::Null,
            MetadataValue::Bool(b) => serde_json::Value::Bool(*b),
            MetadataValue::Number(n) => serde_json::json!(n),
            MetadataValue::String(s) => serde_json::Value::String(s.clone()),
            MetadataValue::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetadataValue::Null,
            serde_json::Value::Bool(b) => MetadataValue::Bool(*b),
            serde_json::Value::Number(n) => MetadataValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => MetadataValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                let mut map = BTreeMap::new();
                for (i, v) in items.iter().enumerate() {
                    map.insert(i.to_string(), MetadataValue::from_json(v));
                }
                MetadataValue::Map(map)
            }
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), MetadataValue::from_json(v));
                }
                MetadataValue::Map(map)
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

/// Arbitrary metadata attached to a [`Chunk`].
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Kind tag for a [`Source`]'s origin (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Gist,
    Github,
    File,
    Text,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Gist => "gist",
            SourceKind::Github => "github",
            SourceKind::File => "file",
            SourceKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gist" => Some(SourceKind::Gist),
            "github" => Some(SourceKind::Github),
            "file" => Some(SourceKind::File),
            "text" => Some(SourceKind::Text),
            _ => None,
        }
    }
}

/// One ingested origin: immutable original content plus provenance (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub source_id: String,
    pub original_content: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub source_kind: Option<SourceKind>,
    pub created_at: DateTime<Utc>,
}

/// A contiguous fragment of exactly one Source's content, with its own
/// embedding and metadata (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub content: String,
    pub source_id: Option<String>,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub chunk_index: Option<i64>,
    pub total_chunks: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// A chunk with a caller-chosen or freshly minted id and no embedding yet.
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chunk_id: generate_id(None),
            content: content.into(),
            source_id: None,
            embedding: Vec::new(),
            metadata: Metadata::new(),
            chunk_index: None,
            total_chunks: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial update to an existing Chunk (§4.3 `update`).
///
/// `chunk_id` and `source_id` are immutable from the perspective of
/// `update` — there is deliberately no field to change them here.
#[derive(Debug, Clone, Default)]
pub struct ChunkUpdate {
    pub content: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

/// A search result: a Chunk plus a similarity score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub chunk: Chunk,
    pub score: f64,
}

/// Aggregate statistics over a result list (§4.9 "Search statistics").
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStats {
    pub total_results: usize,
    pub average_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub source_types: BTreeMap<String, usize>,
}

/// Validates that `vec.len() == dim`, returning [`Error::DimensionMismatch`]
/// otherwise. §4.1.
pub fn ensure_dimension(vec: &[f32], dim: usize) -> Result<()> {
    if vec.len() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            actual: vec.len(),
        });
    }
    Ok(())
}

/// Returns the caller-supplied id, or mints a fresh UUID-shaped opaque
/// string. §4.1.
pub fn generate_id(maybe: Option<String>) -> String {
    maybe.unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_ok() {
        assert!(ensure_dimension(&[1.0, 2.0, 3.0], 3).is_ok());
    }

    #[test]
    fn dimension_mismatch() {
        let err = ensure_dimension(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn generate_id_uses_caller_value() {
        assert_eq!(generate_id(Some("abc".to_string())), "abc");
    }

    #[test]
    fn generate_id_mints_when_absent() {
        let a = generate_id(None);
        let b = generate_id(None);
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn canonical_string_number_is_integral_when_whole() {
        assert_eq!(MetadataValue::Number(3.0).canonical_string(), "3");
        assert_eq!(MetadataValue::Number(3.5).canonical_string(), "3.5");
    }

    #[test]
    fn json_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), MetadataValue::Number(1.0));
        map.insert("b".to_string(), MetadataValue::String("x".to_string()));
        let v = MetadataValue::Map(map);
        let json = v.to_json();
        let back = MetadataValue::from_json(&json);
        assert_eq!(v, back);
    }
}
