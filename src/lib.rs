//! # ragcore
//!
//! **A pluggable vector-document store, chunking pipeline, and hybrid
//! retrieval core for heterogeneous text sources.**
//!
//! `ragcore` ingests plain text, local files, code trees, hosted snippets,
//! and hosted repositories; partitions them into overlapping fragments;
//! computes and stores dense embeddings with provenance; and answers
//! similarity queries that blend dense retrieval with lexical re-ranking.
//! It can optionally reconstruct the original source text behind any
//! matched fragment.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │ Acquisition │──▶│  Indexer  │──▶│  Storage   │◀──│ Retriever │
//! │ (text/file/ │   │ chunk +   │   │  Adapter   │   │ search +  │
//! │  snippet/   │   │  embed    │   │ (memory or │   │ rerank +  │
//! │  repo)      │   │           │   │  sqlite)   │   │  hybrid)  │
//! └─────────────┘   └───────────┘   └────────────┘   └───────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. An [`acquire::Acquisition`] collaborator yields raw `(id, bytes,
//!    title?, url?)` items.
//! 2. The [`indexer`] chunks each item ([`chunk`]/[`chunk_cst`]), embeds
//!    the chunks through an [`embed::Embedder`], and persists them through
//!    a [`store::StorageAdapter`].
//! 3. The [`retriever`] embeds a query, searches the adapter, and
//!    optionally re-ranks or hybrid-blends the results before returning
//!    [`models::Hit`]s.
//!
//! ## Storage Backends
//!
//! | Backend | Module | Notes |
//! |---|---|---|
//! | `memory` | [`store_memory`] | In-process `HashMap`, exact cosine similarity |
//! | `sqlite` | [`store_sqlite`] | `sqlite-vec` virtual table k-NN search |
//!
//! Backends are resolved by name through a [`registry::Registry`] and
//! constructed via [`registry::Factory`]; custom backends can be loaded
//! from a dynamic library at runtime ([`registry::Registry::register_custom`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`models`] | Core data types: `Source`, `Chunk`, `Hit`, `MetadataValue` |
//! | [`filter`] | Compiles a metadata filter into matcher/SQL fragment form |
//! | [`store`] | The [`store::StorageAdapter`] contract all backends implement |
//! | [`store_memory`] | In-memory reference backend |
//! | [`store_sqlite`] | SQLite + `sqlite-vec` persistent backend |
//! | [`registry`] | Provider registry and adapter factory |
//! | [`chunk`] | Sizing table and length/overlap fallback chunker |
//! | [`chunk_cst`] | Tree-sitter-based boundary-aware chunker |
//! | [`embed`] | The [`embed::Embedder`] collaborator contract |
//! | [`acquire`] | Acquisition collaborators: text, file, glob, snippet, repo |
//! | [`indexer`] | Acquire → chunk → embed → persist orchestration |
//! | [`retriever`] | Semantic/hybrid search, re-ranking, content reconstruction |
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | The crate-wide `Error`/`Result` types |
//!
//! ## Configuration
//!
//! `ragcore` is configured via a TOML file; see [`config`] for all
//! available keys and [`config::load_config`] for validation rules.

pub mod acquire;
pub mod chunk;
pub mod chunk_cst;
pub mod config;
pub mod embed;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod models;
pub mod registry;
pub mod retriever;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
