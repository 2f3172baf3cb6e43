//! SQL+Vector Backend (C5): a persistent [`StorageAdapter`] over SQLite
//! with a `sqlite-vec` virtual k-NN table.
//!
//! Connection setup follows the teacher's `db::connect` (WAL mode,
//! `create_if_missing`, a bounded `SqlitePoolOptions` pool) and schema
//! creation follows `migrate::run_migrations`'s `CREATE TABLE IF NOT
//! EXISTS` idempotent style. The vector table itself departs from the
//! teacher (which scans a plain BLOB column with app-level cosine
//! similarity in `search.rs`) in favor of a genuine `vec0` virtual table,
//! grounded on `wrightmikea-sqlite3-vecdb-poc`'s domain module and the
//! standard `sqlite_vec::sqlite3_vec_init` auto-extension registration
//! pattern.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::filter::CompiledFilter;
use crate::models::{ensure_dimension, Chunk, ChunkUpdate, Hit, Metadata, MetadataValue};
use crate::store::{AdapterInfo, CountOptions, ListOptions, SearchOptions, StorageAdapter};

/// Registers the `sqlite-vec` loadable extension with every connection
/// SQLite opens in this process. Must run before any pool connects;
/// idempotent via [`std::sync::Once`] semantics (`sqlite3_auto_extension`
/// itself deduplicates repeated registrations of the same entry point).
fn register_vector_extension() -> Result<()> {
    unsafe {
        let rc = libsqlite3_sys::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
        if rc != 0 {
            return Err(Error::ExtensionUnavailable(format!(
                "sqlite3_auto_extension registration for sqlite-vec failed with code {rc}"
            )));
        }
    }
    Ok(())
}

/// A persistent [`StorageAdapter`] backed by a single SQLite file
/// containing the schema in spec §4.5.
pub struct SqliteAdapter {
    path: String,
    dimension: usize,
    pool: tokio::sync::OnceCell<SqlitePool>,
    closed: AtomicBool,
}

impl SqliteAdapter {
    pub fn new(path: impl Into<String>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
            pool: tokio::sync::OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn pool(&self) -> Result<&SqlitePool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        self.pool.get().ok_or(Error::NotInitialized)
    }

    async fn connect(&self) -> Result<SqlitePool> {
        register_vector_extension()?;

        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::ExtensionUnavailable(format!(
                        "failed to create parent directory for {}: {e}",
                        self.path
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", self.path))
            .map_err(|e| Error::Backend(e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    async fn run_migrations(&self, pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                source_id TEXT PRIMARY KEY,
                original_content TEXT NOT NULL,
                title TEXT,
                url TEXT,
                source_type TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                source_id TEXT REFERENCES sources(source_id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                vec_rowid INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let vec_table_exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='vec_documents'",
        )
        .fetch_one(pool)
        .await?;
        if !vec_table_exists {
            sqlx::query(&format!(
                "CREATE VIRTUAL TABLE vec_documents USING vec0(embedding float[{}])",
                self.dimension
            ))
            .execute(pool)
            .await?;
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_source_type ON sources(source_type)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source_id ON documents(source_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_vec_rowid ON documents(vec_rowid)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_documents_updated_at
            AFTER UPDATE ON documents
            BEGIN
                UPDATE documents SET updated_at = strftime('%s','now') WHERE id = NEW.id;
            END
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn metadata_to_json(metadata: &Metadata) -> String {
    let mut obj = serde_json::Map::new();
    for (k, v) in metadata {
        obj.insert(k.clone(), v.to_json());
    }
    serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_else(|_| "{}".to_string())
}

fn metadata_from_json(raw: &str) -> Metadata {
    let value: serde_json::Value = serde_json::from_str(raw).unwrap_or(serde_json::Value::Null);
    match MetadataValue::from_json(&value) {
        MetadataValue::Map(map) => map,
        _ => Metadata::new(),
    }
}

fn row_to_chunk(
    id: String,
    source_id: Option<String>,
    content: String,
    metadata_json: String,
    created_at: i64,
    updated_at: i64,
    source_original_content: Option<String>,
    source_title: Option<String>,
    source_url: Option<String>,
    source_type: Option<String>,
) -> Chunk {
    let mut metadata = metadata_from_json(&metadata_json);
    if let Some(sid) = &source_id {
        metadata.insert("sourceId".to_string(), sid.clone().into());
    }
    let chunk_index = metadata
        .get("chunkIndex")
        .and_then(|v| if let MetadataValue::Number(n) = v { Some(*n as i64) } else { None });
    let total_chunks = metadata
        .get("totalChunks")
        .and_then(|v| if let MetadataValue::Number(n) = v { Some(*n as i64) } else { None });

    if chunk_index == Some(0) {
        if let Some(orig) = source_original_content {
            metadata.insert("originalContent".to_string(), orig.into());
        }
    }
    if let Some(title) = source_title {
        metadata.insert("title".to_string(), title.into());
    }
    if let Some(url) = source_url {
        metadata.insert("url".to_string(), url.into());
    }
    if let Some(source_type) = source_type {
        metadata.insert("sourceType".to_string(), source_type.into());
    }

    Chunk {
        chunk_id: id,
        content,
        source_id,
        embedding: Vec::new(),
        metadata,
        chunk_index,
        total_chunks,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_else(Utc::now),
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    async fn initialize(&self) -> Result<()> {
        if self.pool.get().is_some() {
            return Ok(());
        }
        let pool = self.connect().await?;
        if let Err(e) = self.run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }
        // OnceCell::set races are impossible here because initialize is
        // documented as serialized per adapter instance (spec §5).
        let _ = self.pool.set(pool);
        Ok(())
    }

    async fn insert(&self, chunk: Chunk) -> Result<String> {
        let ids = self.insert_batch(vec![chunk]).await?;
        Ok(ids.into_iter().next().unwrap())
    }

    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<String>> {
        let pool = self.pool()?;
        for chunk in &chunks {
            ensure_dimension(&chunk.embedding, self.dimension)?;
        }

        let mut tx = pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let is_first = matches!(chunk.chunk_index, None | Some(0));
            let original_content = chunk
                .metadata
                .get("originalContent")
                .and_then(|v| v.as_str())
                .map(String::from);

            if let Some(source_id) = &chunk.source_id {
                let exists: bool =
                    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sources WHERE source_id = ?")
                        .bind(source_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !exists && is_first {
                    if let Some(content) = &original_content {
                        let title = chunk.metadata.get("title").and_then(|v| v.as_str());
                        let url = chunk.metadata.get("url").and_then(|v| v.as_str());
                        let source_type = chunk.metadata.get("sourceType").and_then(|v| v.as_str());
                        sqlx::query(
                            "INSERT INTO sources (source_id, original_content, title, url, source_type, created_at) VALUES (?, ?, ?, ?, ?, strftime('%s','now'))",
                        )
                        .bind(source_id)
                        .bind(content)
                        .bind(title)
                        .bind(url)
                        .bind(source_type)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }

            let mut stored_metadata = chunk.metadata.clone();
            stored_metadata.remove("originalContent");
            stored_metadata.remove("sourceId");
            stored_metadata.remove("title");
            stored_metadata.remove("url");
            stored_metadata.remove("sourceType");
            let metadata_json = metadata_to_json(&stored_metadata);

            let existing_vec_rowid: Option<i64> =
                sqlx::query_scalar("SELECT vec_rowid FROM documents WHERE id = ?")
                    .bind(&chunk.chunk_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let blob = vec_to_blob(&chunk.embedding);
            let vec_rowid: i64 = if let Some(old_rowid) = existing_vec_rowid {
                // Upsert: reclaim the old vector row rather than leaving it
                // orphaned (spec §9 open-question resolution, see DESIGN.md).
                sqlx::query("UPDATE vec_documents SET embedding = ? WHERE rowid = ?")
                    .bind(&blob)
                    .bind(old_rowid)
                    .execute(&mut *tx)
                    .await?;
                old_rowid
            } else {
                let result = sqlx::query("INSERT INTO vec_documents (embedding) VALUES (?)")
                    .bind(&blob)
                    .execute(&mut *tx)
                    .await?;
                result.last_insert_rowid()
            };

            sqlx::query(
                r#"
                INSERT INTO documents (id, source_id, content, metadata, vec_rowid, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, strftime('%s','now'), strftime('%s','now'))
                ON CONFLICT(id) DO UPDATE SET
                    source_id = excluded.source_id,
                    content = excluded.content,
                    metadata = excluded.metadata,
                    vec_rowid = excluded.vec_rowid,
                    updated_at = strftime('%s','now')
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_id)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(vec_rowid)
            .execute(&mut *tx)
            .await?;

            ids.push(chunk.chunk_id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let pool = self.pool()?;
        let row = sqlx::query(
            r#"
            SELECT d.id, d.source_id, d.content, d.metadata, d.created_at, d.updated_at,
                   v.embedding,
                   s.original_content, s.title, s.url, s.source_type
            FROM documents d
            JOIN vec_documents v ON v.rowid = d.vec_rowid
            LEFT JOIN sources s ON d.source_id = s.source_id
            WHERE d.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut chunk = row_to_chunk(
            row.get("id"),
            row.get("source_id"),
            row.get("content"),
            row.get("metadata"),
            row.get("created_at"),
            row.get("updated_at"),
            row.get("original_content"),
            row.get("title"),
            row.get("url"),
            row.get("source_type"),
        );
        let blob: Vec<u8> = row.get("embedding");
        chunk.embedding = blob_to_vec(&blob);
        Ok(Some(chunk))
    }

    async fn update(&self, id: &str, partial: ChunkUpdate) -> Result<()> {
        let pool = self.pool()?;
        if let Some(embedding) = &partial.embedding {
            ensure_dimension(embedding, self.dimension)?;
        }

        let mut tx = pool.begin().await?;
        let vec_rowid: Option<i64> = sqlx::query_scalar("SELECT vec_rowid FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(vec_rowid) = vec_rowid else {
            return Err(Error::NotFound(id.to_string()));
        };

        if let Some(embedding) = &partial.embedding {
            let blob = vec_to_blob(embedding);
            sqlx::query("UPDATE vec_documents SET embedding = ? WHERE rowid = ?")
                .bind(blob)
                .bind(vec_rowid)
                .execute(&mut *tx)
                .await?;
        }

        let mut set_clauses: Vec<String> = Vec::new();
        if partial.content.is_some() {
            set_clauses.push("content = ?".to_string());
        }
        if let Some(mut metadata) = partial.metadata.clone() {
            metadata.remove("originalContent");
            set_clauses.push("metadata = ?".to_string());
        }

        if !set_clauses.is_empty() {
            let sql = format!(
                "UPDATE documents SET {} WHERE id = ?",
                set_clauses.join(", ")
            );
            let mut query = sqlx::query(&sql);
            if let Some(content) = &partial.content {
                query = query.bind(content);
            }
            if let Some(metadata) = &partial.metadata {
                let mut sanitized = metadata.clone();
                sanitized.remove("originalContent");
                query = query.bind(metadata_to_json(&sanitized));
            }
            query = query.bind(id);
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let pool = self.pool()?;
        let mut tx = pool.begin().await?;

        let row: Option<(i64, Option<String>)> =
            sqlx::query_as("SELECT vec_rowid, source_id FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((vec_rowid, source_id)) = row else {
            return Err(Error::NotFound(id.to_string()));
        };

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vec_documents WHERE rowid = ?")
            .bind(vec_rowid)
            .execute(&mut *tx)
            .await?;

        if let Some(source_id) = source_id {
            let remaining: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE source_id = ?")
                    .bind(&source_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if remaining == 0 {
                sqlx::query("DELETE FROM sources WHERE source_id = ?")
                    .bind(&source_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let pool = self.pool()?;
        for id in ids {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await?;
            if !exists {
                return Err(Error::NotFound(id.clone()));
            }
        }
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], options: SearchOptions) -> Result<Vec<Hit>> {
        let pool = self.pool()?;
        ensure_dimension(embedding, self.dimension)?;
        let compiled = CompiledFilter::compile(&options.filter)?;
        let (filter_sql, filter_params) = compiled.sql_fragment();

        let where_clause = if filter_sql.is_empty() {
            String::new()
        } else {
            format!("{filter_sql} AND ")
        };

        let sql = format!(
            r#"
            SELECT d.id, d.source_id, d.content, d.metadata, d.created_at, d.updated_at,
                   v.embedding, v.distance,
                   s.original_content, s.title, s.url, s.source_type
            FROM vec_documents v
            JOIN documents d ON d.vec_rowid = v.rowid
            LEFT JOIN sources s ON d.source_id = s.source_id
            WHERE {where_clause}v.rowid IN (
                SELECT rowid FROM vec_documents WHERE embedding MATCH ? ORDER BY distance LIMIT ?
            )
            ORDER BY v.distance LIMIT ?
            "#
        );

        let query_blob = vec_to_blob(embedding);
        let k = options.k as i64;
        let mut query = sqlx::query(&sql);
        for param in &filter_params {
            query = query.bind(param);
        }
        query = query.bind(query_blob).bind(k).bind(k);

        let rows = query.fetch_all(pool).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let mut chunk = row_to_chunk(
                row.get("id"),
                row.get("source_id"),
                row.get("content"),
                row.get("metadata"),
                row.get("created_at"),
                row.get("updated_at"),
                row.get("original_content"),
                row.get("title"),
                row.get("url"),
                row.get("source_type"),
            );
            let blob: Vec<u8> = row.get("embedding");
            chunk.embedding = blob_to_vec(&blob);
            let distance: f64 = row.get::<f64, _>("distance");
            hits.push(Hit { chunk, score: 1.0 - distance });
        }
        Ok(hits)
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<Chunk>> {
        let pool = self.pool()?;
        let compiled = CompiledFilter::compile(&options.filter)?;
        let (filter_sql, filter_params) = compiled.sql_fragment();
        let where_clause = if filter_sql.is_empty() {
            String::new()
        } else {
            format!("WHERE {filter_sql}")
        };

        let sql = format!(
            r#"
            SELECT d.id, d.source_id, d.content, d.metadata, d.created_at, d.updated_at,
                   s.original_content, s.title, s.url, s.source_type
            FROM documents d
            LEFT JOIN sources s ON d.source_id = s.source_id
            {where_clause}
            ORDER BY d.created_at DESC
            LIMIT ? OFFSET ?
            "#
        );

        let mut query = sqlx::query(&sql);
        for param in &filter_params {
            query = query.bind(param);
        }
        query = query.bind(options.limit as i64).bind(options.offset as i64);

        let rows = query.fetch_all(pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                row_to_chunk(
                    row.get("id"),
                    row.get("source_id"),
                    row.get("content"),
                    row.get("metadata"),
                    row.get("created_at"),
                    row.get("updated_at"),
                    row.get("original_content"),
                    row.get("title"),
                    row.get("url"),
                    row.get("source_type"),
                )
            })
            .collect())
    }

    async fn count(&self, options: CountOptions) -> Result<usize> {
        let pool = self.pool()?;
        let compiled = CompiledFilter::compile(&options.filter)?;
        let (filter_sql, filter_params) = compiled.sql_fragment();
        let where_clause = if filter_sql.is_empty() {
            String::new()
        } else {
            format!("WHERE {filter_sql}")
        };
        let sql = format!("SELECT COUNT(*) FROM documents {where_clause}");
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for param in &filter_params {
            query = query.bind(param);
        }
        let count: i64 = query.fetch_one(pool).await?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn info(&self) -> Result<AdapterInfo> {
        Ok(AdapterInfo {
            provider: "sqlite".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec![
                "search".into(),
                "list".into(),
                "count".into(),
                "persistent".into(),
            ],
        })
    }
}

/// Encode a `Vec<f32>` as little-endian bytes for `vec0` BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a `vec0` BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk as ChunkModel;
    use tempfile::tempdir;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let adapter = SqliteAdapter::new(temp_path(&dir, "test.db"), 3);
        adapter.initialize().await.unwrap();

        let mut chunk = ChunkModel::new("hello world");
        chunk.embedding = vec![1.0, 0.0, 0.0];
        let id = chunk.chunk_id.clone();
        adapter.insert(chunk).await.unwrap();

        let fetched = adapter.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_chunk_and_vector() {
        let dir = tempdir().unwrap();
        let adapter = SqliteAdapter::new(temp_path(&dir, "test.db"), 3);
        adapter.initialize().await.unwrap();

        let mut chunk = ChunkModel::new("hello");
        chunk.embedding = vec![1.0, 0.0, 0.0];
        let id = chunk.chunk_id.clone();
        adapter.insert(chunk).await.unwrap();
        adapter.delete(&id).await.unwrap();
        assert!(adapter.get(&id).await.unwrap().is_none());
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_returns_nearest_first() {
        let dir = tempdir().unwrap();
        let adapter = SqliteAdapter::new(temp_path(&dir, "test.db"), 3);
        adapter.initialize().await.unwrap();

        let mut a = ChunkModel::new("a");
        a.embedding = vec![1.0, 0.0, 0.0];
        let id_a = a.chunk_id.clone();
        let mut b = ChunkModel::new("b");
        b.embedding = vec![0.0, 1.0, 0.0];

        adapter.insert(a).await.unwrap();
        adapter.insert(b).await.unwrap();

        let hits = adapter
            .search(&[1.0, 0.0, 0.0], SearchOptions { k: 1, filter: Default::default() })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, id_a);
        adapter.close().await.unwrap();
    }

    #[test]
    fn blob_roundtrips() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_vec(&blob), v);
    }
}
