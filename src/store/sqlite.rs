//! SQLite-backed [`Store`] implementation.
//!
//! The FTS5 table has no triggers: every statement that inserts or deletes a
//! row in `chunks` also inserts or deletes the `chunks_fts` row with the same
//! rowid, inside the same transaction.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;

use super::Store;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{ChunkRecord, IndexModel, NewChunk, StoreStats, StoredChunk};

/// SQLite variables per statement stay well below the default limit.
const ID_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Turn free text into an FTS5 match expression: every word quoted, joined
/// with `OR`. Returns `None` when the text has no word characters.
///
/// Quoting keeps FTS5 operators and punctuation in user input from being
/// interpreted as query syntax.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

async fn find_chunk_id(conn: &mut SqliteConnection, chunk: &NewChunk) -> Result<Option<i64>> {
    let id = sqlx::query_scalar(
        "SELECT id FROM chunks WHERE file_path = ? AND line_start = ? AND content_hash = ?",
    )
    .bind(&chunk.file_path)
    .bind(chunk.line_start)
    .bind(&chunk.content_hash)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

async fn insert_chunk_row(conn: &mut SqliteConnection, chunk: &NewChunk) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO chunks (file_path, line_start, line_end, content, content_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.file_path)
    .bind(chunk.line_start)
    .bind(chunk.line_end)
    .bind(&chunk.content)
    .bind(&chunk.content_hash)
    .bind(now_millis())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    sqlx::query("INSERT INTO chunks_fts (rowid, content) VALUES (?, ?)")
        .bind(id)
        .bind(&chunk.content)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

async fn write_embedding(
    conn: &mut SqliteConnection,
    chunk_id: i64,
    vector: &[f32],
    model: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO embeddings (chunk_id, model, dims, vector, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            vector = excluded.vector,
            created_at = excluded.created_at
        "#,
    )
    .bind(chunk_id)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(vec_to_blob(vector))
    .bind(now_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_chunk_row(conn: &mut SqliteConnection, id: i64) -> Result<u64> {
    sqlx::query("DELETE FROM chunks_fts WHERE rowid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM embeddings WHERE chunk_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let removed = sqlx::query("DELETE FROM chunks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(removed)
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        if let Some(id) = find_chunk_id(&mut tx, chunk).await? {
            return Ok(id);
        }
        let id = insert_chunk_row(&mut tx, chunk).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn replace_embedding(&self, chunk_id: i64, vector: &[f32], model: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_embedding(&mut conn, chunk_id, vector, model).await
    }

    async fn insert_chunk_with_embedding(
        &self,
        chunk: &NewChunk,
        vector: &[f32],
        model: &str,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = match find_chunk_id(&mut tx, chunk).await? {
            Some(id) => id,
            None => insert_chunk_row(&mut tx, chunk).await?,
        };
        write_embedding(&mut tx, id, vector, model).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn delete_chunks_for_file(&self, file_path: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM chunks_fts WHERE rowid IN (SELECT id FROM chunks WHERE file_path = ?)",
        )
        .bind(file_path)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE file_path = ?)",
        )
        .bind(file_path)
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE file_path = ?")
            .bind(file_path)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_chunks(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for &id in ids {
            removed += delete_chunk_row(&mut tx, id).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn relocate_chunk(&self, id: i64, line_start: i64, line_end: i64) -> Result<()> {
        sqlx::query("UPDATE chunks SET line_start = ?, line_end = ? WHERE id = ?")
            .bind(line_start)
            .bind(line_end)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_chunk_hashes(&self, file_path: &str) -> Result<HashSet<String>> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT content_hash FROM chunks WHERE file_path = ?")
                .bind(file_path)
                .fetch_all(&self.pool)
                .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn list_file_chunks(&self, file_path: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, line_start, line_end, content_hash
            FROM chunks
            WHERE file_path = ?
            ORDER BY line_start, id
            "#,
        )
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkRecord {
                id: row.get("id"),
                line_start: row.get("line_start"),
                line_end: row.get("line_end"),
                content_hash: row.get("content_hash"),
            })
            .collect())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let files = sqlx::query_scalar("SELECT DISTINCT file_path FROM chunks ORDER BY file_path")
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<(i64, f64)>> {
        let Some(expression) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT rowid AS chunk_id, bm25(chunks_fts) AS rank
            FROM chunks_fts
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                (row.get::<i64, _>("chunk_id"), -rank)
            })
            .collect())
    }

    async fn all_chunks_with_embeddings(&self, model: &str) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows = sqlx::query("SELECT chunk_id, vector FROM embeddings WHERE model = ?")
            .bind(model)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                (row.get::<i64, _>("chunk_id"), blob_to_vec(&blob))
            })
            .collect())
    }

    async fn get_chunks(&self, ids: &[i64]) -> Result<Vec<StoredChunk>> {
        let mut chunks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT id, file_path, line_start, line_end, content, content_hash, created_at \
                 FROM chunks WHERE id IN (",
            );
            let mut separated = qb.separated(", ");
            for id in batch {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.pool).await?;
            chunks.extend(rows.iter().map(|row| StoredChunk {
                id: row.get("id"),
                file_path: row.get("file_path"),
                line_start: row.get("line_start"),
                line_end: row.get("line_end"),
                content: row.get("content"),
                content_hash: row.get("content_hash"),
                created_at: row.get("created_at"),
            }));
        }
        Ok(chunks)
    }

    async fn index_model(&self) -> Result<Option<IndexModel>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta WHERE key IN ('model', 'dims')")
            .fetch_all(&self.pool)
            .await?;

        let mut model = None;
        let mut dims = None;
        for row in &rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "model" => model = Some(value),
                "dims" => dims = value.parse::<usize>().ok(),
                _ => {}
            }
        }

        Ok(match (model, dims) {
            (Some(model), Some(dims)) => Some(IndexModel { model, dims }),
            _ => None,
        })
    }

    async fn set_index_model(&self, model: &str, dims: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [("model", model.to_string()), ("dims", dims.to_string())] {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM chunks_fts",
            "DELETE FROM embeddings",
            "DELETE FROM chunks",
            "DELETE FROM index_meta",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let (files, chunks): (i64, i64) =
            sqlx::query_as("SELECT COUNT(DISTINCT file_path), COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            files,
            chunks,
            embeddings,
            model: self.index_model().await?,
        })
    }
}
