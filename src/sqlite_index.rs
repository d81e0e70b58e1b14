//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Collections are rows of the `collections` table; records live in
//! `entries`, keyed by `(collection, id)`, with metadata as JSON text and
//! the embedding as a little-endian `f32` BLOB. Similarity search is a
//! brute-force scan of one collection, scored in Rust.
//!
//! Writes go through a single async lock. A deferred SQLite transaction
//! that reads before it writes cannot be upgraded while another
//! connection holds the write lock, so concurrent writers sharing the
//! pool would fail with `SQLITE_BUSY` instead of waiting.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;

use api_index_core::embedding::{blob_to_vec, vec_to_blob, DistanceMetric};
use api_index_core::filter::MetadataFilter;
use api_index_core::index::{
    check_dims, rank_records, CollectionInfo, IndexError, IndexResult, VectorIndex, VectorRecord,
};
use api_index_core::models::{Metadata, SearchHit};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    async fn load_records(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<VectorRecord>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM entries WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = decode_record(&row)?;
            if filter.map_or(true, |f| f.matches(&record.metadata)) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn db_err(e: sqlx::Error) -> IndexError {
    IndexError::Backend(e.into())
}

fn decode_record(row: &sqlx::sqlite::SqliteRow) -> IndexResult<VectorRecord> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(db_err)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("corrupt metadata for entry '{}'", id))?;
    let blob: Vec<u8> = row.try_get("embedding").map_err(db_err)?;
    Ok(VectorRecord {
        document: row.try_get("document").map_err(db_err)?,
        metadata,
        embedding: blob_to_vec(&blob),
        id,
    })
}

/// Metric and dimensionality of a collection, or `CollectionNotFound`.
async fn collection_meta(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
) -> IndexResult<(DistanceMetric, Option<usize>)> {
    let row: Option<(String, Option<i64>)> =
        sqlx::query_as("SELECT metric, dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;

    let (metric, dims) = row.ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;
    let metric = DistanceMetric::parse(&metric)
        .ok_or_else(|| anyhow::anyhow!("unknown metric '{}' for collection '{}'", metric, name))?;
    Ok((metric, dims.map(|d| d as usize)))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn get_or_create_collection(&self, name: &str, metric: DistanceMetric) -> IndexResult<()> {
        let _guard = self.write_lock.lock().await;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO collections (name, metric, dims, created_at)
            VALUES (?, ?, NULL, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(metric.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> IndexResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> IndexResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (_, dims) = collection_meta(&mut tx, collection).await?;
        let batch_dims = check_dims(dims, records)?;
        if dims.is_none() {
            if let Some(d) = batch_dims {
                sqlx::query("UPDATE collections SET dims = ? WHERE name = ?")
                    .bind(d as i64)
                    .bind(collection)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        let now = chrono::Utc::now().timestamp();
        for record in records {
            let metadata_json =
                serde_json::to_string(&record.metadata).context("serializing metadata")?;
            sqlx::query(
                r#"
                INSERT INTO entries (collection, id, document, metadata_json, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<SearchHit>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (metric, dims) = collection_meta(&mut tx, collection).await?;
        tx.commit().await.map_err(db_err)?;

        if let Some(d) = dims {
            if d != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: query.len(),
                });
            }
        }

        let records = self.load_records(collection, filter).await?;
        Ok(rank_records(&records, query, metric, limit, None))
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<VectorRecord>> {
        if !self.has_collection(collection).await? {
            return Err(IndexError::CollectionNotFound(collection.to_string()));
        }
        self.load_records(collection, filter).await
    }

    async fn delete_where(&self, collection: &str, filter: &MetadataFilter) -> IndexResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        collection_meta(&mut tx, collection).await?;

        let rows = sqlx::query("SELECT id, metadata_json FROM entries WHERE collection = ?")
            .bind(collection)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;

        let mut deleted = 0;
        for row in rows {
            let id: String = row.try_get("id").map_err(db_err)?;
            let metadata_json: String = row.try_get("metadata_json").map_err(db_err)?;
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("corrupt metadata for entry '{}'", id))?;
            if !filter.matches(&metadata) {
                continue;
            }
            sqlx::query("DELETE FROM entries WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            deleted += 1;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(deleted)
    }

    async fn list_collections(&self) -> IndexResult<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name, c.metric, c.dims, COUNT(e.id) AS count
            FROM collections c
            LEFT JOIN entries e ON e.collection = c.name
            GROUP BY c.name, c.metric, c.dims
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut infos = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").map_err(db_err)?;
            let metric: String = row.try_get("metric").map_err(db_err)?;
            let dims: Option<i64> = row.try_get("dims").map_err(db_err)?;
            let count: i64 = row.try_get("count").map_err(db_err)?;
            infos.push(CollectionInfo {
                metric: DistanceMetric::parse(&metric).ok_or_else(|| {
                    anyhow::anyhow!("unknown metric '{}' for collection '{}'", metric, name)
                })?,
                dims: dims.map(|d| d as usize),
                count: count as usize,
                name,
            });
        }
        Ok(infos)
    }
}
