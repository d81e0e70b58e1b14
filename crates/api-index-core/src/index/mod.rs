//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the capability the indexing pipeline and
//! search depend on: named collections of embedded records with metadata,
//! supporting get-or-create, upsert, metadata-filtered similarity query,
//! and delete-by-filter. Implementations must be `Send + Sync`; callers share
//! one instance across the whole process and rely on the implementation to
//! synchronize concurrent access per collection.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_or_create_collection`](VectorIndex::get_or_create_collection) | Create a collection on first use |
//! | [`has_collection`](VectorIndex::has_collection) | Existence check |
//! | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by id |
//! | [`query`](VectorIndex::query) | Filtered nearest-neighbor search |
//! | [`get`](VectorIndex::get) | Filtered record listing |
//! | [`delete_where`](VectorIndex::delete_where) | Remove every record matching a filter |
//! | [`list_collections`](VectorIndex::list_collections) | Collection names, metrics, and sizes |

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::DistanceMetric;
use crate::filter::MetadataFilter;
use crate::models::{Metadata, SearchHit};

/// Errors raised by a vector index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("embedding dimension mismatch: collection has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// One stored entry: id, payload text, metadata, and embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Summary of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: DistanceMetric,
    /// Unknown until the first record is written.
    pub dims: Option<usize>,
    pub count: usize,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if missing. An existing collection keeps the
    /// metric it was created with.
    async fn get_or_create_collection(&self, name: &str, metric: DistanceMetric) -> IndexResult<()>;

    async fn has_collection(&self, name: &str) -> IndexResult<bool>;

    /// Insert or overwrite records by id. All records in one call must
    /// share the collection's dimensionality.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> IndexResult<()>;

    /// Return at most `limit` records matching `filter`, closest first.
    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<SearchHit>>;

    /// Return every record matching `filter`, ordered by id.
    async fn get(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<VectorRecord>>;

    /// Delete every record matching `filter`; returns how many were removed.
    async fn delete_where(&self, collection: &str, filter: &MetadataFilter) -> IndexResult<usize>;

    async fn list_collections(&self) -> IndexResult<Vec<CollectionInfo>>;
}

/// Check that every record in a batch has the expected dimensionality.
///
/// `expected` is the collection's known dimensionality, if any; otherwise
/// the first record sets it. Returns the batch's dimensionality.
pub fn check_dims(expected: Option<usize>, records: &[VectorRecord]) -> IndexResult<Option<usize>> {
    let mut dims = expected;
    for r in records {
        match dims {
            Some(d) if d != r.embedding.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: r.embedding.len(),
                })
            }
            Some(_) => {}
            None => dims = Some(r.embedding.len()),
        }
    }
    Ok(dims)
}

/// Pre-filter, score, and rank candidate records against a query vector.
///
/// Sorted by ascending distance, ties broken by id, truncated to `limit`.
pub fn rank_records<'a, I>(
    records: I,
    query: &[f32],
    metric: DistanceMetric,
    limit: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    let mut hits: Vec<SearchHit> = records
        .into_iter()
        .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
        .map(|r| SearchHit {
            id: r.id.clone(),
            document: r.document.clone(),
            metadata: r.metadata.clone(),
            distance: metric.distance(query, &r.embedding),
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}
