//! Index manager: per-project endpoint indexing and search.
//!
//! [`IndexManager`] wires the parsing pipeline to a [`VectorIndex`] and an
//! [`Embedder`]. It has two deliberately different error conventions:
//!
//! - **Writes** ([`store_embeddings`](IndexManager::store_embeddings),
//!   [`delete_embeddings`](IndexManager::delete_embeddings)) are best-effort.
//!   They never fail; they return an [`IndexOutcome`] / [`DeleteOutcome`]
//!   describing what happened and log every problem with its project and
//!   file ids. Indexing is a derived side effect of an upload and can always
//!   be rebuilt.
//! - **Reads** ([`search_endpoints`](IndexManager::search_endpoints)) fail
//!   loudly with a [`SearchError`]. A missing collection is an error, never
//!   an empty result.
//!
//! # Indexing
//!
//! 1. Detect the document format; unsupported formats are skipped.
//! 2. Parse and normalize endpoints; an empty result is skipped.
//! 3. Split endpoints into batches of `batch_size` (default 50).
//! 4. Per batch: serialize, embed, create the collection if this is the
//!    first write (cosine metric), and upsert.
//!
//! Batches are committed one at a time. A failing batch stops the run and
//! leaves earlier batches in place.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::detect::{detect_format, ApiFormat};
use crate::embedding::{DistanceMetric, Embedder};
use crate::filter::MetadataFilter;
use crate::index::{CollectionInfo, IndexError, VectorIndex, VectorRecord};
use crate::models::{Endpoint, IndexedDocument, SearchHit};
use crate::normalize::normalize_all;
use crate::parse::parse_collection;

/// Endpoints per upsert call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Results returned by a search when the caller does not choose a limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Why an indexing request was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedFormat,
    NoEndpoints,
}

/// What [`IndexManager::store_embeddings`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    /// Every batch was written.
    Indexed {
        format: ApiFormat,
        endpoints: usize,
        batches: usize,
    },
    /// Nothing was written and the index was not touched.
    Skipped(SkipReason),
    /// Some batches were written before one failed.
    Partial {
        endpoints_committed: usize,
        batches_committed: usize,
        total_batches: usize,
        error: String,
    },
    /// The first batch failed; nothing was written.
    Failed { error: String },
}

impl IndexOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexOutcome::Indexed { .. })
    }
}

/// What [`IndexManager::delete_embeddings`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(usize),
    Failed { error: String },
}

/// Errors surfaced by the read path.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no index exists for project '{0}'")]
    CollectionNotFound(String),
    #[error("search limit must be at least 1")]
    InvalidLimit,
    #[error("failed to embed query: {0:#}")]
    Embedding(anyhow::Error),
    #[error(transparent)]
    Index(IndexError),
}

impl From<IndexError> for SearchError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::CollectionNotFound(name) => SearchError::CollectionNotFound(name),
            other => SearchError::Index(other),
        }
    }
}

/// Detect, parse, and normalize a document.
///
/// Returns the detected format and every endpoint that survived
/// normalization (empty for unsupported documents).
pub fn extract_endpoints(doc: &Value) -> (ApiFormat, Vec<Endpoint>) {
    let format = detect_format(doc);
    let raws = parse_collection(format, doc);
    (format, normalize_all(&raws))
}

struct BatchFailure {
    batches_committed: usize,
    endpoints_committed: usize,
    total_batches: usize,
    error: anyhow::Error,
}

/// Owns the vector index and embedder for every project's collection.
pub struct IndexManager {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl IndexManager {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size. Values below 1 are raised to 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Index every endpoint of `doc` into the `project_id` collection.
    ///
    /// Never fails; see [`IndexOutcome`].
    pub async fn store_embeddings(&self, project_id: &str, file_id: &str, doc: &Value) -> IndexOutcome {
        let (format, endpoints) = extract_endpoints(doc);

        if !format.is_supported() {
            warn!(project_id, file_id, "unsupported API collection format, skipping");
            return IndexOutcome::Skipped(SkipReason::UnsupportedFormat);
        }
        if endpoints.is_empty() {
            warn!(project_id, file_id, %format, "no endpoints found in collection, skipping");
            return IndexOutcome::Skipped(SkipReason::NoEndpoints);
        }

        info!(
            project_id,
            file_id,
            %format,
            endpoints = endpoints.len(),
            "indexing endpoints"
        );

        match self.write_batches(project_id, file_id, &endpoints).await {
            Ok(batches) => {
                info!(project_id, file_id, endpoints = endpoints.len(), batches, "stored embeddings");
                IndexOutcome::Indexed {
                    format,
                    endpoints: endpoints.len(),
                    batches,
                }
            }
            Err(failure) => {
                let message = format!("{:#}", failure.error);
                error!(
                    project_id,
                    file_id,
                    batches_committed = failure.batches_committed,
                    total_batches = failure.total_batches,
                    error = %message,
                    "error storing embeddings"
                );
                if failure.batches_committed == 0 {
                    IndexOutcome::Failed { error: message }
                } else {
                    IndexOutcome::Partial {
                        endpoints_committed: failure.endpoints_committed,
                        batches_committed: failure.batches_committed,
                        total_batches: failure.total_batches,
                        error: message,
                    }
                }
            }
        }
    }

    async fn write_batches(
        &self,
        project_id: &str,
        file_id: &str,
        endpoints: &[Endpoint],
    ) -> Result<usize, BatchFailure> {
        let total_batches = endpoints.len().div_ceil(self.batch_size);
        let mut batches_committed = 0;
        let mut endpoints_committed = 0;

        for (i, batch) in endpoints.chunks(self.batch_size).enumerate() {
            if let Err(error) = self.write_batch(project_id, file_id, batch, i == 0).await {
                return Err(BatchFailure {
                    batches_committed,
                    endpoints_committed,
                    total_batches,
                    error: error.context(format!("batch {}/{}", i + 1, total_batches)),
                });
            }
            batches_committed += 1;
            endpoints_committed += batch.len();
            debug!(project_id, file_id, batch = i + 1, size = batch.len(), "committed batch");
        }

        Ok(batches_committed)
    }

    async fn write_batch(
        &self,
        project_id: &str,
        file_id: &str,
        batch: &[Endpoint],
        first: bool,
    ) -> anyhow::Result<()> {
        let docs = batch
            .iter()
            .map(|ep| IndexedDocument::from_endpoint(file_id, ep))
            .collect::<serde_json::Result<Vec<_>>>()
            .context("serializing endpoints")?;

        let texts: Vec<String> = docs.iter().map(|d| d.document_text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .context("embedding endpoints")?;
        if vectors.len() != docs.len() {
            bail!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                docs.len()
            );
        }

        if first {
            self.index
                .get_or_create_collection(project_id, DistanceMetric::Cosine)
                .await?;
        }

        let records: Vec<VectorRecord> = docs
            .into_iter()
            .zip(vectors)
            .map(|(doc, embedding)| VectorRecord {
                id: doc.id,
                document: doc.document_text,
                metadata: doc.metadata.into_metadata(),
                embedding,
            })
            .collect();

        self.index.upsert(project_id, &records).await?;
        Ok(())
    }

    /// Remove every document that came from `file_id`.
    ///
    /// Never fails; a missing collection is logged and reported as
    /// [`DeleteOutcome::Failed`].
    pub async fn delete_embeddings(&self, project_id: &str, file_id: &str) -> DeleteOutcome {
        info!(project_id, file_id, "deleting embeddings");
        let filter = MetadataFilter::eq("file_id", file_id);
        match self.index.delete_where(project_id, &filter).await {
            Ok(deleted) => {
                info!(project_id, file_id, deleted, "deleted embeddings");
                DeleteOutcome::Deleted(deleted)
            }
            Err(e) => {
                error!(project_id, file_id, error = %e, "error deleting embeddings");
                DeleteOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Semantic search over a project's endpoints.
    ///
    /// Returns at most `limit` hits, closest first. `filter` is applied to
    /// metadata before ranking.
    pub async fn search_endpoints(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        if !self.index.has_collection(project_id).await? {
            return Err(SearchError::CollectionNotFound(project_id.to_string()));
        }

        info!(project_id, query, limit, filter = ?filter, "searching endpoints");

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(SearchError::Embedding)?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding(anyhow!("empty embedding response")))?;

        Ok(self.index.query(project_id, &query_vec, limit, filter).await?)
    }

    /// List stored endpoints of a project, optionally only those of one file.
    pub async fn list_endpoints(
        &self,
        project_id: &str,
        file_id: Option<&str>,
    ) -> Result<Vec<VectorRecord>, SearchError> {
        let filter = file_id.map(|f| MetadataFilter::eq("file_id", f));
        Ok(self.index.get(project_id, filter.as_ref()).await?)
    }

    pub async fn collections(&self) -> Result<Vec<CollectionInfo>, SearchError> {
        Ok(self.index.list_collections().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::memory::InMemoryIndex;
    use crate::index::IndexResult;
    use crate::models::{Metadata, MetadataValue};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Wraps an [`InMemoryIndex`], recording upsert sizes and optionally
    /// failing the n-th upsert (1-based).
    struct CountingIndex {
        inner: InMemoryIndex,
        upserts: Mutex<Vec<usize>>,
        fail_on: Option<usize>,
    }

    impl CountingIndex {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                inner: InMemoryIndex::new(),
                upserts: Mutex::new(Vec::new()),
                fail_on,
            }
        }

        fn upsert_sizes(&self) -> Vec<usize> {
            self.upserts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        async fn get_or_create_collection(&self, name: &str, metric: DistanceMetric) -> IndexResult<()> {
            self.inner.get_or_create_collection(name, metric).await
        }

        async fn has_collection(&self, name: &str) -> IndexResult<bool> {
            self.inner.has_collection(name).await
        }

        async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> IndexResult<()> {
            let call = {
                let mut upserts = self.upserts.lock().unwrap();
                upserts.push(records.len());
                upserts.len()
            };
            if self.fail_on == Some(call) {
                return Err(IndexError::Backend(anyhow!("disk full")));
            }
            self.inner.upsert(collection, records).await
        }

        async fn query(
            &self,
            collection: &str,
            query: &[f32],
            limit: usize,
            filter: Option<&MetadataFilter>,
        ) -> IndexResult<Vec<SearchHit>> {
            self.inner.query(collection, query, limit, filter).await
        }

        async fn get(
            &self,
            collection: &str,
            filter: Option<&MetadataFilter>,
        ) -> IndexResult<Vec<VectorRecord>> {
            self.inner.get(collection, filter).await
        }

        async fn delete_where(&self, collection: &str, filter: &MetadataFilter) -> IndexResult<usize> {
            self.inner.delete_where(collection, filter).await
        }

        async fn list_collections(&self) -> IndexResult<Vec<CollectionInfo>> {
            self.inner.list_collections().await
        }
    }

    /// Embeds every text as the same fixed vector.
    struct ConstantEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            bail!("provider unavailable")
        }
    }

    fn postman_with(n: usize) -> Value {
        let items: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "name": format!("Get item {}", i),
                    "request": {"method": "GET", "url": format!("/items/{}", i)}
                })
            })
            .collect();
        json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
            "item": items
        })
    }

    fn manager_with(index: Arc<dyn VectorIndex>) -> IndexManager {
        IndexManager::new(index, Arc::new(HashEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_unsupported_format_is_a_noop() {
        let index = Arc::new(InMemoryIndex::new());
        let manager = manager_with(index.clone());
        let outcome = manager.store_embeddings("p1", "f1", &json!({"foo": "bar"})).await;
        assert_eq!(outcome, IndexOutcome::Skipped(SkipReason::UnsupportedFormat));
        assert!(!index.has_collection("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_postman_is_a_noop() {
        let index = Arc::new(InMemoryIndex::new());
        let manager = manager_with(index.clone());
        let outcome = manager.store_embeddings("p1", "f1", &postman_with(0)).await;
        assert_eq!(outcome, IndexOutcome::Skipped(SkipReason::NoEndpoints));
        assert!(!index.has_collection("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_size_invariant() {
        for (n, expected) in [(1, vec![1]), (50, vec![50]), (51, vec![50, 1]), (120, vec![50, 50, 20])] {
            let index = Arc::new(CountingIndex::new(None));
            let manager = manager_with(index.clone());
            let outcome = manager.store_embeddings("p1", "f1", &postman_with(n)).await;
            assert_eq!(
                outcome,
                IndexOutcome::Indexed {
                    format: ApiFormat::Postman,
                    endpoints: n,
                    batches: expected.len(),
                }
            );
            assert_eq!(index.upsert_sizes(), expected);
            assert_eq!(index.get("p1", None).await.unwrap().len(), n);
        }
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let index = Arc::new(InMemoryIndex::new());
        let manager = manager_with(index.clone());
        let doc = postman_with(7);

        assert!(manager.store_embeddings("p1", "f1", &doc).await.is_indexed());
        let first = index.get("p1", None).await.unwrap();
        assert!(manager.store_embeddings("p1", "f1", &doc).await.is_indexed());
        let second = index.get("p1", None).await.unwrap();

        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "f1_GET_/items/0");
    }

    #[tokio::test]
    async fn test_same_method_and_url_collide() {
        let doc = json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
            "item": [
                {"name": "First", "request": {"method": "GET", "url": "/dup"}},
                {"name": "Second", "request": {"method": "GET", "url": "/dup"}}
            ]
        });
        let index = Arc::new(InMemoryIndex::new());
        let manager = manager_with(index.clone());
        manager.store_embeddings("p1", "f1", &doc).await;

        let records = index.get("p1", None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata["name"], MetadataValue::from("Second"));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_committed_batches() {
        let index = Arc::new(CountingIndex::new(Some(2)));
        let manager = manager_with(index.clone());
        let outcome = manager.store_embeddings("p1", "f1", &postman_with(120)).await;

        match outcome {
            IndexOutcome::Partial {
                endpoints_committed,
                batches_committed,
                total_batches,
                error,
            } => {
                assert_eq!(endpoints_committed, 50);
                assert_eq!(batches_committed, 1);
                assert_eq!(total_batches, 3);
                assert!(error.contains("disk full"));
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
        assert_eq!(index.upsert_sizes(), vec![50, 50]);
        assert_eq!(index.get("p1", None).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_embedding_failure_creates_nothing() {
        let index = Arc::new(InMemoryIndex::new());
        let manager = IndexManager::new(index.clone(), Arc::new(BrokenEmbedder));
        let outcome = manager.store_embeddings("p1", "f1", &postman_with(3)).await;
        assert!(matches!(outcome, IndexOutcome::Failed { ref error } if error.contains("provider unavailable")));
        assert!(!index.has_collection("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_complete_and_isolated() {
        let index = Arc::new(InMemoryIndex::new());
        let manager = manager_with(index.clone());
        manager.store_embeddings("p1", "f1", &postman_with(3)).await;
        manager.store_embeddings("p1", "f2", &postman_with(2)).await;

        assert_eq!(manager.delete_embeddings("p1", "f1").await, DeleteOutcome::Deleted(3));

        let left = manager.list_endpoints("p1", None).await.unwrap();
        assert_eq!(left.len(), 2);
        assert!(left
            .iter()
            .all(|r| r.metadata["file_id"] == MetadataValue::from("f2")));
        assert!(manager.list_endpoints("p1", Some("f1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_on_missing_collection_returns_normally() {
        let manager = manager_with(Arc::new(InMemoryIndex::new()));
        let outcome = manager.delete_embeddings("nope", "f1").await;
        assert!(matches!(outcome, DeleteOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_an_error() {
        let manager = manager_with(Arc::new(InMemoryIndex::new()));
        let err = manager
            .search_endpoints("nonexistent-project", "query", DEFAULT_SEARCH_LIMIT, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::CollectionNotFound(p) if p == "nonexistent-project"));
    }

    #[tokio::test]
    async fn test_search_rejects_zero_limit() {
        let manager = manager_with(Arc::new(InMemoryIndex::new()));
        let err = manager.search_endpoints("p1", "q", 0, None).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidLimit));
    }

    fn fixed_record(id: &str, embedding: Vec<f32>, has_auth: bool) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("file_id".into(), "f1".into());
        metadata.insert("has_auth".into(), has_auth.into());
        VectorRecord {
            id: id.to_string(),
            document: format!("document {}", id),
            metadata,
            embedding,
        }
    }

    async fn ranked_fixture() -> IndexManager {
        let index = Arc::new(InMemoryIndex::new());
        index
            .get_or_create_collection("p1", DistanceMetric::Cosine)
            .await
            .unwrap();
        index
            .upsert(
                "p1",
                &[
                    fixed_record("d3", vec![-1.0, 0.2], true),
                    fixed_record("d1", vec![1.0, 0.1], false),
                    fixed_record("d2", vec![0.5, 0.8], true),
                ],
            )
            .await
            .unwrap();
        IndexManager::new(index, Arc::new(ConstantEmbedder(vec![1.0, 0.0])))
    }

    #[tokio::test]
    async fn test_search_returns_closest_in_order() {
        let manager = ranked_fixture().await;
        let hits = manager.search_endpoints("p1", "anything", 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert!(hits[0].distance < hits[1].distance);
        assert_eq!(hits[0].document, "document d1");
    }

    #[tokio::test]
    async fn test_search_prefilters_metadata() {
        let manager = ranked_fixture().await;
        let filter = MetadataFilter::eq("has_auth", true);
        let hits = manager
            .search_endpoints("p1", "anything", 10, Some(&filter))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d3"]);
    }

    #[tokio::test]
    async fn test_search_embedding_failure_surfaces() {
        let index = Arc::new(InMemoryIndex::new());
        index
            .get_or_create_collection("p1", DistanceMetric::Cosine)
            .await
            .unwrap();
        let manager = IndexManager::new(index, Arc::new(BrokenEmbedder));
        let err = manager.search_endpoints("p1", "q", 5, None).await.unwrap_err();
        assert!(matches!(err, SearchError::Embedding(_)));
    }

    #[test]
    fn test_extract_endpoints() {
        let (format, endpoints) = extract_endpoints(&postman_with(4));
        assert_eq!(format, ApiFormat::Postman);
        assert_eq!(endpoints.len(), 4);
        let (format, endpoints) = extract_endpoints(&json!({"foo": "bar"}));
        assert_eq!(format, ApiFormat::Unsupported);
        assert!(endpoints.is_empty());
    }
}
