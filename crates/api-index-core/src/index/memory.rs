//! In-memory [`VectorIndex`] implementation for tests and embedded use.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Queries are
//! brute-force: every record passing the filter is scored.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::embedding::DistanceMetric;
use crate::filter::MetadataFilter;
use crate::models::SearchHit;

use super::{
    check_dims, rank_records, CollectionInfo, IndexError, IndexResult, VectorIndex, VectorRecord,
};

struct Collection {
    metric: DistanceMetric,
    dims: Option<usize>,
    records: BTreeMap<String, VectorRecord>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> IndexResult<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| IndexError::Backend(anyhow!("in-memory index lock poisoned")))
    }

    fn write(&self) -> IndexResult<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| IndexError::Backend(anyhow!("in-memory index lock poisoned")))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn get_or_create_collection(&self, name: &str, metric: DistanceMetric) -> IndexResult<()> {
        self.write()?
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                metric,
                dims: None,
                records: BTreeMap::new(),
            });
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> IndexResult<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> IndexResult<()> {
        let mut guard = self.write()?;
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        coll.dims = check_dims(coll.dims, records)?;
        for r in records {
            coll.records.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<SearchHit>> {
        let guard = self.read()?;
        let coll = guard
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        if let Some(d) = coll.dims.filter(|d| *d != query.len()) {
            return Err(IndexError::DimensionMismatch {
                expected: d,
                actual: query.len(),
            });
        }
        Ok(rank_records(coll.records.values(), query, coll.metric, limit, filter))
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<VectorRecord>> {
        let guard = self.read()?;
        let coll = guard
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        Ok(coll
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .cloned()
            .collect())
    }

    async fn delete_where(&self, collection: &str, filter: &MetadataFilter) -> IndexResult<usize> {
        let mut guard = self.write()?;
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        let before = coll.records.len();
        coll.records.retain(|_, r| !filter.matches(&r.metadata));
        Ok(before - coll.records.len())
    }

    async fn list_collections(&self) -> IndexResult<Vec<CollectionInfo>> {
        let guard = self.read()?;
        let mut infos: Vec<CollectionInfo> = guard
            .iter()
            .map(|(name, c)| CollectionInfo {
                name: name.clone(),
                metric: c.metric,
                dims: c.dims,
                count: c.records.len(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
