//! In-process [`DocumentStore`] for tests and local runs.
//!
//! Keeps raw payloads per index, records every call and can be told to fail
//! individual operations or individual documents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{BulkDocument, DocumentStore, ItemResult, SearchHits};
use crate::descriptor::{FieldMapping, FieldType, IndexDescriptor, IndexSettings};
use crate::error::{StoreError, WriteError};
use crate::query::SearchQuery;
use crate::Place;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Ping,
    Exists,
    Delete,
    Create,
    PutMapping,
    BulkWrite,
    Search,
}

struct MemIndex {
    settings: IndexSettings,
    mapping: Option<FieldMapping>,
    docs: BTreeMap<String, Vec<u8>>,
}

type WriteFilter = Box<dyn Fn(&str) -> Option<WriteError> + Send + Sync>;

#[derive(Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, MemIndex>>,
    calls: Mutex<Vec<StoreOp>>,
    failing: Mutex<HashSet<StoreOp>>,
    write_filter: Option<WriteFilter>,
    bulk_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Rejects every document for which `f` returns an error.
    pub fn with_write_failures<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<WriteError> + Send + Sync + 'static,
    {
        self.write_filter = Some(Box::new(f));
        self
    }

    /// Makes every bulk request take at least `delay`.
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = Some(delay);
        self
    }

    /// Every subsequent `op` fails with a 500 until [`MemoryStore::clear_failures`].
    pub fn fail_op(&self, op: StoreOp) { self.failing.lock().insert(op); }

    pub fn clear_failures(&self) { self.failing.lock().clear(); }

    pub fn calls(&self) -> Vec<StoreOp> { self.calls.lock().clone() }

    pub fn call_count(&self, op: StoreOp) -> usize { self.calls.lock().iter().filter(|c| **c == op).count() }

    pub fn reset_calls(&self) { self.calls.lock().clear(); }

    pub fn doc_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, |i| i.docs.len())
    }

    pub fn has_mapping(&self, index: &str) -> bool {
        self.indices.read().get(index).is_some_and(|i| i.mapping.is_some())
    }

    pub fn settings(&self, index: &str) -> Option<IndexSettings> {
        self.indices.read().get(index).map(|i| i.settings)
    }

    pub fn get(&self, index: &str, id: &str) -> Option<Place> {
        let indices = self.indices.read();
        let body = indices.get(index)?.docs.get(id)?;
        serde_json::from_slice(body).ok()
    }

    /// Creates the index described by `descriptor` (replacing any previous one) and stores `places`.
    pub fn seed(&self, descriptor: &IndexDescriptor, places: &[Place]) {
        let mut docs = BTreeMap::new();
        for p in places {
            if let Ok(body) = serde_json::to_vec(p) {
                docs.insert(p.doc_id(), body);
            }
        }
        let index = MemIndex { settings: descriptor.settings, mapping: Some(descriptor.mapping.clone()), docs };
        self.indices.write().insert(descriptor.name.clone(), index);
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls.lock().push(op);
        if self.failing.lock().contains(&op) {
            return Err(StoreError::Status { status: 500, body: format!("injected {op:?} failure") });
        }
        Ok(())
    }
}

fn decode_all<'a>(docs: impl Iterator<Item = &'a Vec<u8>>) -> Result<Vec<Place>, StoreError> {
    docs.map(|b| serde_json::from_slice(b).map_err(|e| StoreError::Decode(e.to_string()))).collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> { self.enter(StoreOp::Ping) }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        self.enter(StoreOp::Exists)?;
        Ok(self.indices.read().contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete)?;
        match self.indices.write().remove(index) {
            Some(_) => Ok(()),
            None => Err(StoreError::IndexNotFound(index.to_string())),
        }
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), StoreError> {
        self.enter(StoreOp::Create)?;
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(StoreError::Status { status: 400, body: format!("resource_already_exists_exception: {index}") });
        }
        indices.insert(index.to_string(), MemIndex { settings: *settings, mapping: None, docs: BTreeMap::new() });
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: &FieldMapping) -> Result<(), StoreError> {
        self.enter(StoreOp::PutMapping)?;
        let mut indices = self.indices.write();
        let idx = indices.get_mut(index).ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        idx.mapping = Some(mapping.clone());
        Ok(())
    }

    async fn bulk_write(&self, index: &str, docs: &[BulkDocument]) -> Result<Vec<ItemResult>, StoreError> {
        self.enter(StoreOp::BulkWrite)?;
        if let Some(delay) = self.bulk_delay {
            tokio::time::sleep(delay).await;
        }
        let mut indices = self.indices.write();
        let idx = indices.get_mut(index).ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        let results = docs
            .iter()
            .map(|doc| {
                if let Some(err) = self.write_filter.as_ref().and_then(|f| f(&doc.id)) {
                    return Err(err);
                }
                if let Err(e) = serde_json::from_slice::<serde_json::Value>(&doc.body) {
                    return Err(WriteError::new("mapper_parsing_exception", e.to_string()));
                }
                idx.docs.insert(doc.id.clone(), doc.body.clone());
                Ok(())
            })
            .collect();
        Ok(results)
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchHits, StoreError> {
        self.enter(StoreOp::Search)?;
        let indices = self.indices.read();
        let idx = indices.get(index).ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        let total = idx.docs.len() as u64;
        match query {
            SearchQuery::MatchAll { from, size } => {
                if from + size > idx.settings.max_result_window {
                    return Err(StoreError::Status {
                        status: 400,
                        body: format!("Result window is too large, from + size must be less than or equal to: [{}]", idx.settings.max_result_window),
                    });
                }
                let places = decode_all(idx.docs.values().skip(*from as usize).take(*size as usize))?;
                Ok(SearchHits { places, total })
            }
            SearchQuery::Nearest { origin, limit, geo_field } => {
                let geo_mapped = idx.mapping.as_ref().and_then(|m| m.field_type(geo_field)) == Some(FieldType::GeoPoint);
                if !geo_mapped {
                    return Err(StoreError::Status { status: 400, body: format!("field [{geo_field}] is not a geo_point") });
                }
                let mut places = decode_all(idx.docs.values())?;
                places.sort_by(|a, b| {
                    origin.distance_m(&a.location).total_cmp(&origin.distance_m(&b.location))
                });
                places.truncate(*limit as usize);
                Ok(SearchHits { places, total })
            }
        }
    }
}
