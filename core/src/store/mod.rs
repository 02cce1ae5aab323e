//! The document store the rest of the crate talks to.
//!
//! [`DocumentStore`] is the seam: [`elastic::ElasticStore`] speaks the
//! Elasticsearch REST API, [`memory::MemoryStore`] keeps everything in process
//! for tests and local runs.

use async_trait::async_trait;

use crate::descriptor::{FieldMapping, IndexSettings};
use crate::error::{StoreError, WriteError};
use crate::query::SearchQuery;
use crate::Place;

pub mod elastic;
pub mod memory;

/// One serialized document headed for a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDocument {
    pub id: String,
    pub body: Vec<u8>,
}

pub type ItemResult = Result<(), WriteError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub places: Vec<Place>,
    pub total: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    async fn delete_index(&self, index: &str) -> Result<(), StoreError>;

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), StoreError>;

    async fn put_mapping(&self, index: &str, mapping: &FieldMapping) -> Result<(), StoreError>;

    /// Upserts `docs` keyed by id.
    ///
    /// On `Ok` the vector holds exactly one result per input document, in input
    /// order. `Err` means the request as a whole failed and no item was acknowledged.
    async fn bulk_write(&self, index: &str, docs: &[BulkDocument]) -> Result<Vec<ItemResult>, StoreError>;

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchHits, StoreError>;
}
