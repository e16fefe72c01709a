//! Collection-style document storage seam.
//!
//! Services talk to the database through [`DocumentStore`]: named collections of
//! JSON documents with insert/find/update/count. [`MemoryDocumentStore`] is the
//! in-process engine used by tests and local runs.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod filter;
pub mod memory;

pub use filter::{compare_values, Condition, Filter};
pub use memory::MemoryDocumentStore;

pub type Document = serde_json::Map<String, Value>;

/// Field holding the store-assigned document id.
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<(String, SortDirection)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, assigning `_id` when absent, and returns the id.
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Uuid>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Matching documents, sorted then skipped then limited.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Merges `set` into the first matching document.
    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<UpdateResult>;

    async fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}

pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!("expected object, got {other}"))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Reads `_id` as a uuid, if present and well formed.
pub fn document_id(doc: &Document) -> Option<Uuid> {
    doc.get(ID_FIELD).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}
