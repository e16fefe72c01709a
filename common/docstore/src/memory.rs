//! In-memory document store for tests and local runs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::filter::sort_key_cmp;
use crate::{
    document_id, Document, DocumentStore, Filter, FindOptions, SortDirection, StoreError, StoreResult,
    UpdateResult, ID_FIELD,
};

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Document>>,
    rejected: HashSet<String>,
}

/// Collections kept in insertion order behind a single lock.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<RwLock<State>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write to `collection` fail with `Unavailable`.
    pub async fn reject_writes(&self, collection: &str) {
        self.state.write().await.rejected.insert(collection.to_string());
    }

    pub async fn accept_writes(&self, collection: &str) {
        self.state.write().await.rejected.remove(collection);
    }

    /// Raw snapshot of a collection, in insertion order.
    pub async fn dump(&self, collection: &str) -> Vec<Document> {
        self.state.read().await.collections.get(collection).cloned().unwrap_or_default()
    }
}

fn check_writable(state: &State, collection: &str) -> StoreResult<()> {
    if state.rejected.contains(collection) {
        return Err(StoreError::Unavailable(format!("writes to '{collection}' rejected")));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_one(&self, collection: &str, mut doc: Document) -> StoreResult<Uuid> {
        let mut state = self.state.write().await;
        check_writable(&state, collection)?;
        let id = match doc.get(ID_FIELD) {
            None | Some(Value::Null) => Uuid::new_v4(),
            Some(_) => document_id(&doc)
                .ok_or_else(|| StoreError::InvalidDocument("_id must be a uuid string".into()))?,
        };
        let docs = state.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| document_id(d) == Some(id)) {
            return Err(StoreError::InvalidDocument(format!("duplicate _id {id}")));
        }
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        docs.push(doc);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let state = self.state.read().await;
        let mut matched: Vec<Document> = state
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        if let Some((field, direction)) = &options.sort {
            matched.sort_by(|a, b| {
                let ord = sort_key_cmp(a.get(field), b.get(field));
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let iter = matched.into_iter().skip(skip);
        Ok(match options.limit {
            Some(limit) => iter.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
            None => iter.collect(),
        })
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<UpdateResult> {
        let mut state = self.state.write().await;
        check_writable(&state, collection)?;
        let Some(doc) = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
        else {
            return Ok(UpdateResult::default());
        };
        let mut modified = false;
        for (key, value) in set {
            if key == ID_FIELD {
                continue;
            }
            if doc.get(&key) != Some(&value) {
                doc.insert(key, value);
                modified = true;
            }
        }
        Ok(UpdateResult { matched: 1, modified: u64::from(modified) })
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }
}
