//! In-memory document store.

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{Document, DocumentStore, Fields};
use crate::error::StoreError;

/// A document store held entirely in memory.
///
/// Collections and documents enumerate in insertion order, like a real
/// store enumerates in its own stable order. Reading a collection that was
/// never written returns nothing rather than an error, as Firestore does.
/// Used by tests and for exercising discovery without network access.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// collection path -> (document id -> fields)
    collections: IndexMap<String, IndexMap<String, Fields>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an (initially empty) collection.
    pub fn with_collection(mut self, path: impl Into<String>) -> Self {
        self.collections.entry(path.into()).or_default();
        self
    }

    /// Insert a document, creating its collection if needed.
    pub fn with_document(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
    ) -> Self {
        self.collections
            .entry(collection.into())
            .or_default()
            .insert(id.into(), fields);
        self
    }

    /// Documents of a collection; an unknown collection has none.
    fn documents(&self, collection: &str) -> impl Iterator<Item = (&String, &Fields)> {
        self.collections.get(collection).into_iter().flatten()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self, parent: Option<&str>) -> Result<Vec<String>, StoreError> {
        let ids = self
            .collections
            .keys()
            .filter_map(|path| match parent {
                None => (!path.contains('/')).then(|| path.clone()),
                Some(parent) => path
                    .strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .filter(|id| !id.contains('/'))
                    .map(str::to_string),
            })
            .collect();
        Ok(ids)
    }

    async fn list_document_paths(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .documents(collection)
            .map(|(id, _)| format!("{collection}/{id}"))
            .collect())
    }

    async fn first_document(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .documents(collection)
            .next()
            .map(|(id, fields)| Document {
                path: format!("{collection}/{id}"),
                fields: fields.clone(),
            }))
    }
}
