//! Document store abstraction.
//!
//! Discovery only needs three read operations from the source database;
//! they are captured by the `DocumentStore` trait so the Firestore REST
//! client and the in-memory store used in tests are interchangeable.

mod firestore;
mod memory;
mod value;

use async_trait::async_trait;

use crate::error::StoreError;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use value::{Document, FieldValue, Fields, fields_from_rest};

/// Read access to a hierarchical document store.
///
/// Collection paths alternate collection and document segments:
/// `users`, `users/alice/orders`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List collection ids directly under `parent` (a document path), or the
    /// top-level collections when `parent` is `None`.
    async fn list_collections(&self, parent: Option<&str>) -> Result<Vec<String>, StoreError>;

    /// List the full paths of every document in a collection.
    async fn list_document_paths(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Return the first document the store enumerates for a collection.
    async fn first_document(&self, collection: &str) -> Result<Option<Document>, StoreError>;
}
