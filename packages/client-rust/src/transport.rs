//! Contract with the remote collection service.
//!
//! The service stores documents next to their index entries and evaluates
//! compiled constraints over ciphertext. It never sees plaintext terms or key
//! material; the wire encoding is up to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use termvault_core::query::Aggregate;
use termvault_core::{CollectionInfo, CompiledQuery, IndexEntry, Value};

use crate::error::ServiceError;

/// A collection as registered with the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCollection {
    pub info: CollectionInfo,
    /// MessagePack schema blob, opaque to the service.
    pub schema_blob: Vec<u8>,
}

/// A registered collection as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub name: String,
    pub info: CollectionInfo,
}

/// One document write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRequest {
    pub id: String,
    pub source: Value,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub index_name: String,
    pub aggregate: Aggregate,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReply {
    pub documents: Vec<Document>,
    pub aggregates: Vec<AggregateResult>,
    /// Time the service spent evaluating the query.
    pub took_ms: u64,
}

/// Remote collection service.
///
/// Collections are addressed by name for lifecycle calls and by the
/// service-assigned id for document calls.
#[async_trait]
pub trait CollectionService: Send + Sync {
    /// Registers a collection and its schema blob.
    async fn create_collection(
        &self,
        name: &str,
        schema_blob: Vec<u8>,
    ) -> Result<CollectionInfo, ServiceError>;

    /// Fetches a collection's identity and schema blob.
    async fn load_collection(&self, name: &str) -> Result<StoredCollection, ServiceError>;

    /// Every registered collection, ordered by name.
    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, ServiceError>;

    /// Removes a collection and every document in it.
    async fn delete_collection(&self, name: &str) -> Result<(), ServiceError>;

    /// Inserts or replaces one document.
    async fn put(&self, collection_id: &str, request: PutRequest) -> Result<(), ServiceError>;

    /// Inserts or replaces many documents at once.
    async fn put_batch(
        &self,
        collection_id: &str,
        requests: Vec<PutRequest>,
    ) -> Result<(), ServiceError>;

    async fn get(&self, collection_id: &str, id: &str) -> Result<Option<Document>, ServiceError>;

    /// Fetches several documents at once, in the order of `ids`. Unknown ids
    /// are left out.
    async fn get_all(
        &self,
        collection_id: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, ServiceError>;

    /// Deleting an absent document is not an error.
    async fn delete(&self, collection_id: &str, id: &str) -> Result<(), ServiceError>;

    /// Evaluates a compiled query.
    async fn query(
        &self,
        collection_id: &str,
        query: CompiledQuery,
    ) -> Result<QueryReply, ServiceError>;
}
