//! Collection driver.
//!
//! [`Client`] manages collection lifecycles on a [`CollectionService`];
//! [`Collection`] turns plaintext records and queries into index entries and
//! compiled constraints before anything leaves the process. Every service
//! call is retried with backoff while the error is transient.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{Stream, StreamExt};
use termvault_core::{
    describe_schema, export_schema, CollectionInfo, CollectionSchema, CollectionSchemaDefinition,
    Condition, IndexDescription, QueryCompiler, QueryOptions, RecordIndexer, SchemaExport,
    TermCipher, Value,
};
use tracing::{debug, info_span, Instrument};

use crate::buffer::bounded_batches;
use crate::config::ClientConfig;
use crate::error::{CollectionError, ServiceError};
use crate::retry::retry_with_backoff;
use crate::transport::{
    AggregateResult, CollectionService, CollectionSummary, Document, PutRequest,
};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Entry point: creates, loads and drops collections.
pub struct Client {
    service: Arc<dyn CollectionService>,
    cipher: TermCipher,
    config: Arc<ClientConfig>,
}

impl Client {
    #[must_use]
    pub fn new(service: Arc<dyn CollectionService>, cipher: TermCipher, config: ClientConfig) -> Self {
        Self {
            service,
            cipher,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Type-checks `definition`, generates fresh key material and registers
    /// the collection with the service.
    ///
    /// # Errors
    ///
    /// [`CollectionError::Schema`] for invalid definitions, and service
    /// errors such as [`ServiceError::CollectionExists`].
    pub async fn create_collection(
        &self,
        name: &str,
        definition: CollectionSchemaDefinition,
    ) -> Result<Collection, CollectionError> {
        let schema = CollectionSchema::define(name, definition)?;
        self.register(schema).await
    }

    /// Registers a collection from an export, keeping its keys and index
    /// ids. Documents are not part of an export.
    ///
    /// # Errors
    ///
    /// As [`Client::create_collection`].
    pub async fn import_collection(&self, export: SchemaExport) -> Result<Collection, CollectionError> {
        let schema = export.into_schema()?;
        self.register(schema).await
    }

    /// Opens an existing collection, restoring its schema from the stored
    /// blob.
    ///
    /// # Errors
    ///
    /// [`ServiceError::CollectionNotFound`] (wrapped) or a schema error for
    /// an undecodable blob.
    pub async fn load_collection(&self, name: &str) -> Result<Collection, CollectionError> {
        let span = info_span!("collection.load", collection = %name);
        let stored = self
            .with_retry(|| self.service.load_collection(name))
            .instrument(span)
            .await?;
        let schema = CollectionSchema::from_blob(&stored.schema_blob)?;
        Ok(self.open(stored.info, schema))
    }

    /// Every collection registered with the service, ordered by name.
    ///
    /// # Errors
    ///
    /// Service errors.
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>, CollectionError> {
        let listed = self
            .with_retry(|| self.service.list_collections())
            .instrument(info_span!("collection.list"))
            .await?;
        Ok(listed)
    }

    /// Deletes a collection and all of its documents.
    ///
    /// # Errors
    ///
    /// Service errors, [`ServiceError::CollectionNotFound`] included.
    pub async fn drop_collection(&self, name: &str) -> Result<(), CollectionError> {
        let span = info_span!("collection.drop", collection = %name);
        self.with_retry(|| self.service.delete_collection(name))
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn register(&self, schema: CollectionSchema) -> Result<Collection, CollectionError> {
        let blob = schema.to_blob()?;
        let name = schema.name().to_string();
        let span = info_span!("collection.create", collection = %name, indexes = schema.len());
        let info = self
            .with_retry(|| self.service.create_collection(&name, blob.clone()))
            .instrument(span)
            .await?;
        Ok(self.open(info, schema))
    }

    fn open(&self, info: CollectionInfo, schema: CollectionSchema) -> Collection {
        let schema = Arc::new(schema);
        Collection {
            indexer: RecordIndexer::new(Arc::clone(&schema), self.cipher.clone()),
            compiler: QueryCompiler::new(Arc::clone(&schema), self.cipher.clone())
                .with_default_limit(self.config.default_query_limit),
            info,
            schema,
            service: Arc::clone(&self.service),
            config: Arc::clone(&self.config),
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        retry_with_backoff(&self.config.retry, ServiceError::is_transient, operation).await
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Result of [`Collection::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub aggregates: Vec<AggregateResult>,
    /// Wall time spent compiling and waiting on the service.
    pub took: Duration,
    /// Evaluation time reported by the service. Zero when the query was
    /// answered locally.
    pub service_took: Duration,
}

/// A collection opened through a [`Client`].
pub struct Collection {
    info: CollectionInfo,
    schema: Arc<CollectionSchema>,
    indexer: RecordIndexer,
    compiler: QueryCompiler,
    service: Arc<dyn CollectionService>,
    config: Arc<ClientConfig>,
}

impl Collection {
    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[must_use]
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    #[must_use]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    #[must_use]
    pub fn describe(&self, include_meta: bool) -> BTreeMap<String, IndexDescription> {
        describe_schema(&self.schema, include_meta)
    }

    /// Export document for this collection, key material included.
    #[must_use]
    pub fn export(&self) -> SchemaExport {
        export_schema(&self.schema, &self.info, &self.config.service)
    }

    /// Indexes and stores one record, returning its id. A uuid is assigned
    /// when the record has no `id`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidRecord`] for non-map records or non-string
    /// ids, compile errors from indexing, and service errors.
    pub async fn put(&self, record: Value) -> Result<String, CollectionError> {
        let request = self.prepare(record)?;
        let id = request.id.clone();
        let span = info_span!(
            "collection.put",
            collection = %self.name(),
            entries = request.entries.len()
        );
        self.with_retry(|| self.service.put(&self.info.id, request.clone()))
            .instrument(span)
            .await?;
        Ok(id)
    }

    /// Stores records from a lazy source in batches of
    /// `stream_batch_size`, holding at most one batch in memory. Returns the
    /// number of records written.
    ///
    /// A failing batch stops the stream; earlier batches stay written.
    ///
    /// # Errors
    ///
    /// As [`Collection::put`], plus [`CollectionError::Buffer`] for a zero
    /// batch size.
    pub async fn put_stream<S>(&self, records: S) -> Result<usize, CollectionError>
    where
        S: Stream<Item = Value>,
    {
        let span = info_span!(
            "collection.put_stream",
            collection = %self.name(),
            batch_size = self.config.stream_batch_size
        );
        self.put_batches(records).instrument(span).await
    }

    async fn put_batches<S>(&self, records: S) -> Result<usize, CollectionError>
    where
        S: Stream<Item = Value>,
    {
        let mut batches = std::pin::pin!(bounded_batches(records, self.config.stream_batch_size)?);
        let mut written = 0;
        while let Some(batch) = batches.next().await {
            let requests = batch
                .into_iter()
                .map(|record| self.prepare(record))
                .collect::<Result<Vec<_>, _>>()?;
            let count = requests.len();
            self.with_retry(|| self.service.put_batch(&self.info.id, requests.clone()))
                .await?;
            written += count;
            debug!(written, "batch stored");
        }
        Ok(written)
    }

    /// # Errors
    ///
    /// Service errors.
    pub async fn get(&self, id: &str) -> Result<Option<Document>, CollectionError> {
        let span = info_span!("collection.get", collection = %self.name());
        let document = self
            .with_retry(|| self.service.get(&self.info.id, id))
            .instrument(span)
            .await?;
        Ok(document)
    }

    /// Fetches the documents stored under `ids`, in request order. Ids with
    /// no document are skipped.
    ///
    /// # Errors
    ///
    /// Service errors.
    pub async fn get_all(&self, ids: &[String]) -> Result<Vec<Document>, CollectionError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let span = info_span!("collection.get_all", collection = %self.name(), ids = ids.len());
        let documents = self
            .with_retry(|| self.service.get_all(&self.info.id, ids))
            .instrument(span)
            .await?;
        Ok(documents)
    }

    /// Removes a document. Removing an absent id succeeds.
    ///
    /// # Errors
    ///
    /// Service errors.
    pub async fn delete(&self, id: &str) -> Result<(), CollectionError> {
        let span = info_span!("collection.delete", collection = %self.name());
        self.with_retry(|| self.service.delete(&self.info.id, id))
            .instrument(span)
            .await?;
        Ok(())
    }

    /// Compiles and runs a query. `None` matches every document.
    ///
    /// Queries that can never match are answered locally: no documents, and
    /// zero for every requested aggregate.
    ///
    /// # Errors
    ///
    /// [`CollectionError::Compile`] for queries the schema cannot answer,
    /// and service errors.
    pub async fn query(
        &self,
        condition: Option<&Condition>,
        options: &QueryOptions,
    ) -> Result<QueryResult, CollectionError> {
        let start = Instant::now();
        let compiled = self.compiler.compile(condition, options)?;

        if compiled.unsatisfiable {
            debug!(collection = %self.name(), "query cannot match, not sent");
            return Ok(QueryResult {
                documents: Vec::new(),
                aggregates: compiled
                    .aggregates
                    .iter()
                    .map(|aggregate| AggregateResult {
                        index_name: aggregate.index_name.clone(),
                        aggregate: aggregate.aggregate,
                        value: 0,
                    })
                    .collect(),
                took: start.elapsed(),
                service_took: Duration::ZERO,
            });
        }

        let span = info_span!(
            "collection.query",
            collection = %self.name(),
            constraints = compiled.constraints.len()
        );
        let reply = self
            .with_retry(|| self.service.query(&self.info.id, compiled.clone()))
            .instrument(span)
            .await?;

        Ok(QueryResult {
            documents: reply.documents,
            aggregates: reply.aggregates,
            took: start.elapsed(),
            service_took: Duration::from_millis(reply.took_ms),
        })
    }

    fn prepare(&self, record: Value) -> Result<PutRequest, CollectionError> {
        let Value::Map(mut fields) = record else {
            return Err(CollectionError::InvalidRecord);
        };
        let id = match fields.get("id") {
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(CollectionError::InvalidRecord),
        };
        let source = Value::Map(fields);
        let entries = self.indexer.index_record(&source)?;
        Ok(PutRequest {
            id,
            source,
            entries,
        })
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        retry_with_backoff(&self.config.retry, ServiceError::is_transient, operation).await
    }
}
