//! `TermVault` Client: drives the core compiler against a remote encrypted
//! collection service.
//!
//! Records and queries are compiled locally; only ciphertext terms, blind
//! indexes and opaque documents cross the [`CollectionService`] boundary.
//! Service calls are retried with jittered exponential backoff, and bulk
//! writes go through a bounded streaming buffer.

pub mod buffer;
pub mod collection;
pub mod config;
pub mod error;
pub mod memory;
pub mod retry;
pub mod telemetry;
pub mod transport;

pub use buffer::bounded_batches;
pub use collection::{Client, Collection, QueryResult};
pub use config::{ClientConfig, RetryConfig};
pub use error::{BufferError, CollectionError, ServiceError};
pub use memory::MemoryCollectionService;
pub use retry::retry_with_backoff;
pub use telemetry::{init_tracing, LogFormat};
pub use transport::{
    AggregateResult, CollectionService, CollectionSummary, Document, PutRequest, QueryReply,
    StoredCollection,
};
