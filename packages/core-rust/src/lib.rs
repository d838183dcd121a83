//! `TermVault` Core: order-preserving codec, term cipher adapter, tokenizer,
//! index mappings and the encrypted query compiler.
//!
//! Everything in this crate is synchronous and free of shared mutable state.
//! The order-revealing primitive is injected through [`OreCipher`]; the
//! `testing` module (behind the `test-util` feature) provides an insecure
//! stand-in for tests.

pub mod cipher;
pub mod codec;
pub mod compiler;
pub mod describe;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod mapping;
pub mod query;
pub mod record_type;
pub mod schema;
pub mod tokenizer;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cipher::{BlindHash, BlindIndex, IndexKeys, OreCiphertext, TermCipher};
pub use codec::{decode_f64, encode_f64, OrePlaintext, OreRange};
pub use compiler::{
    CompiledAggregate, CompiledOrdering, CompiledQuery, Constraint, ConstraintCondition,
    QueryCompiler, DEFAULT_QUERY_LIMIT,
};
pub use describe::{describe_schema, export_schema, CollectionInfo, IndexDescription, SchemaExport};
pub use error::{CipherError, CompileError, DomainError, SchemaError};
pub use hash::Blake3BlindIndex;
pub use indexer::{IndexEntry, RecordIndexer};
pub use mapping::{IndexDefinition, IndexTerm, Mapping, MappingKind, Operator, TokenScope};
pub use query::{index, Aggregate, Condition, Direction, Predicate, QueryOptions};
pub use record_type::{RecordType, TermType};
pub use schema::{CollectionSchema, CollectionSchemaDefinition, MappingMeta, SchemaBuilder};
pub use tokenizer::{tokenize, MatchOptions, TokenFilter, Tokenizer};
pub use traits::{BlindIndexHasher, OreCipher};
pub use types::Value;
