//! Error taxonomy for term compilation.
//!
//! Errors never carry plaintext term values: messages name the field or index
//! involved, never the value being encoded.

/// A term has a structural problem that no retry can fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("term is outside the unsigned 64-bit domain")]
    OutOfRange,
    #[error("NaN has no position in the term ordering")]
    NotANumber,
    #[error("integer is too large to be represented exactly as a 64-bit float")]
    InexactFloat,
}

/// The schema itself is malformed. Raised when a collection is defined or
/// loaded, never while indexing or querying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("index \"{index}\": field \"{field}\" not found in record type")]
    UnknownField { index: String, field: String },
    #[error("index \"{index}\": {kind} index cannot be defined on field \"{field}\" of type {found}")]
    IncompatibleFieldType {
        index: String,
        kind: &'static str,
        field: String,
        found: String,
    },
    #[error("duplicate field \"{field}\" in record type")]
    DuplicateField { field: String },
    #[error("field name \"{field}\" must be non-empty and contain neither '.' nor ':'")]
    InvalidFieldName { field: String },
    #[error("duplicate index name \"{index}\"")]
    DuplicateIndex { index: String },
    #[error("index \"{index}\": match index must name at least one field")]
    EmptyFieldList { index: String },
    #[error("index \"{index}\": token length {length} must be between 1 and {max}")]
    InvalidTokenLength {
        index: String,
        length: usize,
        max: usize,
    },
    #[error("index \"{index}\" has no key material")]
    MissingMeta { index: String },
    #[error("invalid schema document: {0}")]
    Malformed(String),
}

/// The external order-revealing primitive refused a term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("order-revealing cipher failed: {reason}")]
pub struct CipherError {
    pub reason: String,
}

/// Errors raised while turning values or predicates into index terms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("unknown index \"{index}\"")]
    UnknownIndex { index: String },
    #[error("field \"{field}\" is not a string field of the record type")]
    UnknownField { field: String },
    #[error("index \"{index}\" ({kind}) does not support operator {operator}")]
    UnsupportedOperator {
        index: String,
        kind: &'static str,
        operator: &'static str,
    },
    #[error("field \"{field}\" expected a value of type {expected}")]
    TypeMismatch { field: String, expected: String },
    #[error("range condition on index \"{index}\" can never match")]
    EmptyRange { index: String },
}
