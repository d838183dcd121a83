//! Record indexing: derives every index entry a record contributes under a
//! collection schema, ready to be stored next to the document.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cipher::TermCipher;
use crate::error::CompileError;
use crate::mapping::{IndexTerm, Mapping};
use crate::schema::CollectionSchema;
use crate::types::Value;

/// One index term derived from a record, addressed by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub index_name: String,
    pub index_id: String,
    pub term: IndexTerm,
}

/// Derives the index terms of whole records under a schema.
#[derive(Debug, Clone)]
pub struct RecordIndexer {
    schema: Arc<CollectionSchema>,
    cipher: TermCipher,
}

impl RecordIndexer {
    #[must_use]
    pub fn new(schema: Arc<CollectionSchema>, cipher: TermCipher) -> Self {
        Self { schema, cipher }
    }

    #[must_use]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Names of every index whose scope includes `field`.
    #[must_use]
    pub fn mappings_for_field(&self, field: &str) -> Vec<&str> {
        let string_fields = self.schema.string_fields();
        self.schema
            .mappings()
            .filter(|(_, mapping, _)| mapping.fields(string_fields).iter().any(|f| f == field))
            .map(|(name, _, _)| name)
            .collect()
    }

    /// Compiles every index term of `record`.
    ///
    /// Null or missing fields contribute nothing. A match index whose fields
    /// all tokenize to nothing produces no entry.
    ///
    /// # Errors
    ///
    /// [`CompileError::TypeMismatch`] when a field's runtime value does not
    /// fit its declared type, plus domain and cipher errors.
    pub fn index_record(&self, record: &Value) -> Result<Vec<IndexEntry>, CompileError> {
        let string_fields = self.schema.string_fields();
        let mut entries = Vec::new();

        for (name, mapping, meta) in self.schema.mappings() {
            let keys = meta.keys();
            let term = match mapping {
                Mapping::Exact { field, .. } | Mapping::Range { field, .. } => {
                    match record.get_path(field) {
                        None | Some(Value::Null) => continue,
                        Some(value) => IndexTerm::Scalar {
                            term: mapping.scalar_term(name, &self.cipher, &keys, value)?,
                        },
                    }
                }
                Mapping::Match { .. }
                | Mapping::DynamicMatch { .. }
                | Mapping::ScopedDynamicMatch { .. } => {
                    let texts = string_values(record, mapping.fields(string_fields))?;
                    match mapping.token_terms(&self.cipher, &keys, texts) {
                        Some(IndexTerm::Tokens { tokens, .. }) if tokens.is_empty() => continue,
                        Some(term) => term,
                        None => continue,
                    }
                }
            };
            entries.push(IndexEntry {
                index_name: name.to_string(),
                index_id: meta.index_id.clone(),
                term,
            });
        }

        trace!(
            collection = %self.schema.name(),
            entries = entries.len(),
            "record indexed"
        );
        Ok(entries)
    }
}

/// `(field, text)` for every present string field among `fields`.
fn string_values<'a>(
    record: &'a Value,
    fields: &'a [String],
) -> Result<Vec<(&'a str, &'a str)>, CompileError> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        match record.get_path(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => out.push((field.as_str(), text.as_str())),
            Some(_) => {
                return Err(CompileError::TypeMismatch {
                    field: field.clone(),
                    expected: "string".to_string(),
                })
            }
        }
    }
    Ok(out)
}
