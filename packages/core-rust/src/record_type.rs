//! Record type definitions: which fields a collection's records carry and how
//! each leaf value is interpreted before it becomes an index term.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::OrePlaintext;
use crate::error::{CompileError, DomainError, SchemaError};
use crate::types::Value;

/// Largest integer magnitude a 64-bit float holds exactly (`2^53 - 1`).
pub const MAX_EXACT_FLOAT_INTEGER: u64 = (1 << 53) - 1;

/// How a field's raw value is interpreted before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    String,
    Float64,
    Number,
    Bigint,
    Uint64,
    Date,
    Boolean,
}

impl TermType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TermType::String => "string",
            TermType::Float64 => "float64",
            TermType::Number => "number",
            TermType::Bigint => "bigint",
            TermType::Uint64 => "uint64",
            TermType::Date => "date",
            TermType::Boolean => "boolean",
        }
    }

    /// Whether unsigned order of the encoded term matches the value order.
    #[must_use]
    pub fn is_orderable(self) -> bool {
        matches!(
            self,
            TermType::Float64
                | TermType::Number
                | TermType::Bigint
                | TermType::Uint64
                | TermType::Date
        )
    }

    /// Interprets `value` as this type.
    ///
    /// Strings are returned as text; everything else is encoded into the
    /// `u64` term domain.
    ///
    /// # Errors
    ///
    /// [`CompileError::TypeMismatch`] when the runtime value does not fit this
    /// type, [`CompileError::Domain`] for NaN, integers outside `u64`, or
    /// integers a float-typed field cannot hold exactly.
    pub fn encode<'a>(self, field: &str, value: &'a Value) -> Result<EncodedTerm<'a>, CompileError> {
        let term = match (self, value) {
            (TermType::String, Value::String(s)) => return Ok(EncodedTerm::Text(s)),
            (TermType::Float64 | TermType::Number, Value::Float(f)) => OrePlaintext::from_f64(*f)?,
            (TermType::Float64 | TermType::Number, Value::Int(i)) => {
                OrePlaintext::from_f64(exact_float(i.unsigned_abs(), i.is_negative())?)?
            }
            (TermType::Float64 | TermType::Number, Value::UInt(u)) => {
                OrePlaintext::from_f64(exact_float(*u, false)?)?
            }
            (TermType::Bigint | TermType::Uint64, Value::Int(i)) => OrePlaintext::from_wide(i128::from(*i))?,
            (TermType::Bigint | TermType::Uint64, Value::UInt(u)) => OrePlaintext(*u),
            (TermType::Bigint | TermType::Uint64, Value::BigInt(b)) => OrePlaintext::from_wide(*b)?,
            (TermType::Date, Value::Date(ms) | Value::Int(ms)) => OrePlaintext::from_epoch_millis(*ms),
            (TermType::Boolean, Value::Bool(b)) => OrePlaintext::from_bool(*b),
            _ => {
                return Err(CompileError::TypeMismatch {
                    field: field.to_string(),
                    expected: self.as_str().to_string(),
                })
            }
        };
        Ok(EncodedTerm::Ordered(term))
    }
}

/// `magnitude` (negated when `negative`) as an `f64`, if no precision is lost.
#[allow(clippy::cast_precision_loss)]
fn exact_float(magnitude: u64, negative: bool) -> Result<f64, DomainError> {
    if magnitude > MAX_EXACT_FLOAT_INTEGER {
        return Err(DomainError::InexactFloat);
    }
    let value = magnitude as f64;
    Ok(if negative { -value } else { value })
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field value after [`TermType::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedTerm<'a> {
    Ordered(OrePlaintext),
    Text(&'a str),
}

/// A field is either a leaf with a [`TermType`] or a nested record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Term(TermType),
    Nested(RecordType),
}

/// Field name to [`FieldType`], nesting arbitrarily deep.
///
/// Field names are non-empty and contain neither `.` (the path separator)
/// nor `:` (the scoped-token separator). Parsing rejects repeated names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecordType {
    fields: BTreeMap<String, FieldType>,
}

impl RecordType {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf field, replacing any previous definition of `name`.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, term_type: TermType) -> Self {
        self.fields.insert(name.into(), FieldType::Term(term_type));
        self
    }

    /// Adds a nested record field.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, record: RecordType) -> Self {
        self.fields.insert(name.into(), FieldType::Nested(record));
        self
    }

    /// Checks every field name, nested ones included.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidFieldName`] for the first offending name.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (name, field) in &self.fields {
            check_field_name(name)?;
            if let FieldType::Nested(record) = field {
                record.validate()?;
            }
        }
        Ok(())
    }

    /// Looks up a dotted path, e.g. `address.city`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&FieldType> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = match current {
                FieldType::Nested(record) => record.fields.get(part)?,
                FieldType::Term(_) => return None,
            };
        }
        Some(current)
    }

    /// Every leaf as `(dotted path, type)`, in path order.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, TermType)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves(&self, prefix: &str, out: &mut Vec<(String, TermType)>) {
        for (name, field) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match field {
                FieldType::Term(t) => out.push((path, *t)),
                FieldType::Nested(record) => record.collect_leaves(&path, out),
            }
        }
    }

    /// Dotted paths of every `string` leaf.
    #[must_use]
    pub fn string_fields(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter(|(_, t)| *t == TermType::String)
            .map(|(path, _)| path)
            .collect()
    }
}

fn check_field_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.contains(['.', ':']) {
        return Err(SchemaError::InvalidFieldName {
            field: name.to_string(),
        });
    }
    Ok(())
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RecordTypeVisitor;

        impl<'de> Visitor<'de> for RecordTypeVisitor {
            type Value = RecordType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to term types or nested records")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = BTreeMap::new();
                while let Some((name, field)) = access.next_entry::<String, FieldType>()? {
                    check_field_name(&name).map_err(<A::Error as de::Error>::custom)?;
                    if fields.contains_key(&name) {
                        return Err(de::Error::custom(SchemaError::DuplicateField { field: name }));
                    }
                    fields.insert(name, field);
                }
                Ok(RecordType { fields })
            }
        }

        deserializer.deserialize_map(RecordTypeVisitor)
    }
}
