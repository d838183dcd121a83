//! Operator tooling: human-readable index summaries and lossless schema
//! export/import.
//!
//! Exports contain key material. They are meant for backup and restore by
//! trusted operators and must be handled like the keys themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::mapping::{IndexDefinition, Mapping};
use crate::record_type::RecordType;
use crate::schema::{CollectionSchema, MappingMeta};

/// Shown in place of field names for dynamic indexes.
pub const ALL_STRING_FIELDS: &str = "all string fields";

// ---------------------------------------------------------------------------
// Describe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescription {
    pub index_type: String,
    pub fields: Vec<String>,
    pub operators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index_id: Option<String>,
    /// Hex.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prf_key: Option<String>,
    /// Hex.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prp_key: Option<String>,
}

/// Summarizes every index of `schema`. Key material is included only when
/// `include_meta` is set.
#[must_use]
pub fn describe_schema(
    schema: &CollectionSchema,
    include_meta: bool,
) -> BTreeMap<String, IndexDescription> {
    schema
        .mappings()
        .map(|(name, mapping, meta)| {
            let kind = mapping.kind();
            let fields = match mapping {
                Mapping::DynamicMatch { .. } | Mapping::ScopedDynamicMatch { .. } => {
                    vec![ALL_STRING_FIELDS.to_string()]
                }
                _ => mapping.fields(&[]).to_vec(),
            };
            let description = IndexDescription {
                index_type: kind.as_str().to_string(),
                fields,
                operators: kind
                    .operators()
                    .iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
                index_id: include_meta.then(|| meta.index_id.clone()),
                prf_key: include_meta.then(|| hex::encode(meta.prf_key)),
                prp_key: include_meta.then(|| hex::encode(meta.prp_key)),
            };
            (name.to_string(), description)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Identity the remote service assigned to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    /// Opaque collection reference.
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedIndex {
    #[serde(flatten)]
    pub definition: IndexDefinition,
    pub prp_key: [u8; 16],
    pub prf_key: [u8; 16],
    pub index_id: String,
}

/// Lossless JSON form of a collection schema, key material included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaExport {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(rename = "ref")]
    pub reference: String,
    pub indexes: BTreeMap<String, ExportedIndex>,
    pub service: String,
}

/// Builds the export document for a stored collection.
#[must_use]
pub fn export_schema(schema: &CollectionSchema, info: &CollectionInfo, service: &str) -> SchemaExport {
    SchemaExport {
        name: schema.name().to_string(),
        id: info.id.clone(),
        record_type: schema.record_type().clone(),
        reference: info.reference.clone(),
        indexes: schema
            .mappings()
            .map(|(name, mapping, meta)| {
                (
                    name.to_string(),
                    ExportedIndex {
                        definition: mapping.definition(),
                        prp_key: meta.prp_key,
                        prf_key: meta.prf_key,
                        index_id: meta.index_id.clone(),
                    },
                )
            })
            .collect(),
        service: service.to_string(),
    }
}

impl SchemaExport {
    /// # Errors
    ///
    /// [`SchemaError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// # Errors
    ///
    /// [`SchemaError::Malformed`] for documents of the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// Rebuilds the schema with the exported keys and ids.
    ///
    /// # Errors
    ///
    /// Any resolution error if the exported indexes do not fit the exported
    /// record type.
    pub fn into_schema(self) -> Result<CollectionSchema, SchemaError> {
        let mut definitions = BTreeMap::new();
        let mut meta = BTreeMap::new();
        for (name, index) in self.indexes {
            meta.insert(
                name.clone(),
                MappingMeta {
                    index_name: name.clone(),
                    index_id: index.index_id,
                    prf_key: index.prf_key,
                    prp_key: index.prp_key,
                },
            );
            definitions.insert(name, index.definition);
        }
        CollectionSchema::from_parts(self.name, self.record_type, definitions, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_type::TermType;
    use crate::schema::SchemaBuilder;
    use crate::tokenizer::{MatchOptions, Tokenizer};

    fn schema() -> CollectionSchema {
        SchemaBuilder::new(
            "users",
            RecordType::new()
                .field("email", TermType::String)
                .field("age", TermType::Number),
        )
        .index("email", IndexDefinition::exact("email"))
        .index("age", IndexDefinition::range("age"))
        .index(
            "search",
            IndexDefinition::dynamic_match(MatchOptions {
                token_filters: vec![],
                tokenizer: Tokenizer::Standard,
            }),
        )
        .build()
        .unwrap()
    }

    // ---- describe ----

    #[test]
    fn describes_kind_fields_and_operators() {
        let described = describe_schema(&schema(), false);
        let email = &described["email"];
        assert_eq!(email.index_type, "exact");
        assert_eq!(email.fields, vec!["email"]);
        assert_eq!(email.operators, vec!["eq"]);
        assert!(email.prf_key.is_none());

        let age = &described["age"];
        assert_eq!(
            age.operators,
            vec!["lt", "lte", "eq", "gte", "gt", "between"]
        );

        let search = &described["search"];
        assert_eq!(search.index_type, "dynamic-match");
        assert_eq!(search.fields, vec![ALL_STRING_FIELDS]);
        assert_eq!(search.operators, vec!["match"]);
    }

    #[test]
    fn describe_without_meta_omits_keys_in_json() {
        let json = serde_json::to_string(&describe_schema(&schema(), false)).unwrap();
        assert!(!json.contains("prfKey"));
        assert!(!json.contains("indexId"));
    }

    #[test]
    fn describe_with_meta_shows_hex_keys() {
        let schema = schema();
        let described = describe_schema(&schema, true);
        let (_, meta) = schema.mapping("age").unwrap();
        assert_eq!(
            described["age"].prf_key.as_deref(),
            Some(hex::encode(meta.prf_key).as_str())
        );
        assert_eq!(described["age"].index_id.as_ref(), Some(&meta.index_id));
    }

    // ---- export ----

    #[test]
    fn export_has_expected_shape() {
        let info = CollectionInfo {
            id: "c-1".into(),
            reference: "ref-1".into(),
        };
        let export = export_schema(&schema(), &info, "grpc://localhost");
        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "users");
        assert_eq!(json["id"], "c-1");
        assert_eq!(json["ref"], "ref-1");
        assert_eq!(json["service"], "grpc://localhost");
        assert_eq!(json["type"]["age"], "number");

        let age = &json["indexes"]["age"];
        assert_eq!(age["kind"], "range");
        assert_eq!(age["field"], "age");
        assert_eq!(age["prfKey"].as_array().unwrap().len(), 16);
        assert!(age.get("fieldType").is_none());
    }

    #[test]
    fn export_import_is_lossless() {
        let original = schema();
        let json = export_schema(&original, &CollectionInfo::default(), "")
            .to_json()
            .unwrap();
        let restored = SchemaExport::from_json(&json)
            .unwrap()
            .into_schema()
            .unwrap();
        assert_eq!(restored, original);
    }
}
