//! Collection schemas: record type, resolved mappings and per-index key
//! material.
//!
//! Key material is generated exactly once, when an index is first defined.
//! Loading a stored schema reuses the stored keys and ids unchanged; nothing
//! in this module ever regenerates keys for an existing index.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::cipher::IndexKeys;
use crate::error::SchemaError;
use crate::mapping::{IndexDefinition, Mapping};
use crate::record_type::RecordType;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Key material and identity of one index.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMeta {
    pub index_name: String,
    /// Hex-encoded UUID.
    pub index_id: String,
    pub prf_key: [u8; 16],
    pub prp_key: [u8; 16],
}

impl MappingMeta {
    /// Fresh random keys and a fresh id.
    #[must_use]
    pub fn generate(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            index_id: uuid::Uuid::new_v4().simple().to_string(),
            prf_key: rand::random(),
            prp_key: rand::random(),
        }
    }

    #[must_use]
    pub fn keys(&self) -> IndexKeys {
        IndexKeys {
            prf_key: self.prf_key,
            prp_key: self.prp_key,
        }
    }
}

impl fmt::Debug for MappingMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingMeta")
            .field("index_name", &self.index_name)
            .field("index_id", &self.index_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Definition documents
// ---------------------------------------------------------------------------

/// `{ "type": ..., "indexes": ... }` as written by a user.
///
/// Index declarations keep their document order and duplicates survive
/// parsing so that definition can reject them by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchemaDefinition {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(
        serialize_with = "serialize_index_list",
        deserialize_with = "deserialize_index_list"
    )]
    pub indexes: Vec<(String, IndexDefinition)>,
}

impl CollectionSchemaDefinition {
    /// Parses a JSON schema document.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Malformed`] when the document is not valid JSON or does
    /// not have the expected shape.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))
    }
}

fn serialize_index_list<S>(
    indexes: &[(String, IndexDefinition)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(indexes.len()))?;
    for (name, definition) in indexes {
        map.serialize_entry(name, definition)?;
    }
    map.end()
}

/// Reads a JSON object into an ordered list without collapsing repeated keys.
fn deserialize_index_list<'de, D>(deserializer: D) -> Result<Vec<(String, IndexDefinition)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct IndexListVisitor;

    impl<'de> Visitor<'de> for IndexListVisitor {
        type Value = Vec<(String, IndexDefinition)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of index names to index definitions")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(entry) = access.next_entry::<String, IndexDefinition>()? {
                out.push(entry);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(IndexListVisitor)
}

// ---------------------------------------------------------------------------
// CollectionSchema
// ---------------------------------------------------------------------------

/// A defined collection: immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    name: String,
    record_type: RecordType,
    mappings: BTreeMap<String, Mapping>,
    meta: BTreeMap<String, MappingMeta>,
    /// Scope of dynamic match indexes, computed once.
    string_fields: Vec<String>,
}

impl CollectionSchema {
    /// Type-checks a definition and generates key material for every index.
    ///
    /// # Errors
    ///
    /// Any [`SchemaError`] raised by [`SchemaBuilder::build`].
    pub fn define(
        name: impl Into<String>,
        definition: CollectionSchemaDefinition,
    ) -> Result<Self, SchemaError> {
        definition
            .indexes
            .into_iter()
            .fold(
                SchemaBuilder::new(name, definition.record_type),
                |builder, (index, def)| builder.index(index, def),
            )
            .build()
    }

    /// Reassembles a schema from stored definitions and key material.
    ///
    /// # Errors
    ///
    /// [`SchemaError::MissingMeta`] when an index has no stored keys, or any
    /// resolution error if the stored definitions no longer fit the type.
    pub fn from_parts(
        name: impl Into<String>,
        record_type: RecordType,
        indexes: BTreeMap<String, IndexDefinition>,
        mut meta: BTreeMap<String, MappingMeta>,
    ) -> Result<Self, SchemaError> {
        record_type.validate()?;
        let mut mappings = BTreeMap::new();
        let mut kept_meta = BTreeMap::new();
        for (index, definition) in indexes {
            let mapping = Mapping::resolve(&index, &definition, &record_type)?;
            let index_meta = meta
                .remove(&index)
                .ok_or_else(|| SchemaError::MissingMeta {
                    index: index.clone(),
                })?;
            kept_meta.insert(index.clone(), index_meta);
            mappings.insert(index, mapping);
        }
        Ok(Self::assemble(name.into(), record_type, mappings, kept_meta))
    }

    fn assemble(
        name: String,
        record_type: RecordType,
        mappings: BTreeMap<String, Mapping>,
        meta: BTreeMap<String, MappingMeta>,
    ) -> Self {
        let string_fields = record_type.string_fields();
        Self {
            name,
            record_type,
            mappings,
            meta,
            string_fields,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Every string field path of the record type.
    #[must_use]
    pub fn string_fields(&self) -> &[String] {
        &self.string_fields
    }

    #[must_use]
    pub fn mapping(&self, index: &str) -> Option<(&Mapping, &MappingMeta)> {
        Some((self.mappings.get(index)?, self.meta.get(index)?))
    }

    /// All indexes in name order.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &Mapping, &MappingMeta)> {
        self.mappings.iter().filter_map(|(name, mapping)| {
            self.meta
                .get(name)
                .map(|meta| (name.as_str(), mapping, meta))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    // -----------------------------------------------------------------------
    // Stored form
    // -----------------------------------------------------------------------

    /// Serializes to the MessagePack blob kept alongside the collection.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Malformed`] if encoding fails.
    pub fn to_blob(&self) -> Result<Vec<u8>, SchemaError> {
        let stored = StoredSchema {
            name: self.name.clone(),
            record_type: self.record_type.clone(),
            indexes: self
                .mappings()
                .map(|(name, mapping, meta)| {
                    (
                        name.to_string(),
                        StoredIndex {
                            definition: mapping.definition(),
                            meta: meta.clone(),
                        },
                    )
                })
                .collect(),
        };
        rmp_serde::to_vec_named(&stored).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// Restores a schema written by [`CollectionSchema::to_blob`].
    ///
    /// # Errors
    ///
    /// [`SchemaError::Malformed`] for undecodable blobs, or any resolution
    /// error from [`CollectionSchema::from_parts`].
    pub fn from_blob(bytes: &[u8]) -> Result<Self, SchemaError> {
        let stored: StoredSchema =
            rmp_serde::from_slice(bytes).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        let mut indexes = BTreeMap::new();
        let mut meta = BTreeMap::new();
        for (name, index) in stored.indexes {
            indexes.insert(name.clone(), index.definition);
            meta.insert(name, index.meta);
        }
        Self::from_parts(stored.name, stored.record_type, indexes, meta)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSchema {
    name: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    indexes: BTreeMap<String, StoredIndex>,
}

#[derive(Serialize, Deserialize)]
struct StoredIndex {
    definition: IndexDefinition,
    meta: MappingMeta,
}

// ---------------------------------------------------------------------------
// SchemaBuilder
// ---------------------------------------------------------------------------

/// Collects index declarations, then resolves them all at once.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    record_type: RecordType,
    indexes: Vec<(String, IndexDefinition)>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            name: name.into(),
            record_type,
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn index(mut self, name: impl Into<String>, definition: IndexDefinition) -> Self {
        self.indexes.push((name.into(), definition));
        self
    }

    /// Resolves every index and generates its key material.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidFieldName`] for record field names the paths
    /// cannot address, [`SchemaError::DuplicateIndex`] when an index name is
    /// declared twice, or the first resolution error in declaration order.
    pub fn build(self) -> Result<CollectionSchema, SchemaError> {
        self.record_type.validate()?;
        let mut mappings = BTreeMap::new();
        let mut meta = BTreeMap::new();
        for (index, definition) in self.indexes {
            if mappings.contains_key(&index) {
                return Err(SchemaError::DuplicateIndex { index });
            }
            let mapping = Mapping::resolve(&index, &definition, &self.record_type)?;
            meta.insert(index.clone(), MappingMeta::generate(index.clone()));
            mappings.insert(index, mapping);
        }
        debug!(
            collection = %self.name,
            indexes = mappings.len(),
            "collection schema defined"
        );
        Ok(CollectionSchema::assemble(
            self.name,
            self.record_type,
            mappings,
            meta,
        ))
    }
}
