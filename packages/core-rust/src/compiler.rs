//! Query predicate compiler.
//!
//! Turns a [`Condition`] tree plus [`QueryOptions`] into index constraints
//! carrying encrypted terms. Range bounds are computed on the encoded `u64`
//! term domain and are inclusive on both ends; a match predicate becomes one
//! token constraint per token, all of which must hold.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cipher::{BlindIndex, IndexKeys, OreCiphertext, TermCipher};
use crate::codec::{OrePlaintext, OreRange};
use crate::error::CompileError;
use crate::mapping::{IndexTerm, Mapping, MappingKind};
use crate::query::{Aggregate, Condition, Direction, Predicate, QueryOptions};
use crate::record_type::EncodedTerm;
use crate::schema::{CollectionSchema, MappingMeta};
use crate::types::Value;

/// Result limit used when a query does not set one.
pub const DEFAULT_QUERY_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// Compiled output
// ---------------------------------------------------------------------------

/// What a constraint requires of an index term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConstraintCondition {
    Exact { term: OreCiphertext },
    /// Inclusive bounds.
    Range {
        lower: OreCiphertext,
        upper: OreCiphertext,
    },
    Token { token: BlindIndex },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub index_id: String,
    pub index_name: String,
    pub condition: ConstraintCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledOrdering {
    pub index_id: String,
    pub index_name: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledAggregate {
    pub index_id: String,
    pub index_name: String,
    pub aggregate: Aggregate,
}

/// A query ready for the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    /// All must hold.
    pub constraints: Vec<Constraint>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<u32>,
    pub ordering: Vec<CompiledOrdering>,
    pub aggregates: Vec<CompiledAggregate>,
    pub skip_results: bool,
    /// Set when some match predicate produced no tokens: nothing can match.
    pub unsatisfiable: bool,
}

// ---------------------------------------------------------------------------
// QueryCompiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    schema: Arc<CollectionSchema>,
    cipher: TermCipher,
    default_limit: u32,
}

impl QueryCompiler {
    #[must_use]
    pub fn new(schema: Arc<CollectionSchema>, cipher: TermCipher) -> Self {
        Self {
            schema,
            cipher,
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    /// Compiles an optional condition and its options.
    /// `None` queries the whole collection.
    ///
    /// # Errors
    ///
    /// [`CompileError::UnknownIndex`] for any index name not in the schema
    /// (including ordering and aggregation targets),
    /// [`CompileError::UnsupportedOperator`] when the index kind cannot answer
    /// the predicate, [`CompileError::EmptyRange`] for ranges that can never
    /// match, and encoding or cipher errors.
    pub fn compile(
        &self,
        condition: Option<&Condition>,
        options: &QueryOptions,
    ) -> Result<CompiledQuery, CompileError> {
        let mut constraints = Vec::new();
        let mut unsatisfiable = false;

        if let Some(condition) = condition {
            for (index, predicate) in condition.leaves() {
                let (mapping, meta) = self.lookup(index)?;
                let compiled = self.compile_predicate(index, mapping, meta, predicate)?;
                let is_match = matches!(
                    predicate,
                    Predicate::Match(_) | Predicate::ScopedMatch { .. }
                );
                if is_match && compiled.is_empty() {
                    unsatisfiable = true;
                }
                constraints.extend(compiled);
            }
        }

        let ordering = options
            .order
            .iter()
            .map(|order| {
                let (_, meta) = self.lookup(&order.by_index)?;
                Ok(CompiledOrdering {
                    index_id: meta.index_id.clone(),
                    index_name: order.by_index.clone(),
                    direction: order.direction,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        let aggregates = options
            .aggregation
            .iter()
            .map(|agg| {
                let (_, meta) = self.lookup(&agg.of_index)?;
                Ok(CompiledAggregate {
                    index_id: meta.index_id.clone(),
                    index_name: agg.of_index.clone(),
                    aggregate: agg.aggregate,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        debug!(
            collection = %self.schema.name(),
            constraints = constraints.len(),
            unsatisfiable,
            "query compiled"
        );

        Ok(CompiledQuery {
            constraints,
            limit: options
                .limit
                .filter(|&limit| limit > 0)
                .unwrap_or(self.default_limit),
            offset: options.offset,
            ordering,
            aggregates,
            skip_results: options.skip_results,
            unsatisfiable,
        })
    }

    fn lookup(&self, index: &str) -> Result<(&Mapping, &MappingMeta), CompileError> {
        self.schema
            .mapping(index)
            .ok_or_else(|| CompileError::UnknownIndex {
                index: index.to_string(),
            })
    }

    fn compile_predicate(
        &self,
        index: &str,
        mapping: &Mapping,
        meta: &MappingMeta,
        predicate: &Predicate,
    ) -> Result<Vec<Constraint>, CompileError> {
        let kind = mapping.kind();
        let operator = predicate.operator();
        let scoped_mismatch = match predicate {
            Predicate::Match(_) => kind == MappingKind::ScopedDynamicMatch,
            Predicate::ScopedMatch { .. } => kind != MappingKind::ScopedDynamicMatch,
            _ => false,
        };
        if !kind.supports(operator) || scoped_mismatch {
            return Err(CompileError::UnsupportedOperator {
                index: index.to_string(),
                kind: kind.as_str(),
                operator: operator.as_str(),
            });
        }

        let keys = meta.keys();
        let constraint = |condition: ConstraintCondition| Constraint {
            index_id: meta.index_id.clone(),
            index_name: index.to_string(),
            condition,
        };

        let conditions = match predicate {
            Predicate::Eq(value) if kind == MappingKind::Exact => {
                vec![ConstraintCondition::Exact {
                    term: mapping.scalar_term(index, &self.cipher, &keys, value)?,
                }]
            }
            Predicate::Eq(value) => {
                let term = self.ordered(index, mapping, value)?;
                vec![self.range(OreRange::eq(term), &keys)?]
            }
            Predicate::Lt(value) => {
                let term = self.ordered(index, mapping, value)?;
                vec![self.range(non_empty(index, OreRange::lt(term))?, &keys)?]
            }
            Predicate::Lte(value) => {
                let term = self.ordered(index, mapping, value)?;
                vec![self.range(OreRange::lte(term), &keys)?]
            }
            Predicate::Gt(value) => {
                let term = self.ordered(index, mapping, value)?;
                vec![self.range(non_empty(index, OreRange::gt(term))?, &keys)?]
            }
            Predicate::Gte(value) => {
                let term = self.ordered(index, mapping, value)?;
                vec![self.range(OreRange::gte(term), &keys)?]
            }
            Predicate::Between(min, max) => {
                let min = self.ordered(index, mapping, min)?;
                let max = self.ordered(index, mapping, max)?;
                vec![self.range(non_empty(index, OreRange::between(min, max))?, &keys)?]
            }
            Predicate::Match(text) => self.tokens(mapping, &keys, "", text),
            Predicate::ScopedMatch { field, text } => {
                if !self.schema.string_fields().contains(field) {
                    return Err(CompileError::UnknownField {
                        field: field.clone(),
                    });
                }
                self.tokens(mapping, &keys, field, text)
            }
        };

        Ok(conditions.into_iter().map(constraint).collect())
    }

    /// Encodes a range operand into the term domain.
    fn ordered(&self, index: &str, mapping: &Mapping, value: &Value) -> Result<OrePlaintext, CompileError> {
        let (field, field_type) = mapping.scalar_field(index)?;
        match field_type.encode(field, value)? {
            EncodedTerm::Ordered(term) => Ok(term),
            EncodedTerm::Text(_) => Err(CompileError::TypeMismatch {
                field: field.to_string(),
                expected: field_type.to_string(),
            }),
        }
    }

    fn range(&self, range: OreRange, keys: &IndexKeys) -> Result<ConstraintCondition, CompileError> {
        Ok(ConstraintCondition::Range {
            lower: self.cipher.encrypt_term(range.min, keys)?,
            upper: self.cipher.encrypt_term(range.max, keys)?,
        })
    }

    fn tokens(&self, mapping: &Mapping, keys: &IndexKeys, field: &str, text: &str) -> Vec<ConstraintCondition> {
        match mapping.token_terms(&self.cipher, keys, [(field, text)]) {
            Some(IndexTerm::Tokens { tokens, .. }) => tokens
                .into_iter()
                .map(|token| ConstraintCondition::Token { token })
                .collect(),
            Some(IndexTerm::Scalar { .. }) | None => Vec::new(),
        }
    }
}

fn non_empty(index: &str, range: Option<OreRange>) -> Result<OreRange, CompileError> {
    range.ok_or_else(|| CompileError::EmptyRange {
        index: index.to_string(),
    })
}
