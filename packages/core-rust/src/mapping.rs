//! Index mappings: how record fields become index terms.
//!
//! An [`IndexDefinition`] is what a user declares (the JSON shape stored with a
//! collection). A [`Mapping`] is the same declaration after it has been
//! checked against the record type, with the leaf type of each field resolved.
//! Mappings are a closed enum so every consumer (indexer, compiler, describe)
//! must handle every kind.

use serde::{Deserialize, Serialize};

use crate::cipher::{BlindIndex, IndexKeys, OreCiphertext, TermCipher};
use crate::error::{CompileError, SchemaError};
use crate::record_type::{EncodedTerm, FieldType, RecordType, TermType};
use crate::tokenizer::{MatchOptions, TextPipeline, TokenFilter, Tokenizer};
use crate::types::Value;

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// An index as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum IndexDefinition {
    Exact {
        field: String,
    },
    Range {
        field: String,
    },
    Match {
        fields: Vec<String>,
        #[serde(default)]
        token_filters: Vec<TokenFilter>,
        tokenizer: Tokenizer,
    },
    DynamicMatch {
        #[serde(default)]
        token_filters: Vec<TokenFilter>,
        tokenizer: Tokenizer,
    },
    #[serde(rename = "field-dynamic-match", alias = "scoped-dynamic-match")]
    ScopedDynamicMatch {
        #[serde(default)]
        token_filters: Vec<TokenFilter>,
        tokenizer: Tokenizer,
    },
}

impl IndexDefinition {
    #[must_use]
    pub fn exact(field: impl Into<String>) -> Self {
        Self::Exact {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn range(field: impl Into<String>) -> Self {
        Self::Range {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn matching<I, S>(fields: I, options: MatchOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Match {
            fields: fields.into_iter().map(Into::into).collect(),
            token_filters: options.token_filters,
            tokenizer: options.tokenizer,
        }
    }

    #[must_use]
    pub fn dynamic_match(options: MatchOptions) -> Self {
        Self::DynamicMatch {
            token_filters: options.token_filters,
            tokenizer: options.tokenizer,
        }
    }

    #[must_use]
    pub fn scoped_dynamic_match(options: MatchOptions) -> Self {
        Self::ScopedDynamicMatch {
            token_filters: options.token_filters,
            tokenizer: options.tokenizer,
        }
    }
}

// ---------------------------------------------------------------------------
// Kinds and operators
// ---------------------------------------------------------------------------

/// Discriminant of a [`Mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    Exact,
    Range,
    Match,
    DynamicMatch,
    ScopedDynamicMatch,
}

impl MappingKind {
    /// Tag used in the stored JSON form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MappingKind::Exact => "exact",
            MappingKind::Range => "range",
            MappingKind::Match => "match",
            MappingKind::DynamicMatch => "dynamic-match",
            MappingKind::ScopedDynamicMatch => "field-dynamic-match",
        }
    }

    /// Query operators this kind of index can answer.
    #[must_use]
    pub fn operators(self) -> &'static [Operator] {
        match self {
            MappingKind::Exact => &[Operator::Eq],
            MappingKind::Range => &[
                Operator::Lt,
                Operator::Lte,
                Operator::Eq,
                Operator::Gte,
                Operator::Gt,
                Operator::Between,
            ],
            MappingKind::Match | MappingKind::DynamicMatch | MappingKind::ScopedDynamicMatch => {
                &[Operator::Match]
            }
        }
    }

    #[must_use]
    pub fn supports(self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }
}

/// Query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    Match,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Between => "between",
            Operator::Match => "match",
        }
    }
}

// ---------------------------------------------------------------------------
// Index terms
// ---------------------------------------------------------------------------

/// Whether match tokens carry the field they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    /// One bag of tokens for the whole record.
    Merged,
    /// Each token is prefixed with its field path before hashing.
    PerField,
}

/// Scopes a token to a field.
///
/// Field names never contain `:` (see [`RecordType::validate`]), so the
/// first `:` always ends the field part, whatever the token holds.
#[must_use]
pub fn scoped_token(field: &str, token: &str) -> String {
    format!("{field}:{token}")
}

/// Output of compiling a value against a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IndexTerm {
    /// Exact and Range indexes.
    Scalar { term: OreCiphertext },
    /// Match-family indexes. Order follows field order, then token order.
    Tokens {
        scope: TokenScope,
        tokens: Vec<BlindIndex>,
    },
}

// ---------------------------------------------------------------------------
// Resolved mappings
// ---------------------------------------------------------------------------

/// An [`IndexDefinition`] checked against a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Exact {
        field: String,
        field_type: TermType,
    },
    Range {
        field: String,
        field_type: TermType,
    },
    Match {
        fields: Vec<String>,
        options: MatchOptions,
    },
    DynamicMatch {
        options: MatchOptions,
    },
    ScopedDynamicMatch {
        options: MatchOptions,
    },
}

fn leaf_type(
    index: &str,
    kind: MappingKind,
    record_type: &RecordType,
    field: &str,
) -> Result<TermType, SchemaError> {
    match record_type.resolve(field) {
        Some(FieldType::Term(t)) => Ok(*t),
        Some(FieldType::Nested(_)) => Err(SchemaError::IncompatibleFieldType {
            index: index.to_string(),
            kind: kind.as_str(),
            field: field.to_string(),
            found: "object".to_string(),
        }),
        None => Err(SchemaError::UnknownField {
            index: index.to_string(),
            field: field.to_string(),
        }),
    }
}

fn incompatible(index: &str, kind: MappingKind, field: &str, found: TermType) -> SchemaError {
    SchemaError::IncompatibleFieldType {
        index: index.to_string(),
        kind: kind.as_str(),
        field: field.to_string(),
        found: found.to_string(),
    }
}

impl Mapping {
    /// Checks `definition` against `record_type`.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownField`] for paths absent from the record type,
    /// [`SchemaError::IncompatibleFieldType`] when a field's type cannot back
    /// the index kind, [`SchemaError::EmptyFieldList`] for a match index
    /// without fields and [`SchemaError::InvalidTokenLength`] for bad n-gram
    /// configuration.
    pub fn resolve(
        index: &str,
        definition: &IndexDefinition,
        record_type: &RecordType,
    ) -> Result<Self, SchemaError> {
        match definition {
            IndexDefinition::Exact { field } => {
                let field_type = leaf_type(index, MappingKind::Exact, record_type, field)?;
                Ok(Mapping::Exact {
                    field: field.clone(),
                    field_type,
                })
            }
            IndexDefinition::Range { field } => {
                let field_type = leaf_type(index, MappingKind::Range, record_type, field)?;
                if !field_type.is_orderable() {
                    return Err(incompatible(index, MappingKind::Range, field, field_type));
                }
                Ok(Mapping::Range {
                    field: field.clone(),
                    field_type,
                })
            }
            IndexDefinition::Match {
                fields,
                token_filters,
                tokenizer,
            } => {
                if fields.is_empty() {
                    return Err(SchemaError::EmptyFieldList {
                        index: index.to_string(),
                    });
                }
                for field in fields {
                    let field_type = leaf_type(index, MappingKind::Match, record_type, field)?;
                    if field_type != TermType::String {
                        return Err(incompatible(index, MappingKind::Match, field, field_type));
                    }
                }
                let options = match_options(token_filters, tokenizer);
                options.validate(index)?;
                Ok(Mapping::Match {
                    fields: fields.clone(),
                    options,
                })
            }
            IndexDefinition::DynamicMatch {
                token_filters,
                tokenizer,
            } => {
                let options = match_options(token_filters, tokenizer);
                options.validate(index)?;
                Ok(Mapping::DynamicMatch { options })
            }
            IndexDefinition::ScopedDynamicMatch {
                token_filters,
                tokenizer,
            } => {
                let options = match_options(token_filters, tokenizer);
                options.validate(index)?;
                Ok(Mapping::ScopedDynamicMatch { options })
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> MappingKind {
        match self {
            Mapping::Exact { .. } => MappingKind::Exact,
            Mapping::Range { .. } => MappingKind::Range,
            Mapping::Match { .. } => MappingKind::Match,
            Mapping::DynamicMatch { .. } => MappingKind::DynamicMatch,
            Mapping::ScopedDynamicMatch { .. } => MappingKind::ScopedDynamicMatch,
        }
    }

    /// The declaration this mapping was resolved from.
    #[must_use]
    pub fn definition(&self) -> IndexDefinition {
        match self {
            Mapping::Exact { field, .. } => IndexDefinition::exact(field.clone()),
            Mapping::Range { field, .. } => IndexDefinition::range(field.clone()),
            Mapping::Match { fields, options } => {
                IndexDefinition::matching(fields.clone(), options.clone())
            }
            Mapping::DynamicMatch { options } => IndexDefinition::dynamic_match(options.clone()),
            Mapping::ScopedDynamicMatch { options } => {
                IndexDefinition::scoped_dynamic_match(options.clone())
            }
        }
    }

    /// Tokenizer configuration for match-family mappings.
    #[must_use]
    pub fn match_options(&self) -> Option<&MatchOptions> {
        match self {
            Mapping::Match { options, .. }
            | Mapping::DynamicMatch { options }
            | Mapping::ScopedDynamicMatch { options } => Some(options),
            Mapping::Exact { .. } | Mapping::Range { .. } => None,
        }
    }

    #[must_use]
    pub fn token_scope(&self) -> TokenScope {
        match self {
            Mapping::ScopedDynamicMatch { .. } => TokenScope::PerField,
            _ => TokenScope::Merged,
        }
    }

    /// Fields this mapping reads. Dynamic kinds cover `string_fields`.
    #[must_use]
    pub fn fields<'a>(&'a self, string_fields: &'a [String]) -> &'a [String] {
        match self {
            Mapping::Exact { field, .. } | Mapping::Range { field, .. } => std::slice::from_ref(field),
            Mapping::Match { fields, .. } => fields,
            Mapping::DynamicMatch { .. } | Mapping::ScopedDynamicMatch { .. } => string_fields,
        }
    }

    // -----------------------------------------------------------------------
    // Term derivation
    // -----------------------------------------------------------------------

    /// Encrypts one value for an Exact or Range mapping.
    ///
    /// Range indexes only accept orderable types, so text only reaches the
    /// string path for Exact mappings.
    ///
    /// # Errors
    ///
    /// [`CompileError::UnsupportedOperator`] on match-family mappings, plus any
    /// encoding or cipher error.
    pub fn scalar_term(
        &self,
        index: &str,
        cipher: &TermCipher,
        keys: &IndexKeys,
        value: &Value,
    ) -> Result<OreCiphertext, CompileError> {
        let (field, field_type) = self.scalar_field(index)?;
        match field_type.encode(field, value)? {
            EncodedTerm::Ordered(term) => cipher.encrypt_term(term, keys),
            EncodedTerm::Text(text) => cipher.encrypt_string(text, keys),
        }
    }

    /// The field and leaf type of an Exact or Range mapping.
    ///
    /// # Errors
    ///
    /// [`CompileError::UnsupportedOperator`] on match-family mappings.
    pub fn scalar_field(&self, index: &str) -> Result<(&str, TermType), CompileError> {
        match self {
            Mapping::Exact { field, field_type } | Mapping::Range { field, field_type } => {
                Ok((field, *field_type))
            }
            _ => Err(CompileError::UnsupportedOperator {
                index: index.to_string(),
                kind: self.kind().as_str(),
                operator: Operator::Eq.as_str(),
            }),
        }
    }

    /// Tokenizes `(field, text)` pairs and blind-indexes every token.
    /// Returns `None` for scalar mappings.
    #[must_use]
    pub fn token_terms<'a, I>(
        &self,
        cipher: &TermCipher,
        keys: &IndexKeys,
        texts: I,
    ) -> Option<IndexTerm>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let pipeline = TextPipeline::new(self.match_options()?);
        let scope = self.token_scope();
        let tokens = texts
            .into_iter()
            .flat_map(|(field, text)| {
                pipeline.process(text).into_iter().map(move |token| match scope {
                    TokenScope::Merged => token,
                    TokenScope::PerField => scoped_token(field, &token),
                })
            })
            .map(|token| cipher.blind_token(&token, keys))
            .collect();
        Some(IndexTerm::Tokens { scope, tokens })
    }
}

fn match_options(token_filters: &[TokenFilter], tokenizer: &Tokenizer) -> MatchOptions {
    MatchOptions {
        token_filters: token_filters.to_vec(),
        tokenizer: tokenizer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::FakeOreCipher;

    fn record_type() -> RecordType {
        RecordType::new()
            .field("title", TermType::String)
            .field("year", TermType::Number)
            .field("published", TermType::Boolean)
            .nested("meta", RecordType::new().field("isbn", TermType::String))
    }

    fn trigram() -> MatchOptions {
        MatchOptions {
            token_filters: vec![TokenFilter::Downcase],
            tokenizer: Tokenizer::Ngram { token_length: 3 },
        }
    }

    fn keys() -> IndexKeys {
        IndexKeys {
            prf_key: [3; 16],
            prp_key: [4; 16],
        }
    }

    // ---- resolution ----

    #[test]
    fn resolves_each_kind() {
        let rt = record_type();
        assert_eq!(
            Mapping::resolve("by_year", &IndexDefinition::range("year"), &rt).unwrap(),
            Mapping::Range {
                field: "year".into(),
                field_type: TermType::Number
            }
        );
        assert_eq!(
            Mapping::resolve("by_isbn", &IndexDefinition::exact("meta.isbn"), &rt)
                .unwrap()
                .kind(),
            MappingKind::Exact
        );
        assert_eq!(
            Mapping::resolve("title", &IndexDefinition::matching(["title"], trigram()), &rt)
                .unwrap()
                .kind(),
            MappingKind::Match
        );
        assert_eq!(
            Mapping::resolve("all", &IndexDefinition::scoped_dynamic_match(trigram()), &rt)
                .unwrap()
                .token_scope(),
            TokenScope::PerField
        );
    }

    #[test]
    fn unknown_field_is_schema_error() {
        let err =
            Mapping::resolve("x", &IndexDefinition::exact("author"), &record_type()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownField {
                index: "x".into(),
                field: "author".into()
            }
        );
    }

    #[test]
    fn range_on_unorderable_type_is_schema_error() {
        for field in ["title", "published"] {
            let err = Mapping::resolve("r", &IndexDefinition::range(field), &record_type())
                .unwrap_err();
            assert!(matches!(
                err,
                SchemaError::IncompatibleFieldType { kind: "range", .. }
            ));
        }
    }

    #[test]
    fn match_requires_string_fields() {
        let rt = record_type();
        let err = Mapping::resolve("m", &IndexDefinition::matching(["year"], trigram()), &rt)
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::IncompatibleFieldType { kind: "match", .. }
        ));
        let err = Mapping::resolve(
            "m",
            &IndexDefinition::matching(Vec::<String>::new(), trigram()),
            &rt,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::EmptyFieldList { index: "m".into() });
    }

    #[test]
    fn nested_record_cannot_be_indexed_directly() {
        let err =
            Mapping::resolve("m", &IndexDefinition::exact("meta"), &record_type()).unwrap_err();
        assert!(matches!(err, SchemaError::IncompatibleFieldType { .. }));
    }

    #[test]
    fn definition_round_trips_through_mapping() {
        let rt = record_type();
        for def in [
            IndexDefinition::exact("title"),
            IndexDefinition::range("year"),
            IndexDefinition::matching(["title", "meta.isbn"], trigram()),
            IndexDefinition::dynamic_match(trigram()),
            IndexDefinition::scoped_dynamic_match(trigram()),
        ] {
            assert_eq!(Mapping::resolve("i", &def, &rt).unwrap().definition(), def);
        }
    }

    // ---- operators ----

    #[test]
    fn operators_by_kind() {
        assert_eq!(MappingKind::Exact.operators(), &[Operator::Eq]);
        assert!(MappingKind::Range.supports(Operator::Between));
        assert!(!MappingKind::Range.supports(Operator::Match));
        assert!(MappingKind::DynamicMatch.supports(Operator::Match));
        assert!(!MappingKind::Match.supports(Operator::Eq));
    }

    // ---- serde ----

    #[test]
    fn definitions_use_kind_tag() {
        let json = r#"{"kind":"match","fields":["title"],"tokenFilters":[{"kind":"downcase"}],"tokenizer":{"kind":"ngram","tokenLength":3}}"#;
        let def: IndexDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def, IndexDefinition::matching(["title"], trigram()));
        assert_eq!(serde_json::to_string(&def).unwrap(), json);

        let scoped: IndexDefinition = serde_json::from_str(
            r#"{"kind":"scoped-dynamic-match","tokenizer":{"kind":"standard"}}"#,
        )
        .unwrap();
        assert!(matches!(scoped, IndexDefinition::ScopedDynamicMatch { .. }));
        assert!(serde_json::to_string(&scoped)
            .unwrap()
            .contains("field-dynamic-match"));
    }

    // ---- term derivation ----

    #[test]
    fn scoped_tokens_differ_per_field() {
        let cipher = TermCipher::new(Arc::new(FakeOreCipher));
        let merged = Mapping::DynamicMatch { options: trigram() };
        let scoped = Mapping::ScopedDynamicMatch { options: trigram() };

        let tokens = |m: &Mapping, field: &'static str| match m
            .token_terms(&cipher, &keys(), [(field, "abc")])
            .unwrap()
        {
            IndexTerm::Tokens { tokens, .. } => tokens,
            IndexTerm::Scalar { .. } => unreachable!(),
        };

        assert_eq!(tokens(&merged, "a"), tokens(&merged, "b"));
        assert_ne!(tokens(&scoped, "a"), tokens(&scoped, "b"));
        assert_eq!(
            tokens(&scoped, "a"),
            vec![cipher.blind_token("a:abc", &keys())]
        );
    }

    #[test]
    fn scoped_tokens_split_unambiguously() {
        let token = scoped_token("a", "b:c");
        assert_eq!(token.split_once(':'), Some(("a", "b:c")));

        // The only field that could collide with it cannot be declared.
        let rt = RecordType::new().field("a:b", TermType::String);
        assert_eq!(
            rt.validate(),
            Err(SchemaError::InvalidFieldName { field: "a:b".into() })
        );
    }

    #[test]
    fn scalar_mappings_have_no_tokens() {
        let cipher = TermCipher::new(Arc::new(FakeOreCipher));
        let exact = Mapping::Exact {
            field: "title".into(),
            field_type: TermType::String,
        };
        assert!(exact
            .token_terms(&cipher, &keys(), [("title", "abc")])
            .is_none());
    }

    #[test]
    fn exact_string_terms_are_deterministic() {
        let cipher = TermCipher::new(Arc::new(FakeOreCipher));
        let exact = Mapping::Exact {
            field: "title".into(),
            field_type: TermType::String,
        };
        let a = exact
            .scalar_term("t", &cipher, &keys(), &Value::from("Dune"))
            .unwrap();
        let b = exact
            .scalar_term("t", &cipher, &keys(), &Value::from("Dune"))
            .unwrap();
        assert_eq!(a, b);
    }
}
