//! Query predicates and options, written against index names.
//!
//! ```
//! use termvault_core::query::{index, Condition};
//!
//! let adults = Condition::all([
//!     index("age").gte(18_i64),
//!     index("name").matching("ada"),
//! ]);
//! assert_eq!(adults.leaves().count(), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::mapping::Operator;
use crate::types::Value;

/// A comparison against one index.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Inclusive on both ends.
    Between(Value, Value),
    Match(String),
    /// Match restricted to one field of a field-scoped dynamic index.
    ScopedMatch {
        field: String,
        text: String,
    },
}

impl Predicate {
    #[must_use]
    pub fn operator(&self) -> Operator {
        match self {
            Predicate::Eq(_) => Operator::Eq,
            Predicate::Lt(_) => Operator::Lt,
            Predicate::Lte(_) => Operator::Lte,
            Predicate::Gt(_) => Operator::Gt,
            Predicate::Gte(_) => Operator::Gte,
            Predicate::Between(..) => Operator::Between,
            Predicate::Match(_) | Predicate::ScopedMatch { .. } => Operator::Match,
        }
    }
}

/// A query: index conditions joined conjunctively.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Index { index: String, predicate: Predicate },
    All(Vec<Condition>),
}

impl Condition {
    /// Conjunction of `conditions`.
    #[must_use]
    pub fn all<I>(conditions: I) -> Self
    where
        I: IntoIterator<Item = Condition>,
    {
        Condition::All(conditions.into_iter().collect())
    }

    /// Every index condition, with nested `All`s flattened, in order.
    pub fn leaves(&self) -> Box<dyn Iterator<Item = (&str, &Predicate)> + '_> {
        match self {
            Condition::Index { index, predicate } => {
                Box::new(std::iter::once((index.as_str(), predicate)))
            }
            Condition::All(children) => Box::new(children.iter().flat_map(Condition::leaves)),
        }
    }
}

/// Starts a condition on the named index.
#[must_use]
pub fn index(name: impl Into<String>) -> IndexRef {
    IndexRef { name: name.into() }
}

/// Condition builder returned by [`index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRef {
    name: String,
}

impl IndexRef {
    fn with(self, predicate: Predicate) -> Condition {
        Condition::Index {
            index: self.name,
            predicate,
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.with(Predicate::Eq(value.into()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.with(Predicate::Lt(value.into()))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Condition {
        self.with(Predicate::Lte(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.with(Predicate::Gt(value.into()))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Condition {
        self.with(Predicate::Gte(value.into()))
    }

    #[must_use]
    pub fn between(self, min: impl Into<Value>, max: impl Into<Value>) -> Condition {
        self.with(Predicate::Between(min.into(), max.into()))
    }

    #[must_use]
    pub fn matching(self, text: impl Into<String>) -> Condition {
        self.with(Predicate::Match(text.into()))
    }

    #[must_use]
    pub fn matching_field(self, field: impl Into<String>, text: impl Into<String>) -> Condition {
        self.with(Predicate::ScopedMatch {
            field: field.into(),
            text: text.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Sort direction. Serialized in upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub by_index: String,
    #[serde(default)]
    pub direction: Direction,
}

/// Aggregate functions. Count is the only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub of_index: String,
    pub aggregate: Aggregate,
}

/// Pagination, ordering and aggregation for one query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Defaults to the compiler's default limit when absent or zero.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub order: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aggregation: Vec<Aggregation>,
    /// Return aggregates only.
    #[serde(default)]
    pub skip_results: bool,
}

impl QueryOptions {
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn order_by(mut self, index: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            by_index: index.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn count(mut self, index: impl Into<String>) -> Self {
        self.aggregation.push(Aggregation {
            of_index: index.into(),
            aggregate: Aggregate::Count,
        });
        self
    }

    #[must_use]
    pub fn skip_results(mut self) -> Self {
        self.skip_results = true;
        self
    }
}
