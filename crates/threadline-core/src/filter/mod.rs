//! Composable predicates over record properties.
//!
//! A [`Predicate`] is evaluated two ways that share one algebra:
//! - [`compile`] turns it into a SQL constraint for store reads
//! - [`Predicate::matches`] evaluates it against an in-memory
//!   [`Properties`] map, used to decide whether a live change is relevant
//!   to an open view
//!
//! The two disagree on exactly one input, on purpose: an empty
//! [`Predicate::Standard`] (no property or no value) is dropped by the
//! compiler but matches everything in memory. Callers that want "no
//! filter" pass no predicate at all.

pub mod compile;
pub(crate) mod value;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Properties;
use crate::sort::CaseSensitivity;
use value::Scalar;

pub use compile::{Compiled, compile};

/// Comparison performed by a standard predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    Equals,
    NotEquals,
    Contains,
    LessThan,
    GreaterThan,
}

/// Match flags of a standard predicate. The default is case-sensitive
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MatchFlags {
    #[serde(default)]
    pub comparison: Comparison,
    #[serde(default)]
    pub case: CaseSensitivity,
}

impl MatchFlags {
    #[must_use]
    pub const fn new(comparison: Comparison) -> Self {
        Self {
            comparison,
            case: CaseSensitivity::Sensitive,
        }
    }

    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case = CaseSensitivity::Insensitive;
        self
    }
}

/// A match expression over record properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Standard {
        property: String,
        value: Value,
        #[serde(default)]
        flags: MatchFlags,
    },
    Intersection(Vec<Predicate>),
    Union(Vec<Predicate>),
}

impl Predicate {
    /// Case-sensitive equality on `property`.
    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_flags(property, value, MatchFlags::default())
    }

    pub fn with_flags(
        property: impl Into<String>,
        value: impl Into<Value>,
        flags: MatchFlags,
    ) -> Self {
        Self::Standard {
            property: property.into(),
            value: value.into(),
            flags,
        }
    }

    /// Substring test on `property`.
    pub fn contains(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_flags(
            property,
            Value::String(value.into()),
            MatchFlags::new(Comparison::Contains),
        )
    }

    #[must_use]
    pub const fn and(children: Vec<Self>) -> Self {
        Self::Intersection(children)
    }

    #[must_use]
    pub const fn or(children: Vec<Self>) -> Self {
        Self::Union(children)
    }

    /// A standard predicate with no property or a `null` value.
    #[must_use]
    pub fn is_empty_standard(&self) -> bool {
        matches!(self, Self::Standard { property, value, .. }
            if property.is_empty() || value.is_null())
    }

    /// Whether the predicate holds at least one concrete comparison.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Standard { .. } => !self.is_empty_standard(),
            Self::Intersection(children) | Self::Union(children) => {
                children.iter().any(Self::is_valid)
            }
        }
    }

    /// Evaluate against an in-memory property map.
    ///
    /// Empty standard predicates match everything; empty composites match
    /// nothing. A property missing from `properties` never satisfies a
    /// concrete comparison.
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::Standard { .. } if self.is_empty_standard() => true,
            Self::Standard {
                property,
                value,
                flags,
            } => properties
                .get(property)
                .is_some_and(|actual| compare_leaf(actual, value, *flags)),
            Self::Intersection(children) => {
                !children.is_empty() && children.iter().all(|c| c.matches(properties))
            }
            Self::Union(children) => children.iter().any(|c| c.matches(properties)),
        }
    }
}

fn compare_leaf(actual: &Value, expected: &Value, flags: MatchFlags) -> bool {
    let (Some(actual), Some(expected)) = (Scalar::from_json(actual), Scalar::from_json(expected))
    else {
        return false;
    };

    // SQL comparisons against NULL are never true.
    let Some(affinity) = actual.stored_affinity() else {
        return false;
    };

    let coerced = expected.clone().with_affinity(affinity);
    let ord = value::compare(&actual, &coerced, flags.case);
    match flags.comparison {
        Comparison::Equals => ord == Ordering::Equal,
        Comparison::NotEquals => ord != Ordering::Equal,
        Comparison::LessThan => ord == Ordering::Less,
        Comparison::GreaterThan => ord == Ordering::Greater,
        Comparison::Contains => {
            // Pattern operators read the column as text and apply no affinity.
            let (Some(haystack), Scalar::Text(needle)) = (actual.to_text(), &expected) else {
                return false;
            };
            match flags.case {
                CaseSensitivity::Sensitive => haystack.contains(needle.as_ref()),
                CaseSensitivity::Insensitive => haystack
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase()),
            }
        }
    }
}
