//! Typed filter options and the structured payload filter they compile to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-facing filter options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    /// All tags must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tags: Vec<String>,

    /// Any of these categories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Any of these sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_readability: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<WordCountRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_filters: Vec<CustomFilter>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self == &FilterOptions::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordCountRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Equals,
    Contains,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFilter {
    pub field: String,
    pub value: serde_json::Value,
    pub operator: FilterOperator,
}

/// Conjunction of field-level conditions understood by the retrieval index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
}

impl PayloadFilter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,

    #[serde(flatten)]
    pub predicate: Predicate,
}

impl FieldCondition {
    pub fn new(key: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            key: key.into(),
            predicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Exact value match.
    Match(serde_json::Value),
    /// Value is any member of the set.
    MatchAny(Vec<serde_json::Value>),
    /// Substring match on a text field.
    Text(String),
    /// Numeric bounds, inclusive.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<f64>,
    },
    /// Timestamp bounds, inclusive.
    DatetimeRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<DateTime<Utc>>,
    },
}
