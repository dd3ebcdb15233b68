//! Translation of [`FilterOptions`] into a [`PayloadFilter`].
//!
//! The translation is pure except for `maxAgeDays`, which is resolved against a clock.
//! [`build_payload_filter_at`] takes that clock explicitly.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::models::{
    CustomFilter, FieldCondition, FilterOperator, FilterOptions, PayloadFilter, Predicate,
};

const KEY_SCORE: &str = "score";
const KEY_LAST_UPDATED: &str = "metadata.lastUpdated";
const KEY_TAGS: &str = "metadata.tags";
const KEY_CATEGORY: &str = "metadata.category";
const KEY_SOURCE: &str = "metadata.source";
const KEY_PRIORITY: &str = "metadata.priority";
const KEY_READABILITY: &str = "metadata.readability";
const KEY_WORD_COUNT: &str = "metadata.wordCount";

/// Build against the current wall-clock time.
pub fn build_payload_filter(options: &FilterOptions) -> Option<PayloadFilter> {
    build_payload_filter_at(options, Utc::now())
}

/// Returns `None` when no field is populated, never an always-false filter.
pub fn build_payload_filter_at(
    options: &FilterOptions,
    now: DateTime<Utc>,
) -> Option<PayloadFilter> {
    let mut must = Vec::new();

    if let Some(min_score) = options.min_score {
        must.push(FieldCondition::new(KEY_SCORE, gte(min_score)));
    }

    if let Some(range) = &options.date_range {
        let start = range.start.as_deref().and_then(parse_timestamp);
        let end = range.end.as_deref().and_then(parse_timestamp);
        if start.is_some() || end.is_some() {
            must.push(FieldCondition::new(
                KEY_LAST_UPDATED,
                Predicate::DatetimeRange {
                    gte: start,
                    lte: end,
                },
            ));
        }
    }

    for tag in &options.required_tags {
        must.push(FieldCondition::new(
            KEY_TAGS,
            Predicate::Match(Value::String(tag.clone())),
        ));
    }

    if !options.categories.is_empty() {
        must.push(FieldCondition::new(KEY_CATEGORY, any_of(&options.categories)));
    }

    if !options.sources.is_empty() {
        must.push(FieldCondition::new(KEY_SOURCE, any_of(&options.sources)));
    }

    if let Some(priority) = options.priority {
        must.push(FieldCondition::new(KEY_PRIORITY, gte(priority)));
    }

    if let Some(readability) = options.min_readability {
        must.push(FieldCondition::new(KEY_READABILITY, gte(readability)));
    }

    if let Some(word_count) = &options.word_count
        && (word_count.min.is_some() || word_count.max.is_some())
    {
        must.push(FieldCondition::new(
            KEY_WORD_COUNT,
            Predicate::Range {
                gte: word_count.min.map(|n| n as f64),
                lte: word_count.max.map(|n| n as f64),
            },
        ));
    }

    must.extend(options.custom_filters.iter().filter_map(custom_condition));

    if let Some(days) = options.max_age_days {
        let cutoff = now - Duration::days(i64::from(days));
        must.push(FieldCondition::new(
            KEY_LAST_UPDATED,
            Predicate::DatetimeRange {
                gte: Some(cutoff),
                lte: None,
            },
        ));
    }

    if must.is_empty() {
        None
    } else {
        Some(PayloadFilter { must })
    }
}

/// Exact-match conditions from a raw `key -> value` map.
pub fn payload_match_conditions(
    payload: &serde_json::Map<String, Value>,
) -> impl Iterator<Item = FieldCondition> + '_ {
    payload.iter().map(|(key, value)| {
        let predicate = match value {
            Value::Array(values) => Predicate::MatchAny(values.clone()),
            other => Predicate::Match(other.clone()),
        };
        FieldCondition::new(key.clone(), predicate)
    })
}

fn gte(value: f64) -> Predicate {
    Predicate::Range {
        gte: Some(value),
        lte: None,
    }
}

fn any_of(values: &[String]) -> Predicate {
    Predicate::MatchAny(values.iter().cloned().map(Value::String).collect())
}

fn custom_condition(filter: &CustomFilter) -> Option<FieldCondition> {
    let predicate = match filter.operator {
        FilterOperator::Equals => Predicate::Match(filter.value.clone()),
        FilterOperator::Contains => match &filter.value {
            Value::String(text) => Predicate::Text(text.clone()),
            other => Predicate::Match(other.clone()),
        },
        FilterOperator::Gte | FilterOperator::Lte => {
            let is_gte = filter.operator == FilterOperator::Gte;
            if let Some(n) = as_number(&filter.value) {
                let (lower, upper) = if is_gte { (Some(n), None) } else { (None, Some(n)) };
                Predicate::Range {
                    gte: lower,
                    lte: upper,
                }
            } else if let Some(ts) = filter.value.as_str().and_then(parse_timestamp) {
                let (lower, upper) = if is_gte { (Some(ts), None) } else { (None, Some(ts)) };
                Predicate::DatetimeRange {
                    gte: lower,
                    lte: upper,
                }
            } else {
                tracing::debug!(field = %filter.field, "skipping non-comparable custom filter");
                return None;
            }
        }
    };

    Some(FieldCondition::new(filter.field.clone(), predicate))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
