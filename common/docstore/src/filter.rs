use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{Document, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    /// Inclusive on whichever bounds are present.
    Range { gte: Option<Value>, lte: Option<Value> },
}

/// Conjunction of per-field conditions, evaluated against a stored document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().eq(ID_FIELD, id.to_string())
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Adds a range condition; a no-op when both bounds are absent.
    pub fn range(mut self, field: impl Into<String>, gte: Option<Value>, lte: Option<Value>) -> Self {
        if gte.is_some() || lte.is_some() {
            self.conditions.push((field.into(), Condition::Range { gte, lte }));
        }
        self
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|(field, cond)| {
            let Some(actual) = doc.get(field) else { return false };
            match cond {
                Condition::Eq(expected) => values_equal(actual, expected),
                Condition::Range { gte, lte } => {
                    let lower_ok = gte.as_ref().map_or(true, |bound| {
                        matches!(compare_values(actual, bound), Some(Ordering::Greater | Ordering::Equal))
                    });
                    let upper_ok = lte.as_ref().map_or(true, |bound| {
                        matches!(compare_values(actual, bound), Some(Ordering::Less | Ordering::Equal))
                    });
                    lower_ok && upper_ok
                }
            }
        })
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

/// Orders two stored values. RFC 3339 strings compare as instants so that
/// differing fractional-second precision does not skew range queries.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

/// Sort order used by `find`: missing and null sort lowest, then by value.
pub(crate) fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}
