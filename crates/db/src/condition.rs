//! Backend-neutral row conditions.
//!
//! A query is a conjunction of [`Condition`]s. Every engine evaluates them the
//! same way: a column that is `NULL` never satisfies a condition.

use std::cmp::Ordering;

use time::Date;

use crate::Record;

/// A typed column value a condition can compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(Date),
}

impl FieldValue {
    /// Ordering between values of the same kind; mixed kinds do not compare.
    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        FieldValue::Date(value)
    }
}

/// One test against a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals {
        field: &'static str,
        value: FieldValue,
    },
    OneOf {
        field: &'static str,
        values: Vec<FieldValue>,
    },
    /// Case-insensitive substring match on a text column.
    Contains {
        field: &'static str,
        needle: String,
    },
    AtLeast {
        field: &'static str,
        value: FieldValue,
    },
    AtMost {
        field: &'static str,
        value: FieldValue,
    },
}

impl Condition {
    pub fn field(&self) -> &'static str {
        match self {
            Condition::Equals { field, .. }
            | Condition::OneOf { field, .. }
            | Condition::Contains { field, .. }
            | Condition::AtLeast { field, .. }
            | Condition::AtMost { field, .. } => field,
        }
    }

    pub fn matches<T: Record>(&self, record: &T) -> bool {
        let Some(actual) = record.field(self.field()) else {
            return false;
        };

        match self {
            Condition::Equals { value, .. } => actual == *value,
            Condition::OneOf { values, .. } => values.contains(&actual),
            Condition::Contains { needle, .. } => match actual {
                FieldValue::Text(text) => text.to_lowercase().contains(&needle.to_lowercase()),
                FieldValue::Date(_) => false,
            },
            Condition::AtLeast { value, .. } => {
                matches!(actual.compare(value), Some(Ordering::Greater | Ordering::Equal))
            }
            Condition::AtMost { value, .. } => {
                matches!(actual.compare(value), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

/// Whether `record` satisfies every condition; an empty list matches all rows.
pub fn satisfies_all<T: Record>(conditions: &[Condition], record: &T) -> bool {
    conditions.iter().all(|condition| condition.matches(record))
}
