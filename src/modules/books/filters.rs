//! Query-string filters for the book list.
//!
//! | parameter                | predicate                           |
//! |--------------------------|-------------------------------------|
//! | `author`, `language`     | exact match                         |
//! | `<field>__in`            | one of a comma-separated list       |
//! | `<field>__icontains`     | case-insensitive substring          |
//! | `published_date`         | on the given day                    |
//! | `published_date__gte`    | on or after                         |
//! | `published_date__lte`    | on or before                        |
//!
//! Values are trimmed. Dates are `YYYY-M-D` or `M/D/YYYY`. Other parameters
//! are ignored, blank values count as absent and supplied filters combine
//! with AND.

use libris_db::Condition;
use libris_http::{AppError, FieldErrors, QueryParams};
use thiserror::Error;
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};

use super::models::{parse_iso_date, Book};

const INVALID_DATE: &str = "Enter a valid date.";

/// Text columns that accept exact, list and substring lookups.
const TEXT_FIELDS: [&str; 2] = ["author", "language"];

const PUBLISHED_DATE: &str = "published_date";

/// `MM/DD/YYYY`, accepted in filters next to ISO dates.
const US_DATE_INPUT: &[BorrowedFormatItem<'static>] =
    format_description!("[month padding:none]/[day padding:none]/[year]");

fn parse_filter_date(raw: &str) -> Option<Date> {
    parse_iso_date(raw).or_else(|| Date::parse(raw.trim(), US_DATE_INPUT).ok())
}

/// A filter value could not be coerced to its column type.
#[derive(Debug, Error)]
#[error("invalid filter parameters: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct InvalidFilter(pub FieldErrors);

impl From<InvalidFilter> for AppError {
    fn from(err: InvalidFilter) -> Self {
        AppError::validation(err.0, "Invalid filter parameters")
    }
}

/// Conjunction of conditions compiled from a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    conditions: Vec<Condition>,
}

impl BookFilter {
    /// Compile the recognized parameters of `query`.
    pub fn from_query(query: &QueryParams) -> Result<Self, InvalidFilter> {
        let mut conditions = Vec::new();
        let mut errors = FieldErrors::new();

        for field in TEXT_FIELDS {
            if let Some(value) = query.get_non_empty(field) {
                conditions.push(Condition::Equals {
                    field,
                    value: value.into(),
                });
            }
            if let Some(value) = query.get_non_empty(&format!("{field}__in")) {
                let values = value
                    .split(',')
                    .filter(|item| !item.is_empty())
                    .map(Into::into)
                    .collect();
                conditions.push(Condition::OneOf { field, values });
            }
            if let Some(value) = query.get_non_empty(&format!("{field}__icontains")) {
                conditions.push(Condition::Contains {
                    field,
                    needle: value.to_lowercase(),
                });
            }
        }

        let date_lookups: [(&str, fn(Date) -> Condition); 3] = [
            (PUBLISHED_DATE, |day| Condition::Equals {
                field: PUBLISHED_DATE,
                value: day.into(),
            }),
            ("published_date__gte", |day| Condition::AtLeast {
                field: PUBLISHED_DATE,
                value: day.into(),
            }),
            ("published_date__lte", |day| Condition::AtMost {
                field: PUBLISHED_DATE,
                value: day.into(),
            }),
        ];
        for (param, condition) in date_lookups {
            let Some(raw) = query.get_non_empty(param) else {
                continue;
            };
            match parse_filter_date(raw) {
                Some(day) => conditions.push(condition(day)),
                None => {
                    errors.insert(param.to_string(), vec![INVALID_DATE.to_string()]);
                }
            }
        }

        if !errors.is_empty() {
            return Err(InvalidFilter(errors));
        }
        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, book: &Book) -> bool {
        libris_db::condition::satisfies_all(&self.conditions, book)
    }
}
