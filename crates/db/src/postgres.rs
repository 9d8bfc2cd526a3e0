//! PostgreSQL plumbing shared by the sqlx-backed repositories.

use std::time::Duration;

use anyhow::Context;
use libris_kernel::settings::DatabaseSettings;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Postgres, QueryBuilder,
};

use crate::{Condition, FieldValue, Record, StoreError};

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Open a connection pool for `url` sized by `settings`.
pub async fn connect(url: &str, settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .test_before_acquire(true)
        .connect(url)
        .await
        .context("database connection failed")?;

    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "database pool initialized"
    );
    Ok(pool)
}

/// Whether `err` is a unique constraint violation; yields the constraint name
/// when the server reports one.
pub fn unique_violation(err: &sqlx::Error) -> Option<Option<&str>> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Some(db_err.constraint())
        }
        _ => None,
    }
}

/// Map a failed insert or update of `record` onto a [`StoreError`].
///
/// Unique constraints are expected to be named `{table}_{field}_key`, the
/// PostgreSQL default for a column-level `UNIQUE`.
pub fn write_error<T: Record>(err: sqlx::Error, record: &T) -> StoreError {
    let Some(constraint) = unique_violation(&err) else {
        return StoreError::Backend(err);
    };

    let keys = record.unique_keys();
    let violated = constraint
        .and_then(|name| {
            keys.iter()
                .find(|(field, _)| name == format!("{}_{}_key", T::TABLE, field))
        })
        .or_else(|| keys.first());

    match violated {
        Some((field, value)) => StoreError::UniqueViolation {
            table: T::TABLE,
            field: *field,
            value: value.clone(),
        },
        None => StoreError::Backend(err),
    }
}

/// Append ` WHERE a AND b ...` for `conditions`; nothing when empty.
///
/// Column names come from code, never from requests, so they are written
/// into the statement directly. Values are always bound.
pub fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, conditions: &[Condition]) {
    for (position, condition) in conditions.iter().enumerate() {
        builder.push(if position == 0 { " WHERE " } else { " AND " });
        let field = condition.field();

        match condition {
            Condition::Equals { value, .. } => {
                builder.push(field).push(" = ");
                push_value(builder, value);
            }
            Condition::OneOf { values, .. } if values.is_empty() => {
                builder.push("FALSE");
            }
            Condition::OneOf { values, .. } => {
                builder.push(field).push(" IN (");
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        builder.push(", ");
                    }
                    push_value(builder, value);
                }
                builder.push(")");
            }
            Condition::Contains { needle, .. } => {
                builder
                    .push("strpos(lower(")
                    .push(field)
                    .push("), lower(")
                    .push_bind(needle.clone())
                    .push(")) > 0");
            }
            Condition::AtLeast { value, .. } => {
                builder.push(field).push(" >= ");
                push_value(builder, value);
            }
            Condition::AtMost { value, .. } => {
                builder.push(field).push(" <= ");
                push_value(builder, value);
            }
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(text) => builder.push_bind(text.clone()),
        FieldValue::Date(date) => builder.push_bind(*date),
    };
}
