//! Record store abstraction with an in-memory engine and a PostgreSQL pool.
//!
//! A [`Repository`] owns a collection of [`Record`]s keyed by a
//! system-assigned integer id. Queries take a conjunction of [`Condition`]s
//! and a [`Window`] and return the matching rows in ascending id order, which
//! is insertion order, together with the total match count.

use async_trait::async_trait;
use thiserror::Error;

pub mod condition;
pub mod memory;
pub mod postgres;

pub use condition::{Condition, FieldValue};
pub use memory::MemoryTable;

/// System-assigned record identifier.
pub type RecordId = i64;

/// A row that can live in a [`Repository`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Table name used in logs.
    const TABLE: &'static str;

    fn id(&self) -> RecordId;

    fn assign_id(&mut self, id: RecordId);

    /// `(field, value)` pairs that must be unique across the table.
    fn unique_keys(&self) -> Vec<(&'static str, String)>;

    /// Value of a filterable column; `None` for `NULL` or unknown columns.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Offset/limit window applied after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Rows inside a [`Window`] plus the number of rows matching before windowing.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice<T> {
    pub total: usize,
    pub rows: Vec<T>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: RecordId },

    #[error("unique constraint violated on {table}.{field} for value '{value}'")]
    UniqueViolation {
        table: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("storage backend failure")]
    Backend(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD plus predicate query over a single record type.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Assign a fresh id and store the record.
    async fn insert(&self, record: T) -> StoreResult<T>;

    async fn get(&self, id: RecordId) -> StoreResult<Option<T>>;

    /// Overwrite the record carrying `record.id()`.
    async fn replace(&self, record: T) -> StoreResult<T>;

    async fn delete(&self, id: RecordId) -> StoreResult<()>;

    /// Rows satisfying every condition, windowed, in id order.
    async fn query(&self, conditions: &[Condition], window: Window) -> StoreResult<Slice<T>>;

    async fn count(&self) -> StoreResult<usize>;

    /// Whether `value` is free for `field`, ignoring the row `exclude`.
    async fn is_unique(
        &self,
        field: &'static str,
        value: &str,
        exclude: Option<RecordId>,
    ) -> StoreResult<bool>;
}
