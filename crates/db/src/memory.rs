use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::condition::satisfies_all;
use crate::{Condition, Record, RecordId, Repository, Slice, StoreError, StoreResult, Window};

/// In-memory table. Writers hold the write lock across the unique-key check
/// and the mutation, so unique constraints cannot race.
pub struct MemoryTable<T: Record> {
    inner: RwLock<TableState<T>>,
}

struct TableState<T> {
    rows: BTreeMap<RecordId, T>,
    unique: HashMap<(&'static str, String), RecordId>,
    next_id: RecordId,
}

impl<T: Record> TableState<T> {
    fn conflict(&self, record: &T, exclude: Option<RecordId>) -> Option<StoreError> {
        record.unique_keys().into_iter().find_map(|(field, value)| {
            match self.unique.get(&(field, value.clone())) {
                Some(owner) if Some(*owner) != exclude => Some(StoreError::UniqueViolation {
                    table: T::TABLE,
                    field,
                    value,
                }),
                _ => None,
            }
        })
    }

    fn index(&mut self, record: &T) {
        for key in record.unique_keys() {
            self.unique.insert(key, record.id());
        }
    }

    fn unindex(&mut self, record: &T) {
        for key in record.unique_keys() {
            self.unique.remove(&key);
        }
    }
}

impl<T: Record> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TableState {
                rows: BTreeMap::new(),
                unique: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl<T: Record> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryTable<T> {
    async fn insert(&self, mut record: T) -> StoreResult<T> {
        let mut state = self.inner.write().await;
        if let Some(err) = state.conflict(&record, None) {
            return Err(err);
        }

        let id = state.next_id;
        state.next_id += 1;
        record.assign_id(id);
        state.index(&record);
        state.rows.insert(id, record.clone());

        tracing::debug!(table = T::TABLE, id, "record inserted");
        Ok(record)
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<T>> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn replace(&self, record: T) -> StoreResult<T> {
        let id = record.id();
        let mut state = self.inner.write().await;
        let previous = state
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                table: T::TABLE,
                id,
            })?;
        if let Some(err) = state.conflict(&record, Some(id)) {
            return Err(err);
        }

        state.unindex(&previous);
        state.index(&record);
        state.rows.insert(id, record.clone());

        tracing::debug!(table = T::TABLE, id, "record replaced");
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let removed = state.rows.remove(&id).ok_or(StoreError::NotFound {
            table: T::TABLE,
            id,
        })?;
        state.unindex(&removed);

        tracing::debug!(table = T::TABLE, id, "record deleted");
        Ok(())
    }

    async fn query(&self, conditions: &[Condition], window: Window) -> StoreResult<Slice<T>> {
        let state = self.inner.read().await;
        let mut total = 0;
        let mut rows = Vec::with_capacity(window.limit.min(state.rows.len()));

        for record in state
            .rows
            .values()
            .filter(|record| satisfies_all(conditions, *record))
        {
            if total >= window.offset && rows.len() < window.limit {
                rows.push(record.clone());
            }
            total += 1;
        }

        Ok(Slice { total, rows })
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.read().await.rows.len())
    }

    async fn is_unique(
        &self,
        field: &'static str,
        value: &str,
        exclude: Option<RecordId>,
    ) -> StoreResult<bool> {
        let state = self.inner.read().await;
        Ok(match state.unique.get(&(field, value.to_string())) {
            Some(owner) => Some(*owner) == exclude,
            None => true,
        })
    }
}
