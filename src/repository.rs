//! Generic CRUD repository.
//!
//! The back office is full of near-identical flat tables (customers, banks,
//! debts, suppliers, finishings, ...). One `Repository<E>` covers them all;
//! the entity type supplies its table name and id. The order graph is NOT
//! served here — orders, items, payments and stock movements are mutated only
//! through the ledger and stock modules.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{decode_row, encode_row, DataStore, Filter};

/// A row type bound to one remote table.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync {
    const TABLE: &'static str;
    fn id(&self) -> &str;
}

pub struct Repository<E: Entity> {
    store: Arc<dyn DataStore>,
    _entity: PhantomData<E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// List all rows. Malformed rows are skipped with a warning rather than
    /// failing the whole listing.
    pub async fn list(&self) -> Result<Vec<E>, StoreError> {
        let rows = self.store.select(E::TABLE, &[]).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row::<E>(row) {
                Ok(e) => entities.push(e),
                Err(e) => warn!(table = E::TABLE, "skipping malformed row: {e}"),
            }
        }
        Ok(entities)
    }

    pub async fn find(&self, id: &str) -> Result<Option<E>, StoreError> {
        let rows = self.store.select(E::TABLE, &[Filter::eq("id", id)]).await?;
        rows.into_iter().next().map(decode_row).transpose()
    }

    pub async fn create(&self, entity: &E) -> Result<E, StoreError> {
        let row = encode_row(entity)?;
        let mut returned = self.store.insert(E::TABLE, vec![row]).await?;
        match returned.pop() {
            Some(row) => decode_row(row),
            None => Ok(entity.clone()),
        }
    }

    /// Patch one row by id. Returns the updated row, or `None` when the id
    /// matched nothing.
    pub async fn update(&self, id: &str, patch: Value) -> Result<Option<E>, StoreError> {
        let rows = self
            .store
            .update(E::TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        rows.into_iter().next().map(decode_row).transpose()
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(E::TABLE, &[Filter::eq("id", id)]).await
    }
}

// ===========================================================================
// Tests
// ===========================================================================
