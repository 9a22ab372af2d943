//! Test doubles shared by the module test suites.
//!
//! `MemoryStore` implements `DataStore` over per-table row vectors, keeps a
//! mutation log so tests can assert write order and counts, and can be told
//! to fail inserts/updates on specific tables to exercise partial-failure
//! paths.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::notify::{Notifier, Severity};
use crate::store::{DataStore, Filter};

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    ops: Mutex<Vec<String>>,
    fail_inserts: Mutex<HashSet<String>>,
    fail_updates: Mutex<HashSet<String>>,
    rpc_calls: Mutex<Vec<(String, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutation log: one entry per insert/update/delete/rpc, in call order.
    pub fn op_log(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn rpc_calls(&self) -> Vec<(String, Value)> {
        self.rpc_calls.lock().unwrap().clone()
    }

    pub fn fail_insert_on(&self, table: &str) {
        self.fail_inserts.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_update_on(&self, table: &str) {
        self.fail_updates.lock().unwrap().insert(table.to_string());
    }

    fn log(&self, op: &str, table: &str) {
        self.ops.lock().unwrap().push(format!("{op} {table}"));
    }

    fn field_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn matches(row: &Value, filters: &[Filter]) -> bool {
        filters.iter().all(|f| {
            row.get(&f.column)
                .map(|v| Self::field_text(v) == f.value)
                .unwrap_or(false)
        })
    }

    fn forced_failure(table: &str) -> StoreError {
        StoreError::Status {
            code: 500,
            detail: format!("forced failure on {table}"),
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| Self::matches(r, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        if self.fail_inserts.lock().unwrap().contains(table) {
            return Err(Self::forced_failure(table));
        }
        self.log("insert", table);
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows.clone());
        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        if self.fail_updates.lock().unwrap().contains(table) {
            return Err(Self::forced_failure(table));
        }
        self.log("update", table);
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if !Self::matches(row, filters) {
                continue;
            }
            if let (Value::Object(target), Value::Object(changes)) = (&mut *row, &patch) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        self.log("delete", table);
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|r| !Self::matches(r, filters));
        }
        Ok(())
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let order = tables
            .get("orders")
            .and_then(|rows| rows.iter().find(|r| Self::matches(r, &[Filter::eq("id", order_id)])))
            .cloned();
        let Some(mut order) = order else {
            return Ok(None);
        };

        let children = |table: &str| -> Vec<Value> {
            let mut rows: Vec<Value> = tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| Self::matches(r, &[Filter::eq("order_id", order_id)]))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            rows.sort_by_key(|r| {
                r.get("created_at")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            });
            rows
        };

        if let Value::Object(map) = &mut order {
            map.insert("order_items".into(), Value::Array(children("order_items")));
            map.insert("payments".into(), Value::Array(children("payments")));
        }
        Ok(Some(order))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
        self.log("rpc", function);
        self.rpc_calls
            .lock()
            .unwrap()
            .push((function.to_string(), args));
        Ok(serde_json::json!({ "success": true }))
    }
}

// ---------------------------------------------------------------------------
// Notifier double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct CollectingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}
