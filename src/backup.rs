//! Backup export and import.
//!
//! Export reads every table into one JSON document keyed by table name.
//! Import hands that document to the `import_backup_data` RPC, which replaces
//! the tables server-side in one shot; this client only checks the document
//! has the right shape before submitting.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::store::DataStore;

/// Every table the back office owns, in export order.
pub const BACKUP_TABLES: &[&str] = &[
    "customers",
    "employees",
    "bahan",
    "expenses",
    "orders",
    "order_items",
    "payments",
    "banks",
    "assets",
    "debts",
    "suppliers",
    "stock_movements",
    "finishings",
    "settings",
    "display_settings",
];

/// Read all tables into a `{table: [rows]}` document.
pub async fn export_backup(store: &Arc<dyn DataStore>) -> Result<Value, StoreError> {
    let mut doc = serde_json::Map::new();
    for table in BACKUP_TABLES {
        let rows = store.select(table, &[]).await?;
        doc.insert(table.to_string(), Value::Array(rows));
    }
    info!(tables = BACKUP_TABLES.len(), "backup exported");
    Ok(Value::Object(doc))
}

/// Shape check: a JSON object whose values are all arrays.
pub fn validate_backup(doc: &Value) -> Result<(), LedgerError> {
    let Some(map) = doc.as_object() else {
        return Err(LedgerError::InvalidBackup(
            "document is not a JSON object".to_string(),
        ));
    };
    for (table, rows) in map {
        if !rows.is_array() {
            return Err(LedgerError::InvalidBackup(format!(
                "'{table}' is not an array of rows"
            )));
        }
    }
    Ok(())
}

/// Submit a backup document to the server-side bulk import.
pub async fn import_backup(store: &Arc<dyn DataStore>, doc: Value) -> LedgerResult<Value> {
    validate_backup(&doc)?;
    let result = store
        .rpc("import_backup_data", json!({ "backup_data": doc }))
        .await?;
    info!("backup import submitted");
    Ok(result)
}

// ===========================================================================
// Tests
// ===========================================================================
