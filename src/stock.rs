//! Stock movements and material consumption.
//!
//! `bahan.stock_qty` is never written directly by business logic; every
//! change goes through a movement row first, then the cached quantity on the
//! bahan row is brought in line. The movement insert and the bahan update are
//! two separate remote writes with no transaction around them: when the
//! second write fails the ledger and the cache diverge, and that divergence
//! is surfaced to the caller instead of rolled back.
//!
//! Negative stock is representable and accepted — the back office corrects
//! it with a later movement or an opname.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Bahan, Finishing, MovementDirection, OrderItem, StockMovement};
use crate::store::{encode_row, DataStore, Filter};

/// Float tolerance when comparing stock quantities.
pub const STOCK_TOLERANCE: f64 = 0.001;

/// Material consumed by one order item, including finishing allowances.
/// Absent dimensions count as zero here — a unit item with no footprint
/// consumes nothing.
pub fn item_consumption(item: &OrderItem, finishing: Option<&Finishing>) -> f64 {
    let extra_panjang = finishing.map(|f| f.extra_panjang).unwrap_or(0.0);
    let extra_lebar = finishing.map(|f| f.extra_lebar).unwrap_or(0.0);
    let panjang = item.panjang.unwrap_or(0.0);
    let lebar = item.lebar.unwrap_or(0.0);
    (panjang + extra_panjang) * (lebar + extra_lebar) * item.qty
}

/// Record a directed stock change and update the bahan's cached quantity.
///
/// Returns the new stock quantity. The movement row always lands before the
/// bahan row update; a failure in between yields `StockDiverged` with the
/// movement id so the caller can reconcile by hand.
pub async fn apply_movement(
    store: &Arc<dyn DataStore>,
    bahan: &Bahan,
    direction: MovementDirection,
    qty: f64,
    supplier_id: Option<&str>,
    notes: Option<&str>,
) -> LedgerResult<f64> {
    let new_stock = match direction {
        MovementDirection::In => bahan.stock_qty + qty,
        MovementDirection::Out => bahan.stock_qty - qty,
    };

    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        bahan_id: bahan.id.clone(),
        direction,
        qty,
        supplier_id: supplier_id.map(String::from),
        notes: notes.map(String::from),
        created_at: Utc::now(),
    };
    let movement_id = movement.id.clone();

    store
        .insert("stock_movements", vec![encode_row(&movement)?])
        .await?;

    store
        .update(
            "bahan",
            &[Filter::eq("id", &bahan.id)],
            json!({ "stock_qty": new_stock }),
        )
        .await
        .map_err(|source| LedgerError::StockDiverged {
            movement_id: movement_id.clone(),
            source,
        })?;

    info!(
        bahan = %bahan.name,
        ?direction,
        qty,
        new_stock,
        "stock movement applied"
    );
    Ok(new_stock)
}

/// Reconcile recorded stock against a physical count (opname).
///
/// Applies the signed delta as one movement; a delta within tolerance writes
/// nothing and returns `None`.
pub async fn apply_opname(
    store: &Arc<dyn DataStore>,
    bahan: &Bahan,
    counted_qty: f64,
    notes: Option<&str>,
) -> LedgerResult<Option<f64>> {
    let delta = counted_qty - bahan.stock_qty;
    if delta.abs() <= STOCK_TOLERANCE {
        return Ok(None);
    }
    let direction = if delta > 0.0 {
        MovementDirection::In
    } else {
        MovementDirection::Out
    };
    let note = notes.unwrap_or("Stock opname");
    let new_stock =
        apply_movement(store, bahan, direction, delta.abs(), None, Some(note)).await?;
    Ok(Some(new_stock))
}

// ===========================================================================
// Tests
// ===========================================================================
