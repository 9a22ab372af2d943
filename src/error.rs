//! Error types for the ledger core.
//!
//! Two layers: `StoreError` covers the remote data store (network, HTTP
//! status, decode), `LedgerError` covers everything an operation can surface
//! to the caller. Referential gaps during total calculation are deliberately
//! NOT errors; those fall back to zero/skip in the pricing module.

use thiserror::Error;

/// Failures talking to the remote Supabase store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Supabase not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Network(String),

    #[error("Supabase error (HTTP {code}): {detail}")]
    Status { code: u16, detail: String },

    #[error("Invalid row from Supabase: {0}")]
    Decode(String),
}

/// Failures surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Order item not found: {0}")]
    ItemNotFound(String),

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Nota counter is not numeric: '{0}'")]
    CounterNotNumeric(String),

    #[error("Nota counter contended after {0} attempts")]
    CounterConflict(u32),

    /// The movement row was written but the bahan row update failed, so the
    /// ledger and the cached stock now disagree until the next refetch.
    #[error("stock ledger diverged: movement {movement_id} recorded but bahan update failed: {source}")]
    StockDiverged {
        movement_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid backup document: {0}")]
    InvalidBackup(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
