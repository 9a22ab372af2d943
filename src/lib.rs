//! Cetak POS - order ledger and back-office core
//!
//! Headless core of a point-of-sale system for a small printing business.
//! All persistence lives in a hosted Supabase project; this crate owns the
//! in-memory order collection, keeps it consistent with the remote tables
//! after every mutating operation, and carries the arithmetic that derives
//! billing status, stock consumption, and invoice numbers. The UI shell
//! (rendering, toasts, auth) sits on top and consumes these modules.

pub mod backup;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod nota;
pub mod notify;
pub mod pricing;
pub mod repository;
pub mod stock;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StoreConfig;
pub use error::{LedgerError, LedgerResult, StoreError};
pub use ledger::{Allocation, BulkOutcome, ItemDraft, OrderDraft, OrderLedger, PendingRefresh};
pub use models::Catalog;
pub use notify::{Notifier, Severity, TracingNotifier};
pub use repository::{Entity, Repository};
pub use store::{DataStore, Filter, SupabaseStore};
