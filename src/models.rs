//! Typed rows for the remote Supabase tables.
//!
//! Ids are client-generated UUID v4 strings; timestamps are RFC 3339 via
//! chrono. Field names match the remote columns so rows round-trip through
//! serde without renaming maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::repository::{Entity, Repository};
use crate::store::DataStore;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Customer price tier. Selects which Bahan price column applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerLevel {
    #[serde(rename = "End Customer")]
    EndCustomer,
    Retail,
    Grosir,
    Reseller,
    Corporate,
    /// Anything the remote store holds that this build does not know.
    /// Prices resolve to 0 for it.
    #[serde(other)]
    Unknown,
}

/// Order lifecycle. `Waiting` is the point where material is consumed;
/// moving back to `Pending` restores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Waiting,
    Proses,
    Ready,
    Selesai,
}

/// Per-item production state, independent of the order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionStatus {
    Pending,
    Waiting,
    Proses,
    Ready,
}

/// Billing state of an order. One-way: once `Lunas`, never reverts
/// automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Lunas,
    #[serde(rename = "Belum Lunas")]
    BelumLunas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Tunai,
    Transfer,
    #[serde(rename = "QRIS")]
    Qris,
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

// ---------------------------------------------------------------------------
// Order graph (owned by the ledger, never edited through the generic
// repository)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub no_nota: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub assignee_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub bahan_id: String,
    #[serde(default)]
    pub finishing_id: Option<String>,
    /// Length in area units. Absent or non-positive together with `lebar`
    /// makes this a flat-fee unit item (area 1).
    #[serde(default)]
    pub panjang: Option<f64>,
    #[serde(default)]
    pub lebar: Option<f64>,
    pub qty: f64,
    pub status: ProductionStatus,
    #[serde(default)]
    pub keterangan: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only. There is no edit or delete path for payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

/// Immutable stock ledger row. `bahan.stock_qty` equals the signed sum of
/// these per bahan, within 0.001.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub bahan_id: String,
    pub direction: MovementDirection,
    pub qty: f64,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Catalog entities (plain CRUD through `Repository<E>`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub level: CustomerLevel,
}

/// Raw material, stocked by area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bahan {
    pub id: String,
    pub name: String,
    pub harga_end_customer: f64,
    pub harga_retail: f64,
    pub harga_grosir: f64,
    pub harga_reseller: f64,
    pub harga_corporate: f64,
    pub stock_qty: f64,
    #[serde(default)]
    pub satuan: Option<String>,
}

/// Post-processing option adding fixed allowances to an item's footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finishing {
    pub id: String,
    pub name: String,
    pub extra_panjang: f64,
    pub extra_lebar: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gaji_pokok: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub keterangan: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub creditor: String,
    pub amount: f64,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub id: String,
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
}

/// Key/value row for the public display screen panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySetting {
    pub id: String,
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Entity bindings
// ---------------------------------------------------------------------------

macro_rules! entity {
    ($ty:ty, $table:literal) => {
        impl Entity for $ty {
            const TABLE: &'static str = $table;
            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

entity!(Customer, "customers");
entity!(Employee, "employees");
entity!(Bahan, "bahan");
entity!(Expense, "expenses");
entity!(Bank, "banks");
entity!(Asset, "assets");
entity!(Debt, "debts");
entity!(Supplier, "suppliers");
entity!(Finishing, "finishings");
entity!(DisplaySetting, "display_settings");

// ---------------------------------------------------------------------------
// Catalog snapshot
// ---------------------------------------------------------------------------

/// Read-only in-memory snapshot of the pricing tables. Passed by reference
/// into pricing and ledger operations; refreshed by reloading, never mutated
/// in place.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub customers: Vec<Customer>,
    pub bahans: Vec<Bahan>,
    pub finishings: Vec<Finishing>,
}

impl Catalog {
    /// Load all three tables from the store in one pass.
    pub async fn load(store: &Arc<dyn DataStore>) -> Result<Self, StoreError> {
        let customers = Repository::<Customer>::new(store.clone()).list().await?;
        let bahans = Repository::<Bahan>::new(store.clone()).list().await?;
        let finishings = Repository::<Finishing>::new(store.clone()).list().await?;
        Ok(Self {
            customers,
            bahans,
            finishings,
        })
    }

    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn bahan(&self, id: &str) -> Option<&Bahan> {
        self.bahans.iter().find(|b| b.id == id)
    }

    pub fn finishing(&self, id: &str) -> Option<&Finishing> {
        self.finishings.iter().find(|f| f.id == id)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
