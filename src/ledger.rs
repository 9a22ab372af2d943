//! Order ledger reconciler.
//!
//! Owns the in-memory order collection — a read-through, write-around cache
//! of the remote store. Every mutating operation runs the same two-phase
//! shape: compute derived fields and issue the remote writes in a fixed
//! sequence (the "apply" half, which hands back a `PendingRefresh`), then
//! refetch each affected order's full nested graph and replace the stale
//! local copy (`reconcile`). Nothing local is trusted across a remote round
//! trip; decisions that depend on post-write state (all-items-ready
//! promotion) are made from the refetched rows.
//!
//! There is no rollback. A failure partway through a multi-write operation
//! surfaces what happened and leaves the rows already written in place; the
//! next reconcile brings the cache in line with whatever the store now holds.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Catalog, MovementDirection, Order, OrderItem, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, ProductionStatus,
};
use crate::nota::NotaCounter;
use crate::notify::{Notifier, Severity};
use crate::pricing;
use crate::stock;
use crate::store::{decode_row, encode_row, DataStore, Filter};

/// Balances at or below this are treated as fully paid.
pub const BALANCE_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Inputs and results
// ---------------------------------------------------------------------------

/// New order as captured at the counter.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer_id: String,
    pub assignee_id: Option<String>,
    pub items: Vec<ItemDraft>,
}

#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub bahan_id: String,
    pub finishing_id: Option<String>,
    pub panjang: Option<f64>,
    pub lebar: Option<f64>,
    pub qty: f64,
    pub keterangan: Option<String>,
}

/// Orders whose remote writes have landed but whose local copies are stale.
/// Produced by the apply half of an operation, consumed by [`OrderLedger::reconcile`].
#[derive(Debug, Clone)]
pub struct PendingRefresh {
    order_ids: Vec<String>,
}

impl PendingRefresh {
    pub fn for_order(order_id: &str) -> Self {
        Self {
            order_ids: vec![order_id.to_string()],
        }
    }

    pub fn for_orders(order_ids: Vec<String>) -> Self {
        Self { order_ids }
    }

    pub fn order_ids(&self) -> &[String] {
        &self.order_ids
    }
}

/// One slice of a bulk payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub order_id: String,
    pub no_nota: String,
    pub amount: f64,
}

/// Result of a bulk payment run.
#[derive(Debug, Clone)]
pub enum BulkOutcome {
    Allocated(Vec<Allocation>),
    /// Every candidate was already settled (or there were none): nothing was
    /// written.
    NothingToProcess,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct OrderLedger {
    store: Arc<dyn DataStore>,
    notifier: Arc<dyn Notifier>,
    orders: Vec<Order>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn DataStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            orders: Vec::new(),
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// Replace the whole collection from the store: one select per table,
    /// children grouped and ordered in memory. Malformed rows are skipped
    /// with a warning.
    pub async fn load_all(&mut self) -> LedgerResult<usize> {
        let order_rows = self.store.select("orders", &[]).await?;
        let item_rows = self.store.select("order_items", &[]).await?;
        let payment_rows = self.store.select("payments", &[]).await?;

        let mut orders: Vec<Order> = Vec::with_capacity(order_rows.len());
        for row in order_rows {
            match decode_row::<Order>(row) {
                Ok(o) => orders.push(o),
                Err(e) => warn!("skipping malformed order row: {e}"),
            }
        }

        let mut items: Vec<OrderItem> = Vec::with_capacity(item_rows.len());
        for row in item_rows {
            match decode_row::<OrderItem>(row) {
                Ok(i) => items.push(i),
                Err(e) => warn!("skipping malformed order item row: {e}"),
            }
        }
        let mut payments: Vec<Payment> = Vec::with_capacity(payment_rows.len());
        for row in payment_rows {
            match decode_row::<Payment>(row) {
                Ok(p) => payments.push(p),
                Err(e) => warn!("skipping malformed payment row: {e}"),
            }
        }

        items.sort_by_key(|i| i.created_at);
        payments.sort_by_key(|p| p.created_at);

        for order in &mut orders {
            order.order_items = items.iter().filter(|i| i.order_id == order.id).cloned().collect();
            order.payments = payments
                .iter()
                .filter(|p| p.order_id == order.id)
                .cloned()
                .collect();
        }

        let count = orders.len();
        self.orders = orders;
        info!(count, "order ledger loaded");
        Ok(count)
    }

    /// Commit half of the two-phase contract: refetch each pending order's
    /// nested graph and swap it into the collection. An order that vanished
    /// remotely is dropped locally. Refetching an unchanged order is a no-op
    /// on observable state.
    pub async fn reconcile(&mut self, pending: PendingRefresh) -> LedgerResult<()> {
        for order_id in pending.order_ids {
            match self.store.fetch_order(&order_id).await? {
                Some(row) => {
                    let fresh: Order = decode_row(row)?;
                    self.put(fresh);
                }
                None => self.orders.retain(|o| o.id != order_id),
            }
        }
        Ok(())
    }

    fn put(&mut self, fresh: Order) {
        match self.orders.iter_mut().find(|o| o.id == fresh.id) {
            Some(slot) => *slot = fresh,
            None => self.orders.push(fresh),
        }
    }

    fn cloned_order(&self, order_id: &str) -> LedgerResult<Order> {
        self.order(order_id)
            .cloned()
            .ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()))
    }

    fn report_error(&self, err: &LedgerError) {
        self.notifier.notify(&err.to_string(), Severity::Error);
    }

    // -----------------------------------------------------------------------
    // Order intake
    // -----------------------------------------------------------------------

    /// Create an order with its items: reserve a nota number, insert the
    /// order row, insert the item rows, then reconcile.
    pub async fn create_order(&mut self, draft: OrderDraft, catalog: &Catalog) -> LedgerResult<Order> {
        let result = self.create_order_inner(draft, catalog).await;
        match &result {
            Ok(order) => self.notifier.notify(
                &format!("Order {} saved", order.no_nota),
                Severity::Success,
            ),
            Err(e) => self.report_error(e),
        }
        result
    }

    async fn create_order_inner(
        &mut self,
        draft: OrderDraft,
        catalog: &Catalog,
    ) -> LedgerResult<Order> {
        if catalog.customer(&draft.customer_id).is_none() {
            return Err(LedgerError::CustomerNotFound(draft.customer_id));
        }

        let no_nota = NotaCounter::new(self.store.clone()).next_nota().await?;
        let order_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let order = Order {
            id: order_id.clone(),
            customer_id: draft.customer_id,
            no_nota,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::BelumLunas,
            assignee_id: draft.assignee_id,
            created_at: now,
            order_items: Vec::new(),
            payments: Vec::new(),
        };
        self.store.insert("orders", vec![encode_row(&order)?]).await?;

        if !draft.items.is_empty() {
            let rows = draft
                .items
                .into_iter()
                .map(|d| {
                    encode_row(&OrderItem {
                        id: Uuid::new_v4().to_string(),
                        order_id: order_id.clone(),
                        bahan_id: d.bahan_id,
                        finishing_id: d.finishing_id,
                        panjang: d.panjang,
                        lebar: d.lebar,
                        qty: d.qty,
                        status: ProductionStatus::Pending,
                        keterangan: d.keterangan,
                        created_at: now,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.store.insert("order_items", rows).await?;
        }

        self.reconcile(PendingRefresh::for_order(&order_id)).await?;
        self.cloned_order(&order_id)
    }

    // -----------------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------------

    /// Append a payment and re-derive the order's payment status. The status
    /// row is only written when it actually changes.
    pub async fn add_payment(
        &mut self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
        catalog: &Catalog,
    ) -> LedgerResult<Order> {
        let result = self.add_payment_inner(order_id, amount, method, catalog).await;
        match &result {
            Ok(order) => self.notifier.notify(
                &format!("Payment of {:.2} recorded for {}", amount, order.no_nota),
                Severity::Success,
            ),
            Err(e) => self.report_error(e),
        }
        result
    }

    async fn add_payment_inner(
        &mut self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
        catalog: &Catalog,
    ) -> LedgerResult<Order> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidAmount);
        }
        let order = self.cloned_order(order_id)?;

        let total_bill = pricing::order_total(&order, catalog);
        let paid_after = pricing::total_paid(&order) + amount;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            amount,
            method,
            created_at: Utc::now(),
        };
        self.store.insert("payments", vec![encode_row(&payment)?]).await?;

        let new_status = pricing::derive_payment_status(total_bill, paid_after);
        if new_status != order.payment_status {
            self.store
                .update(
                    "orders",
                    &[Filter::eq("id", order_id)],
                    json!({ "payment_status": encode_row(&new_status)? }),
                )
                .await?;
            info!(order_id, status = ?new_status, "payment status transitioned");
        }

        self.reconcile(PendingRefresh::for_order(order_id)).await?;
        self.cloned_order(order_id)
    }

    /// Distribute one incoming amount across the candidates' outstanding
    /// balances, oldest order first. Payment rows go out as a single batch
    /// insert; the per-order status flips follow as independent writes.
    pub async fn allocate_bulk_payment(
        &mut self,
        candidate_ids: &[String],
        amount: f64,
        method: PaymentMethod,
        catalog: &Catalog,
    ) -> LedgerResult<BulkOutcome> {
        let result = self
            .allocate_bulk_inner(candidate_ids, amount, method, catalog)
            .await;
        match &result {
            Ok(BulkOutcome::Allocated(allocations)) => self.notifier.notify(
                &format!("Payment spread across {} order(s)", allocations.len()),
                Severity::Success,
            ),
            Ok(BulkOutcome::NothingToProcess) => self
                .notifier
                .notify("No outstanding balance to settle", Severity::Info),
            Err(e) => self.report_error(e),
        }
        result
    }

    async fn allocate_bulk_inner(
        &mut self,
        candidate_ids: &[String],
        amount: f64,
        method: PaymentMethod,
        catalog: &Catalog,
    ) -> LedgerResult<BulkOutcome> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut candidates: Vec<Order> = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            match self.order(id) {
                Some(order) => candidates.push(order.clone()),
                None => warn!(order_id = %id, "bulk payment candidate not in ledger, skipping"),
            }
        }
        // Oldest debt first.
        candidates.sort_by_key(|o| o.created_at);

        let now = Utc::now();
        let mut remaining = amount;
        let mut allocations: Vec<Allocation> = Vec::new();
        let mut payment_rows = Vec::new();
        let mut status_flips: Vec<String> = Vec::new();

        for order in &candidates {
            if remaining <= 0.0 {
                break;
            }
            let total_bill = pricing::order_total(order, catalog);
            let paid = pricing::total_paid(order);
            let balance = (total_bill - paid).max(0.0);
            if balance <= BALANCE_TOLERANCE {
                continue;
            }

            let slice = remaining.min(balance);
            remaining -= slice;

            payment_rows.push(encode_row(&Payment {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                amount: slice,
                method,
                created_at: now,
            })?);
            allocations.push(Allocation {
                order_id: order.id.clone(),
                no_nota: order.no_nota.clone(),
                amount: slice,
            });

            if paid + slice >= total_bill && order.payment_status != PaymentStatus::Lunas {
                status_flips.push(order.id.clone());
            }
        }

        if allocations.is_empty() {
            return Ok(BulkOutcome::NothingToProcess);
        }

        // One batch for the payment rows, then independent status writes —
        // no atomicity across them.
        self.store.insert("payments", payment_rows).await?;
        for order_id in &status_flips {
            self.store
                .update(
                    "orders",
                    &[Filter::eq("id", order_id)],
                    json!({ "payment_status": encode_row(&PaymentStatus::Lunas)? }),
                )
                .await?;
        }

        let affected = allocations.iter().map(|a| a.order_id.clone()).collect();
        self.reconcile(PendingRefresh::for_orders(affected)).await?;

        info!(
            count = allocations.len(),
            remaining, "bulk payment allocated"
        );
        Ok(BulkOutcome::Allocated(allocations))
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Move an order to a new status. Exactly two transition pairs touch
    /// stock: entering `Waiting` from `Pending` consumes material per item,
    /// and falling back from `Waiting`/`Proses` to `Pending` restores it.
    pub async fn update_order_status(
        &mut self,
        order_id: &str,
        new_status: OrderStatus,
        catalog: &Catalog,
    ) -> LedgerResult<Order> {
        let result = self
            .update_order_status_inner(order_id, new_status, catalog)
            .await;
        match &result {
            Ok(order) => self.notifier.notify(
                &format!("Order {} moved to {:?}", order.no_nota, order.status),
                Severity::Success,
            ),
            Err(e) => self.report_error(e),
        }
        result
    }

    async fn update_order_status_inner(
        &mut self,
        order_id: &str,
        new_status: OrderStatus,
        catalog: &Catalog,
    ) -> LedgerResult<Order> {
        let order = self.cloned_order(order_id)?;
        if order.status == new_status {
            return Ok(order);
        }

        let direction = match (order.status, new_status) {
            (OrderStatus::Pending, OrderStatus::Waiting) => Some(MovementDirection::Out),
            (OrderStatus::Waiting | OrderStatus::Proses, OrderStatus::Pending) => {
                Some(MovementDirection::In)
            }
            _ => None,
        };

        if let Some(direction) = direction {
            for item in &order.order_items {
                let finishing = item
                    .finishing_id
                    .as_deref()
                    .and_then(|id| catalog.finishing(id));
                let consumption = stock::item_consumption(item, finishing);
                if consumption <= 0.0 {
                    continue;
                }
                let Some(bahan) = self.fetch_bahan(&item.bahan_id).await? else {
                    warn!(bahan_id = %item.bahan_id, "bahan missing remotely, skipping movement");
                    continue;
                };
                let note = match direction {
                    MovementDirection::Out => format!("Consumed by order {}", order.no_nota),
                    MovementDirection::In => format!("Restored by order {}", order.no_nota),
                };
                stock::apply_movement(&self.store, &bahan, direction, consumption, None, Some(&note))
                    .await?;
            }
        }

        self.store
            .update(
                "orders",
                &[Filter::eq("id", order_id)],
                json!({ "status": encode_row(&new_status)? }),
            )
            .await?;

        self.reconcile(PendingRefresh::for_order(order_id)).await?;
        self.cloned_order(order_id)
    }

    /// Move one item through its production lifecycle. When the refetched
    /// graph shows every item `Ready`, the order itself is promoted to
    /// `Ready` as a side effect.
    pub async fn update_item_status(
        &mut self,
        order_id: &str,
        item_id: &str,
        new_status: ProductionStatus,
    ) -> LedgerResult<Order> {
        let result = self
            .update_item_status_inner(order_id, item_id, new_status)
            .await;
        match &result {
            Ok(order) if order.status == OrderStatus::Ready => self.notifier.notify(
                &format!("Order {} is ready", order.no_nota),
                Severity::Success,
            ),
            Ok(_) => {}
            Err(e) => self.report_error(e),
        }
        result
    }

    async fn update_item_status_inner(
        &mut self,
        order_id: &str,
        item_id: &str,
        new_status: ProductionStatus,
    ) -> LedgerResult<Order> {
        // The order must at least be known locally before touching its items.
        self.cloned_order(order_id)?;

        let updated = self
            .store
            .update(
                "order_items",
                &[Filter::eq("id", item_id)],
                json!({ "status": encode_row(&new_status)? }),
            )
            .await?;
        if updated.is_empty() {
            return Err(LedgerError::ItemNotFound(item_id.to_string()));
        }

        // Decide on promotion from the refetched graph, not the stale local
        // copy: another terminal may have moved the other items meanwhile.
        let fresh_row = self
            .store
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()))?;
        let fresh: Order = decode_row(fresh_row)?;

        let all_ready = !fresh.order_items.is_empty()
            && fresh
                .order_items
                .iter()
                .all(|i| i.status == ProductionStatus::Ready);

        if all_ready && fresh.status != OrderStatus::Ready {
            self.store
                .update(
                    "orders",
                    &[Filter::eq("id", order_id)],
                    json!({ "status": encode_row(&OrderStatus::Ready)? }),
                )
                .await?;
            info!(order_id, "all items ready, order promoted");
            self.reconcile(PendingRefresh::for_order(order_id)).await?;
        } else {
            self.put(fresh);
        }

        self.cloned_order(order_id)
    }

    async fn fetch_bahan(&self, bahan_id: &str) -> LedgerResult<Option<crate::models::Bahan>> {
        let rows = self
            .store
            .select("bahan", &[Filter::eq("id", bahan_id)])
            .await?;
        Ok(rows.into_iter().next().map(decode_row).transpose()?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
