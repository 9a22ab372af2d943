//! Order total arithmetic.
//!
//! Pure functions, shared by display code and payment-status derivation so
//! both always agree. Referential gaps fall back soft: an unresolved
//! customer makes the whole order total 0, an unresolved bahan makes that
//! item contribute 0. These are display-computation fallbacks, not errors.

use crate::models::{Bahan, Catalog, CustomerLevel, Order, OrderItem, PaymentStatus};

/// Bahan price column for a customer tier. Unknown tiers price at 0.
pub fn unit_price(bahan: &Bahan, level: CustomerLevel) -> f64 {
    match level {
        CustomerLevel::EndCustomer => bahan.harga_end_customer,
        CustomerLevel::Retail => bahan.harga_retail,
        CustomerLevel::Grosir => bahan.harga_grosir,
        CustomerLevel::Reseller => bahan.harga_reseller,
        CustomerLevel::Corporate => bahan.harga_corporate,
        CustomerLevel::Unknown => 0.0,
    }
}

/// Billable area of an item: `panjang * lebar` when both are present and
/// strictly positive, else 1 (a flat-fee unit item).
pub fn item_area(item: &OrderItem) -> f64 {
    match (item.panjang, item.lebar) {
        (Some(p), Some(l)) if p > 0.0 && l > 0.0 => p * l,
        _ => 1.0,
    }
}

pub fn item_subtotal(item: &OrderItem, bahan: &Bahan, level: CustomerLevel) -> f64 {
    unit_price(bahan, level) * item_area(item) * item.qty
}

/// Total billable amount of an order against the catalog snapshot.
pub fn order_total(order: &Order, catalog: &Catalog) -> f64 {
    let Some(customer) = catalog.customer(&order.customer_id) else {
        return 0.0;
    };
    order
        .order_items
        .iter()
        .map(|item| {
            catalog
                .bahan(&item.bahan_id)
                .map(|bahan| item_subtotal(item, bahan, customer.level))
                .unwrap_or(0.0)
        })
        .sum()
}

/// Sum of all recorded payments.
pub fn total_paid(order: &Order) -> f64 {
    order.payments.iter().map(|p| p.amount).sum()
}

/// Outstanding balance, floored at zero.
pub fn balance_due(order: &Order, catalog: &Catalog) -> f64 {
    (order_total(order, catalog) - total_paid(order)).max(0.0)
}

/// Payment status as a pure function of totals: paid in full or not.
pub fn derive_payment_status(total_bill: f64, total_paid: f64) -> PaymentStatus {
    if total_paid >= total_bill {
        PaymentStatus::Lunas
    } else {
        PaymentStatus::BelumLunas
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, OrderStatus, ProductionStatus};
    use chrono::Utc;

    fn bahan(id: &str, retail: f64) -> Bahan {
        Bahan {
            id: id.to_string(),
            name: format!("Bahan {id}"),
            harga_end_customer: retail + 5_000.0,
            harga_retail: retail,
            harga_grosir: retail - 2_000.0,
            harga_reseller: retail - 3_000.0,
            harga_corporate: retail - 1_000.0,
            stock_qty: 100.0,
            satuan: Some("m2".to_string()),
        }
    }

    fn customer(id: &str, level: CustomerLevel) -> Customer {
        Customer {
            id: id.to_string(),
            name: "Test".to_string(),
            phone: None,
            level,
        }
    }

    fn item(bahan_id: &str, panjang: Option<f64>, lebar: Option<f64>, qty: f64) -> OrderItem {
        OrderItem {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: "o-1".to_string(),
            bahan_id: bahan_id.to_string(),
            finishing_id: None,
            panjang,
            lebar,
            qty,
            status: ProductionStatus::Pending,
            keterangan: None,
            created_at: Utc::now(),
        }
    }

    fn order(customer_id: &str, items: Vec<OrderItem>) -> Order {
        Order {
            id: "o-1".to_string(),
            customer_id: customer_id.to_string(),
            no_nota: "NOTA-001".to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::BelumLunas,
            assignee_id: None,
            created_at: Utc::now(),
            order_items: items,
            payments: Vec::new(),
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            customers: vec![
                customer("c-retail", CustomerLevel::Retail),
                customer("c-unknown", CustomerLevel::Unknown),
            ],
            bahans: vec![bahan("b-1", 10_000.0), bahan("b-2", 20_000.0)],
            finishings: Vec::new(),
        }
    }

    #[test]
    fn test_area_defaults_to_one_without_both_dimensions() {
        assert_eq!(item_area(&item("b-1", Some(0.0), Some(5.0), 1.0)), 1.0);
        assert_eq!(item_area(&item("b-1", None, Some(5.0), 1.0)), 1.0);
        assert_eq!(item_area(&item("b-1", Some(3.0), Some(2.0), 1.0)), 6.0);
    }

    #[test]
    fn test_order_total_basic() {
        let catalog = catalog();
        // 10_000 * 6 m2 * 2 pcs + 20_000 * 1 (unit item) * 3 pcs
        let order = order(
            "c-retail",
            vec![
                item("b-1", Some(3.0), Some(2.0), 2.0),
                item("b-2", None, None, 3.0),
            ],
        );
        assert_eq!(order_total(&order, &catalog), 180_000.0);
    }

    #[test]
    fn test_order_total_invariant_under_item_reordering() {
        let catalog = catalog();
        let a = item("b-1", Some(3.0), Some(2.0), 2.0);
        let b = item("b-2", None, None, 3.0);
        let forward = order("c-retail", vec![a.clone(), b.clone()]);
        let backward = order("c-retail", vec![b, a]);
        assert_eq!(
            order_total(&forward, &catalog),
            order_total(&backward, &catalog)
        );
    }

    #[test]
    fn test_unresolved_customer_totals_zero() {
        let catalog = catalog();
        let order = order("c-missing", vec![item("b-1", Some(3.0), Some(2.0), 2.0)]);
        assert_eq!(order_total(&order, &catalog), 0.0);
    }

    #[test]
    fn test_unresolved_bahan_is_skipped() {
        let catalog = catalog();
        let order = order(
            "c-retail",
            vec![
                item("b-ghost", Some(3.0), Some(2.0), 2.0),
                item("b-1", None, None, 1.0),
            ],
        );
        assert_eq!(order_total(&order, &catalog), 10_000.0);
    }

    #[test]
    fn test_unknown_tier_prices_zero() {
        let catalog = catalog();
        let order = order("c-unknown", vec![item("b-1", Some(3.0), Some(2.0), 2.0)]);
        assert_eq!(order_total(&order, &catalog), 0.0);
    }

    #[test]
    fn test_derive_payment_status_boundary() {
        assert_eq!(
            derive_payment_status(100.0, 99.99),
            PaymentStatus::BelumLunas
        );
        assert_eq!(derive_payment_status(100.0, 100.0), PaymentStatus::Lunas);
        assert_eq!(derive_payment_status(100.0, 150.0), PaymentStatus::Lunas);
    }
}
