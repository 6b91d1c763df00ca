//! Order lifecycle and pricing rules.
//!
//! These exercise the status machine and the pricing pipeline the order
//! endpoints run, without a database.

use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use la_artesa_api::models::{Product, Settings};
use la_artesa_api::services::OrderError;
use la_artesa_api::services::orders::{
    OrderItem, check_delivery_date, merge_items, price_order,
};
use la_artesa_core::{Money, MoneyError, OrderStatus, PaymentStatus, ProductId};

fn money(s: &str) -> Money {
    Money::new(Decimal::from_str(s).unwrap()).unwrap()
}

fn product(id: i32, price: &str, active: bool) -> Product {
    Product {
        id: ProductId::new(id),
        sap_code: None,
        name: format!("Producto {id}"),
        description: String::new(),
        category: "panaderia".to_owned(),
        unit: "und".to_owned(),
        price: money(price),
        stock: 100,
        is_active: active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn item(id: i32, quantity: i64) -> OrderItem {
    OrderItem {
        product_id: ProductId::new(id),
        quantity,
    }
}

// =============================================================================
// Status Machine
// =============================================================================

const ALL: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::InProduction,
    OrderStatus::Dispatched,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
];

#[test]
fn test_happy_path_walks_every_status() {
    let path = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::InProduction,
        OrderStatus::Dispatched,
        OrderStatus::Delivered,
    ];
    for pair in path.windows(2) {
        let [from, to] = pair else { unreachable!() };
        assert!(from.can_transition_to(*to), "{from} -> {to}");
    }
}

#[test]
fn test_terminal_statuses_have_no_exits() {
    for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
        assert!(terminal.is_terminal());
        for next in ALL {
            assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
        }
    }
}

#[test]
fn test_cancellation_only_before_production() {
    let cancellable: Vec<OrderStatus> = ALL
        .into_iter()
        .filter(|s| s.can_transition_to(OrderStatus::Cancelled))
        .collect();
    assert_eq!(cancellable, [OrderStatus::Pending, OrderStatus::Confirmed]);
}

#[test]
fn test_no_status_skips_or_loops() {
    assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Dispatched));
    assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
    for status in ALL {
        assert!(!status.can_transition_to(status), "{status} -> {status}");
    }
}

#[test]
fn test_status_strings_round_trip() {
    for status in ALL {
        assert_eq!(OrderStatus::from_str(status.as_str()).unwrap(), status);
    }
    assert_eq!(
        PaymentStatus::from_str("approved").unwrap(),
        PaymentStatus::Approved
    );
}

// =============================================================================
// Pricing
// =============================================================================

#[test]
fn test_price_order_with_tax() {
    let catalog = [product(1, "2500.00", true), product(2, "4800.50", true)];
    let lines = merge_items(&[item(1, 10), item(2, 2), item(1, 2)]).unwrap();
    assert_eq!(lines, [(ProductId::new(1), 12), (ProductId::new(2), 2)]);

    let priced = price_order(&lines, &catalog, &Settings::default()).unwrap();
    assert_eq!(priced.subtotal, money("39601.00"));
    assert_eq!(priced.tax, money("7524.19"));
    assert_eq!(priced.total, money("47125.19"));
}

#[test]
fn test_inactive_products_are_unavailable() {
    let catalog = [product(1, "2500.00", true), product(2, "3000.00", false)];
    let lines = merge_items(&[item(1, 1), item(2, 1), item(3, 1)]).unwrap();

    match price_order(&lines, &catalog, &Settings::default()) {
        Err(OrderError::ProductUnavailable(ids)) => {
            assert_eq!(ids, [ProductId::new(2), ProductId::new(3)]);
        }
        other => panic!("expected ProductUnavailable, got {other:?}"),
    }
}

#[test]
fn test_minimum_order_amount() {
    let catalog = [product(1, "2500.00", true)];
    let settings = Settings {
        min_order_amount: money("50000"),
        ..Settings::default()
    };
    let lines = merge_items(&[item(1, 4)]).unwrap();

    assert!(matches!(
        price_order(&lines, &catalog, &settings),
        Err(OrderError::BelowMinimum { .. })
    ));
}

#[test]
fn test_totals_beyond_column_range_are_rejected() {
    let catalog = [product(1, "2000000.00", true)];
    let lines = merge_items(&[item(1, 10_000)]).unwrap();

    assert!(matches!(
        price_order(&lines, &catalog, &Settings::default()),
        Err(OrderError::Money(MoneyError::Overflow))
    ));

    // Subtotal fits, subtotal plus tax does not
    let catalog = [product(1, "900000.00", true)];
    let lines = merge_items(&[item(1, 10_000)]).unwrap();
    assert!(matches!(
        price_order(&lines, &catalog, &Settings::default()),
        Err(OrderError::Money(MoneyError::Overflow))
    ));
}

#[test]
fn test_delivery_lead_time() {
    let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
    assert!(check_delivery_date(None, today, 2).is_ok());
    assert!(check_delivery_date(NaiveDate::from_ymd_opt(2026, 5, 12), today, 2).is_ok());
    assert!(matches!(
        check_delivery_date(NaiveDate::from_ymd_opt(2026, 5, 11), today, 2),
        Err(OrderError::DeliveryTooSoon { .. })
    ));
}
