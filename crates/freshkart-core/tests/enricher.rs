use freshkart_core::cleaner::clean;
use freshkart_core::enricher::{enrich, EnrichedData};
use freshkart_core::frames::{
    self, CITY, GROSS_REVENUE, LINE_TOTAL, NET_REVENUE, ORDER_ID, REFUNDS_AMOUNT,
};
use freshkart_core::model::{Customer, Order, OrderLine, Refund};
use freshkart_core::sources::expand_items;
use polars::prelude::*;

fn customer(id: &str, city: &str, is_active: bool) -> Customer {
    Customer {
        customer_id: id.to_string(),
        city: city.to_string(),
        is_active,
    }
}

fn line(qty: i64, unit_price: f64) -> OrderLine {
    OrderLine {
        qty,
        unit_price,
        attributes: Default::default(),
    }
}

fn paid_order(id: &str, customer_id: &str, items: Vec<OrderLine>) -> Order {
    Order {
        order_id: id.to_string(),
        customer_id: customer_id.to_string(),
        channel: "web".to_string(),
        created_at: "2024-01-15T10:00:00".to_string(),
        payment_status: "paid".to_string(),
        items,
    }
}

fn refund(order_id: &str, amount: f64) -> Refund {
    Refund {
        order_id: order_id.to_string(),
        amount,
    }
}

fn run_enrichment(
    customers: &[Customer],
    orders: &[Order],
    refunds: &[Refund],
) -> PolarsResult<EnrichedData> {
    let cleaned = clean(
        &frames::customers_frame(customers)?,
        &frames::orders_frame(orders)?,
        &frames::items_frame(&expand_items(orders))?,
    )?;
    enrich(
        &cleaned.valid_items,
        &cleaned.customers,
        &cleaned.orders,
        &frames::refunds_frame(refunds)?,
    )
}

/// Reads `column` for the row whose order_id is `order_id`.
fn value_for(df: &DataFrame, order_id: &str, column: &str) -> PolarsResult<Option<f64>> {
    let ids = df.column(ORDER_ID)?.str()?;
    let values = df.column(column)?.f64()?;
    Ok((0..df.height())
        .find(|idx| ids.get(*idx) == Some(order_id))
        .and_then(|idx| values.get(idx)))
}

fn order_ids(df: &DataFrame) -> PolarsResult<Vec<String>> {
    Ok(df
        .column(ORDER_ID)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

#[test]
fn computes_gross_and_net_without_refunds() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true)],
        &[paid_order("O1", "C1", vec![line(2, 10.0), line(1, -5.0)])],
        &[],
    )?;

    assert_eq!(enriched.items.height(), 1);
    assert_eq!(enriched.items.column(CITY)?.str()?.get(0), Some("Paris"));
    assert_eq!(enriched.items.column(LINE_TOTAL)?.f64()?.get(0), Some(20.0));

    let revenue = &enriched.order_revenue;
    assert_eq!(order_ids(revenue)?, vec!["O1"]);
    assert_eq!(value_for(revenue, "O1", GROSS_REVENUE)?, Some(20.0));
    assert_eq!(value_for(revenue, "O1", REFUNDS_AMOUNT)?, Some(0.0));
    assert_eq!(value_for(revenue, "O1", NET_REVENUE)?, Some(20.0));
    Ok(())
}

#[test]
fn matching_refund_reduces_net_revenue() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true)],
        &[paid_order("O1", "C1", vec![line(2, 10.0), line(1, -5.0)])],
        &[refund("O1", -5.0)],
    )?;

    let revenue = &enriched.order_revenue;
    assert_eq!(value_for(revenue, "O1", REFUNDS_AMOUNT)?, Some(-5.0));
    assert_eq!(value_for(revenue, "O1", NET_REVENUE)?, Some(15.0));
    Ok(())
}

#[test]
fn inactive_customer_orders_disappear_silently() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true), customer("C2", "Lyon", false)],
        &[
            paid_order("O1", "C1", vec![line(1, 4.0)]),
            paid_order("O2", "C2", vec![line(3, 9.0)]),
            paid_order("O3", "C404", vec![line(1, 1.0)]),
        ],
        &[refund("O2", -9.0)],
    )?;

    assert_eq!(order_ids(&enriched.order_revenue)?, vec!["O1"]);
    assert_eq!(order_ids(&enriched.items)?, vec!["O1"]);
    assert_eq!(enriched.unmatched_customer_items, 2);
    Ok(())
}

#[test]
fn refunds_outside_the_day_are_ignored_and_matches_are_summed() -> PolarsResult<()> {
    let customers = [customer("C1", "Paris", true)];
    let orders = [
        paid_order("O1", "C1", vec![line(1, 30.0)]),
        paid_order("O2", "C1", vec![line(1, 12.5)]),
    ];

    let baseline = run_enrichment(&customers, &orders, &[refund("O1", -2.0), refund("O1", -3.0)])?;
    let with_foreign = run_enrichment(
        &customers,
        &orders,
        &[
            refund("O1", -2.0),
            refund("O99", -100.0),
            refund("O1", -3.0),
            refund("OLD-7", -40.0),
        ],
    )?;

    assert!(baseline.order_revenue.equals(&with_foreign.order_revenue));
    assert_eq!(value_for(&with_foreign.order_revenue, "O1", REFUNDS_AMOUNT)?, Some(-5.0));
    assert_eq!(value_for(&with_foreign.order_revenue, "O1", NET_REVENUE)?, Some(25.0));
    assert_eq!(value_for(&with_foreign.order_revenue, "O2", REFUNDS_AMOUNT)?, Some(0.0));
    assert_eq!(value_for(&with_foreign.order_revenue, "O2", NET_REVENUE)?, Some(12.5));
    Ok(())
}

#[test]
fn refund_sign_is_not_validated() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true)],
        &[paid_order("O1", "C1", vec![line(2, 10.0)])],
        &[refund("O1", 4.0)],
    )?;

    assert_eq!(value_for(&enriched.order_revenue, "O1", NET_REVENUE)?, Some(24.0));
    Ok(())
}

#[test]
fn items_of_a_discarded_duplicate_order_record_are_excluded() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true)],
        &[
            paid_order("O1", "C1", vec![line(2, 10.0)]),
            paid_order("O1", "C1", vec![line(5, 10.0)]),
        ],
        &[],
    )?;

    assert_eq!(value_for(&enriched.order_revenue, "O1", GROSS_REVENUE)?, Some(20.0));
    assert_eq!(enriched.duplicate_order_items, 1);
    Ok(())
}

#[test]
fn gross_revenue_is_the_sum_of_line_totals() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[customer("C1", "Paris", true), customer("C2", "Lyon", true)],
        &[
            paid_order("O1", "C1", vec![line(2, 1.25), line(3, 2.0), line(0, 99.0)]),
            paid_order("O2", "C2", vec![line(1, 0.0)]),
        ],
        &[],
    )?;

    let items = &enriched.items;
    let ids = items.column(ORDER_ID)?.str()?;
    let totals = items.column(LINE_TOTAL)?.f64()?;
    for order_id in ["O1", "O2"] {
        let expected: f64 = (0..items.height())
            .filter(|idx| ids.get(*idx) == Some(order_id))
            .filter_map(|idx| totals.get(idx))
            .sum();
        assert_eq!(
            value_for(&enriched.order_revenue, order_id, GROSS_REVENUE)?,
            Some(expected)
        );
    }
    assert_eq!(value_for(&enriched.order_revenue, "O1", GROSS_REVENUE)?, Some(8.5));
    Ok(())
}

#[test]
fn repeated_customer_rows_do_not_break_drop_counts() -> PolarsResult<()> {
    let enriched = run_enrichment(
        &[
            customer("C1", "Paris", true),
            customer("C1", "Paris", true),
            customer("C2", "Lyon", false),
        ],
        &[
            paid_order("O1", "C1", vec![line(2, 10.0)]),
            paid_order("O2", "C2", vec![line(1, 3.0)]),
        ],
        &[],
    )?;

    assert_eq!(enriched.unmatched_customer_items, 1);
    assert_eq!(enriched.duplicate_order_items, 0);
    assert_eq!(order_ids(&enriched.order_revenue)?, vec!["O1"]);
    Ok(())
}
