//! Builders shared by the unit tests.

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::models::{DaySummary, ProductSales, TransactionRecord, TransactionStatus};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn record(date: NaiveDate, time: NaiveTime, id: &str, amount: f64) -> TransactionRecord {
    TransactionRecord {
        date,
        time,
        transaction_id: id.to_string(),
        product_name: "Paracetamol 500mg".to_string(),
        quantity: 1,
        unit_price: amount,
        total_amount: amount,
        discount_amount: 0.0,
        payment_method: "cash".to_string(),
        staff_id: "S-1".to_string(),
        status: TransactionStatus::Completed,
    }
}

/// A day with `count` equal completed sales of one product, spread one per
/// hour from 09:00.
pub fn day_summary(date: NaiveDate, revenue: f64, count: usize) -> DaySummary {
    let mut summary = DaySummary::empty(date);
    summary.no_activity = count == 0;
    summary.revenue = revenue;
    summary.transaction_count = count;
    summary.items_sold = count as u64;
    for index in 0..count {
        let hour = 9 + (index % 10) as u32;
        summary.hour_counts[hour as usize] += 1;
        summary.transaction_times.push(time(hour, 0));
    }
    summary.transaction_times.sort();
    if count > 0 {
        let each = revenue / count as f64;
        summary.sale_amounts = vec![each; count];
        summary.products.insert(
            "Paracetamol 500mg".to_string(),
            ProductSales {
                quantity: count as u64,
                revenue,
                lines: count as u32,
                unit_price_total: each * count as f64,
            },
        );
    }
    summary
}

/// One summary per revenue, on the same weekday as `today`, going back a week at a time.
pub fn weekly_history(today: NaiveDate, revenues: &[f64], count: usize) -> Vec<DaySummary> {
    revenues
        .iter()
        .enumerate()
        .map(|(index, revenue)| {
            day_summary(today - Duration::days(7 * (index as i64 + 1)), *revenue, count)
        })
        .collect()
}
