use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate, Timelike, Weekday};

use crate::config::BaselineConfig;
use crate::models::{DaySummary, TransactionRecord, TransactionStatus, VoidEvent};
use crate::stats;

impl DaySummary {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday(),
            revenue: 0.0,
            transaction_count: 0,
            discount_total: 0.0,
            discount_rate: 0.0,
            items_sold: 0,
            void_count: 0,
            void_events: Vec::new(),
            transaction_times: Vec::new(),
            hour_counts: [0; 24],
            products: BTreeMap::new(),
            sale_amounts: Vec::new(),
            no_activity: true,
        }
    }

    pub fn total_events(&self) -> u32 {
        self.hour_counts.iter().sum()
    }

    /// Population variance of the 24 hourly transaction counts.
    pub fn velocity_variance(&self) -> f64 {
        let counts: Vec<f64> = self.hour_counts.iter().map(|c| *c as f64).collect();
        stats::variance(&counts)
    }

    pub fn hour_entropy(&self) -> f64 {
        stats::entropy(&self.hour_counts)
    }
}

/// Day Aggregator: folds one date's records into its summary. Records dated
/// elsewhere are ignored.
pub fn summarize_day(date: NaiveDate, records: &[TransactionRecord]) -> DaySummary {
    let mut summary = DaySummary::empty(date);

    for record in records.iter().filter(|record| record.date == date) {
        summary.no_activity = false;
        summary.transaction_times.push(record.time);
        summary.hour_counts[record.time.hour() as usize] += 1;

        match record.status {
            TransactionStatus::Completed => {
                summary.revenue += record.total_amount;
                summary.discount_total += record.discount_amount;
                summary.transaction_count += 1;
                summary.items_sold += u64::from(record.quantity);
                summary.sale_amounts.push(record.total_amount);
                let product = summary
                    .products
                    .entry(record.product_name.clone())
                    .or_default();
                product.quantity += u64::from(record.quantity);
                product.revenue += record.total_amount;
                product.lines += 1;
                product.unit_price_total += record.unit_price;
            }
            TransactionStatus::Voided | TransactionStatus::Refunded => {
                summary.void_count += 1;
                summary.void_events.push(VoidEvent {
                    time: record.time,
                    staff_id: record.staff_id.clone(),
                    status: record.status,
                });
            }
        }
    }

    let gross = summary.revenue + summary.discount_total;
    if gross > 0.0 {
        summary.discount_rate = summary.discount_total / gross;
    }
    summary.transaction_times.sort();
    summary.sale_amounts.sort_by(|a, b| a.total_cmp(b));
    summary.void_events.sort_by(|a, b| a.time.cmp(&b.time));
    summary
}

/// Summaries for every date that has at least one record.
pub fn summarize_all(records: &[TransactionRecord]) -> BTreeMap<NaiveDate, DaySummary> {
    let mut by_date: BTreeMap<NaiveDate, Vec<TransactionRecord>> = BTreeMap::new();
    for record in records {
        by_date.entry(record.date).or_default().push(record.clone());
    }

    by_date
        .into_iter()
        .map(|(date, day_records)| (date, summarize_day(date, &day_records)))
        .collect()
}

/// First day of a window reaching `days` back from `date`. Spans too large
/// for the calendar start at the earliest representable date.
pub fn window_start(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|span| date.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

/// Qualifying baseline days for one evaluation date.
#[derive(Debug, Clone)]
pub struct History<'a> {
    pub date: NaiveDate,
    pub days: Vec<&'a DaySummary>,
    pub excluded_flagged: usize,
}

impl<'a> History<'a> {
    /// Keeps days strictly before `date`, within the lookback window, with
    /// activity, and not previously flagged.
    pub fn build(
        date: NaiveDate,
        summaries: &'a BTreeMap<NaiveDate, DaySummary>,
        flagged: &BTreeSet<NaiveDate>,
        config: &BaselineConfig,
    ) -> Self {
        let start = window_start(date, config.lookback_days);
        let mut days = Vec::new();
        let mut excluded_flagged = 0;

        for (day, summary) in summaries.range(start..date) {
            if summary.no_activity {
                continue;
            }
            if flagged.contains(day) {
                excluded_flagged += 1;
                continue;
            }
            days.push(summary);
        }

        Self {
            date,
            days,
            excluded_flagged,
        }
    }

    #[cfg(test)]
    pub fn from_days(date: NaiveDate, days: Vec<&'a DaySummary>) -> Self {
        Self {
            date,
            days: days.into_iter().filter(|day| day.date < date).collect(),
            excluded_flagged: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    /// Baseline days no older than `days` before the evaluation date.
    pub fn recent(&self, days: i64) -> Vec<&'a DaySummary> {
        let start = window_start(self.date, days);
        self.days.iter().copied().filter(|day| day.date >= start).collect()
    }

    /// Same-weekday days when `same_weekday` is set, otherwise the whole window.
    pub fn comparable(&self, same_weekday: bool) -> Vec<&'a DaySummary> {
        let weekday = self.weekday();
        self.days
            .iter()
            .copied()
            .filter(|day| !same_weekday || day.weekday == weekday)
            .collect()
    }
}
