use std::collections::HashSet;
use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::models::{TransactionRecord, TransactionStatus};

/// Rounding slack allowed between a supplied total and quantity x price - discount.
const TOTAL_TOLERANCE: f64 = 0.01 + 1e-9;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    time: String,
    transaction_id: String,
    #[serde(default)]
    product_name: String,
    quantity: f64,
    unit_price: f64,
    #[serde(default)]
    total_amount: Option<f64>,
    #[serde(default)]
    discount_amount: Option<f64>,
    #[serde(default)]
    payment_method: String,
    #[serde(default)]
    staff_id: String,
    status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub line: u64,
    pub reason: RecordError,
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub records: Vec<TransactionRecord>,
    pub rejected: Vec<RejectedRecord>,
}

pub fn read_csv(csv_path: &Path) -> anyhow::Result<IngestOutcome> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let outcome = read_from(file)
        .with_context(|| format!("failed to read transactions from {}", csv_path.display()))?;
    info!(
        path = %csv_path.display(),
        accepted = outcome.records.len(),
        rejected = outcome.rejected.len(),
        "loaded transactions"
    );
    Ok(outcome)
}

/// Parses canonical transaction rows. A bad row is recorded and skipped; only
/// an unreadable header fails the whole batch.
pub fn read_from<R: io::Read>(source: R) -> Result<IngestOutcome, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();

    let mut outcome = IngestOutcome::default();
    let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();

    for result in reader.records() {
        let (line, parsed) = match result {
            Ok(row) => {
                let line = row.position().map_or(0, |p| p.line());
                let parsed = row
                    .deserialize::<CsvRow>(Some(&headers))
                    .map_err(|err| RecordError::Parse(err.to_string()))
                    .and_then(validate);
                (line, parsed)
            }
            Err(err) => (
                err.position().map_or(0, |p| p.line()),
                Err(RecordError::Parse(err.to_string())),
            ),
        };

        let accepted = parsed.and_then(|record| {
            if seen.insert((record.date, record.transaction_id.clone())) {
                Ok(record)
            } else {
                Err(RecordError::DuplicateTransaction {
                    id: record.transaction_id,
                    date: record.date,
                })
            }
        });

        match accepted {
            Ok(record) => outcome.records.push(record),
            Err(reason) => {
                warn!(line, %reason, "rejected transaction row");
                outcome.rejected.push(RejectedRecord { line, reason });
            }
        }
    }

    debug!(accepted = outcome.records.len(), "parsed csv rows");
    Ok(outcome)
}

fn validate(row: CsvRow) -> Result<TransactionRecord, RecordError> {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|_| RecordError::Parse(format!("invalid date {:?}", row.date)))?;
    let time = parse_time(&row.time)?;
    let status = parse_status(&row.status)?;

    if row.transaction_id.is_empty() {
        return Err(RecordError::Parse("missing transaction_id".to_string()));
    }

    let discount = row.discount_amount.unwrap_or(0.0);
    for (field, value) in [
        ("quantity", row.quantity),
        ("unit_price", row.unit_price),
        ("discount_amount", discount),
    ] {
        if !value.is_finite() {
            return Err(RecordError::Parse(format!("{field} is not a number")));
        }
    }
    if row.quantity < 0.0 {
        return Err(RecordError::NegativeQuantity(row.quantity));
    }
    if row.quantity.fract() != 0.0 || row.quantity > f64::from(u32::MAX) {
        return Err(RecordError::Parse(format!(
            "quantity must be a whole number (got {})",
            row.quantity
        )));
    }
    if row.unit_price < 0.0 {
        return Err(RecordError::NegativeAmount {
            field: "unit_price",
            value: row.unit_price,
        });
    }
    if discount < 0.0 {
        return Err(RecordError::NegativeAmount {
            field: "discount_amount",
            value: discount,
        });
    }

    let gross = row.quantity * row.unit_price;
    if discount > gross + 1e-9 {
        return Err(RecordError::DiscountExceedsGross { discount, gross });
    }

    let expected = gross - discount;
    let total = row.total_amount.unwrap_or(expected);
    if !total.is_finite() {
        return Err(RecordError::Parse("total_amount is not a number".to_string()));
    }
    if total < 0.0 {
        return Err(RecordError::NegativeAmount {
            field: "total_amount",
            value: total,
        });
    }
    if (total - expected).abs() > TOTAL_TOLERANCE {
        return Err(RecordError::TotalMismatch { total, expected });
    }

    Ok(TransactionRecord {
        date,
        time,
        transaction_id: row.transaction_id,
        product_name: row.product_name,
        quantity: row.quantity as u32,
        unit_price: row.unit_price,
        total_amount: total,
        discount_amount: discount,
        payment_method: row.payment_method,
        staff_id: if row.staff_id.is_empty() {
            "unassigned".to_string()
        } else {
            row.staff_id
        },
        status,
    })
}

pub fn parse_status(value: &str) -> Result<TransactionStatus, RecordError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "completed" | "complete" | "sale" => Ok(TransactionStatus::Completed),
        "voided" | "void" | "cancelled" => Ok(TransactionStatus::Voided),
        "refunded" | "refund" | "returned" => Ok(TransactionStatus::Refunded),
        _ => Err(RecordError::UnknownStatus(value.to_string())),
    }
}

pub fn parse_time(value: &str) -> Result<NaiveTime, RecordError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| RecordError::BadTime(value.to_string()))
}
