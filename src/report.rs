use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{FindingStatus, RiskReport, Severity, TransactionRecord};

pub fn requires_alert(report: &RiskReport, floor: Severity) -> bool {
    !report.no_activity && report.severity >= floor
}

pub fn render_markdown(report: &RiskReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Risk Report: {}", report.date);
    let _ = writeln!(
        output,
        "Risk score **{}/100** ({})",
        report.score,
        report.severity.as_str().to_uppercase()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "> {}", report.headline_action);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Signals");

    for contribution in &report.contributions {
        let state = match contribution.status {
            FindingStatus::Evaluated => format!(
                "{:.1} pts x {:.1} = {:.1}",
                contribution.points, contribution.weight, contribution.weighted_points
            ),
            FindingStatus::InsufficientData => "insufficient data".to_string(),
            FindingStatus::Error => "could not evaluate".to_string(),
        };
        let _ = writeln!(output, "- {}: {}", contribution.signal.label(), state);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Evidence");
    if report.evidence.is_empty() {
        let _ = writeln!(output, "No signal triggered for this day.");
    } else {
        for line in &report.evidence {
            let _ = writeln!(output, "- {line}");
        }
    }

    if !report.recommended_actions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recommended Actions");
        for (index, action) in report.recommended_actions.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", index + 1, action);
        }
    }

    let notes = unavailable_notes(report);
    if !notes.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Evaluated");
        for note in notes {
            let _ = writeln!(output, "- {note}");
        }
    }

    output
}

pub fn render_text(report: &RiskReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{}: score {}/100 ({})",
        report.date,
        report.score,
        report.severity.as_str().to_uppercase()
    );
    let _ = writeln!(output, "Action: {}", report.headline_action);
    for finding in report.triggered() {
        let _ = writeln!(output, "[{}] {:.0} pts", finding.signal, finding.points);
        for line in &finding.evidence {
            let _ = writeln!(output, "  {line}");
        }
    }
    for note in unavailable_notes(report) {
        let _ = writeln!(output, "(not evaluated) {note}");
    }

    output
}

/// Short plain-text message for whoever delivers owner notifications.
pub fn alert_message(report: &RiskReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "RISK ALERT {}", report.date);
    let _ = writeln!(
        output,
        "Score {}/100 ({})",
        report.score,
        report.severity.as_str().to_uppercase()
    );
    for line in report.evidence.iter().take(3) {
        let _ = writeln!(output, "- {line}");
    }
    let _ = writeln!(output, "Action: {}", report.headline_action);

    output
}

fn unavailable_notes(report: &RiskReport) -> Vec<String> {
    report
        .findings
        .iter()
        .filter(|finding| !finding.is_evaluated())
        .map(|finding| {
            let reason = finding.evidence.first().map_or("", String::as_str);
            format!("{}: {}", finding.signal.label(), reason)
        })
        .collect()
}

pub fn render_scan(reports: &[RiskReport], top: usize) -> String {
    let mut output = String::new();
    let mut distribution: BTreeMap<Severity, usize> = BTreeMap::new();
    for report in reports {
        *distribution.entry(report.severity).or_insert(0) += 1;
    }

    let _ = writeln!(output, "# Risk Scan");
    match (reports.first(), reports.last()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                output,
                "{} days assessed ({} to {})",
                reports.len(),
                first.date,
                last.date
            );
        }
        _ => {
            let _ = writeln!(output, "No days to assess.");
            return output;
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Distribution");
    for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
        let count = distribution.get(&severity).copied().unwrap_or(0);
        let _ = writeln!(output, "- {}: {}", severity.as_str().to_uppercase(), count);
    }

    let mut ranked: Vec<&RiskReport> = reports.iter().filter(|r| r.score > 0).collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.date.cmp(&b.date)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Days");
    if ranked.is_empty() {
        let _ = writeln!(output, "No day scored above zero.");
    }
    for report in ranked.iter().take(top) {
        let triggered: Vec<&str> = report.triggered().map(|f| f.signal.as_str()).collect();
        let _ = writeln!(
            output,
            "- {} score {} ({}) signals: {}",
            report.date,
            report.score,
            report.severity,
            if triggered.is_empty() {
                "none".to_string()
            } else {
                triggered.join(", ")
            }
        );
    }

    output
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductTotal {
    pub product_name: String,
    pub quantity: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaffTotal {
    pub staff_id: String,
    pub transactions: usize,
    pub revenue: f64,
    pub voids: usize,
}

/// Sales below this total count as small in the size distribution.
pub const SMALL_SALE: f64 = 10.0;

/// Completed sales bucketed by total: under [`SMALL_SALE`], up to the
/// high-value threshold, and at or above it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionSizes {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

impl TransactionSizes {
    fn total(&self) -> usize {
        self.small + self.medium + self.large
    }
}

/// Drill-down for one date, for whoever follows up on an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBreakdown {
    pub date: NaiveDate,
    pub products: Vec<ProductTotal>,
    pub staff: Vec<StaffTotal>,
    pub high_value: Vec<TransactionRecord>,
    pub sizes: TransactionSizes,
    /// Threshold used for both the high-value list and the top size band.
    pub high_value_threshold: f64,
}

pub fn day_breakdown(date: NaiveDate, records: &[TransactionRecord], high_value: f64) -> DayBreakdown {
    let mut products: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
    let mut staff: BTreeMap<&str, StaffTotal> = BTreeMap::new();
    let mut expensive = Vec::new();
    let mut sizes = TransactionSizes::default();

    for record in records.iter().filter(|record| record.date == date) {
        let entry = staff.entry(record.staff_id.as_str()).or_insert_with(|| StaffTotal {
            staff_id: record.staff_id.clone(),
            transactions: 0,
            revenue: 0.0,
            voids: 0,
        });

        if record.status.is_reversal() {
            entry.voids += 1;
            continue;
        }

        entry.transactions += 1;
        entry.revenue += record.total_amount;
        let product = products.entry(record.product_name.as_str()).or_insert((0, 0.0));
        product.0 += u64::from(record.quantity);
        product.1 += record.total_amount;
        if record.unit_price >= high_value {
            expensive.push(record.clone());
        }
        if record.total_amount < SMALL_SALE {
            sizes.small += 1;
        } else if record.total_amount < high_value {
            sizes.medium += 1;
        } else {
            sizes.large += 1;
        }
    }

    let mut products: Vec<ProductTotal> = products
        .into_iter()
        .map(|(name, (quantity, revenue))| ProductTotal {
            product_name: name.to_string(),
            quantity,
            revenue,
        })
        .collect();
    products.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

    let mut staff: Vec<StaffTotal> = staff.into_values().collect();
    staff.sort_by(|a, b| b.voids.cmp(&a.voids).then(b.revenue.total_cmp(&a.revenue)));

    expensive.sort_by(|a, b| a.time.cmp(&b.time));

    DayBreakdown {
        date,
        products,
        staff,
        high_value: expensive,
        sizes,
        high_value_threshold: high_value,
    }
}

pub fn render_breakdown(breakdown: &DayBreakdown, top: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Day Breakdown: {}", breakdown.date);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Products");
    if breakdown.products.is_empty() {
        let _ = writeln!(output, "No completed sales on this day.");
    }
    for product in breakdown.products.iter().take(top) {
        let _ = writeln!(
            output,
            "- {}: {} units, {:.2}",
            product.product_name, product.quantity, product.revenue
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Staff");
    for member in &breakdown.staff {
        let _ = writeln!(
            output,
            "- {}: {} sales, {:.2} revenue, {} voids/refunds",
            member.staff_id, member.transactions, member.revenue, member.voids
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Transaction Sizes");
    let sizes = &breakdown.sizes;
    let total = sizes.total().max(1) as f64;
    for (label, count) in [
        (format!("under {SMALL_SALE:.2}"), sizes.small),
        (
            format!("{SMALL_SALE:.2} to {:.2}", breakdown.high_value_threshold),
            sizes.medium,
        ),
        (
            format!("{:.2} and over", breakdown.high_value_threshold),
            sizes.large,
        ),
    ] {
        let _ = writeln!(
            output,
            "- {label}: {count} ({:.0}%)",
            count as f64 / total * 100.0
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## High-Value Items");
    if breakdown.high_value.is_empty() {
        let _ = writeln!(output, "None.");
    }
    for record in &breakdown.high_value {
        let _ = writeln!(
            output,
            "- {} {} x{} at {:.2} ({}, staff {})",
            record.time.format("%H:%M"),
            record.product_name,
            record.quantity,
            record.unit_price,
            record.transaction_id,
            record.staff_id
        );
    }

    output
}
