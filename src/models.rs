use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Voided,
    Refunded,
}

impl TransactionStatus {
    pub fn is_reversal(&self) -> bool {
        matches!(self, TransactionStatus::Voided | TransactionStatus::Refunded)
    }
}

/// One validated point-of-sale transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub transaction_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_amount: f64,
    pub discount_amount: f64,
    pub payment_method: String,
    pub staff_id: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidEvent {
    pub time: NaiveTime,
    pub staff_id: String,
    pub status: TransactionStatus,
}

/// Completed sales of one product on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductSales {
    pub quantity: u64,
    pub revenue: f64,
    pub lines: u32,
    pub unit_price_total: f64,
}

impl ProductSales {
    pub fn average_unit_price(&self) -> f64 {
        if self.lines == 0 {
            0.0
        } else {
            self.unit_price_total / f64::from(self.lines)
        }
    }
}

/// Derived per-day metrics. Rebuilt wholesale from the day's records, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub revenue: f64,
    pub transaction_count: usize,
    pub discount_total: f64,
    /// discount / (revenue + discount); zero when nothing was sold.
    pub discount_rate: f64,
    pub items_sold: u64,
    pub void_count: usize,
    /// Sorted by time.
    pub void_events: Vec<VoidEvent>,
    /// Every record's time, sorted.
    pub transaction_times: Vec<NaiveTime>,
    pub hour_counts: [u32; 24],
    /// Completed sales keyed by product name.
    pub products: BTreeMap<String, ProductSales>,
    /// Totals of completed transactions, ascending.
    pub sale_amounts: Vec<f64>,
    pub no_activity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    DailySales,
    Velocity,
    Discount,
    VoidRefund,
    TimeOfDay,
    Outlier,
    HighValue,
    ProductMix,
}

impl SignalKind {
    pub const ALL: [SignalKind; 8] = [
        SignalKind::DailySales,
        SignalKind::Velocity,
        SignalKind::Discount,
        SignalKind::VoidRefund,
        SignalKind::TimeOfDay,
        SignalKind::Outlier,
        SignalKind::HighValue,
        SignalKind::ProductMix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::DailySales => "daily_sales",
            SignalKind::Velocity => "velocity",
            SignalKind::Discount => "discount",
            SignalKind::VoidRefund => "void_refund",
            SignalKind::TimeOfDay => "time_of_day",
            SignalKind::Outlier => "outlier",
            SignalKind::HighValue => "high_value",
            SignalKind::ProductMix => "product_mix",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::DailySales => "Daily sales",
            SignalKind::Velocity => "Transaction velocity",
            SignalKind::Discount => "Discount pattern",
            SignalKind::VoidRefund => "Void/refund clustering",
            SignalKind::TimeOfDay => "Time of day",
            SignalKind::Outlier => "Multivariate outlier",
            SignalKind::HighValue => "High-value products",
            SignalKind::ProductMix => "Product mix",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Evaluated,
    InsufficientData,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFinding {
    pub signal: SignalKind,
    pub points: f64,
    pub triggered: bool,
    pub evidence: Vec<String>,
    pub status: FindingStatus,
}

impl SignalFinding {
    pub fn insufficient(signal: SignalKind, reason: impl Into<String>) -> Self {
        Self {
            signal,
            points: 0.0,
            triggered: false,
            evidence: vec![reason.into()],
            status: FindingStatus::InsufficientData,
        }
    }

    pub fn error(signal: SignalKind, reason: impl Into<String>) -> Self {
        Self {
            signal,
            points: 0.0,
            triggered: false,
            evidence: vec![reason.into()],
            status: FindingStatus::Error,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.status == FindingStatus::Evaluated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn rank(&self) -> i32 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw and weighted points a signal put into the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub signal: SignalKind,
    pub status: FindingStatus,
    pub points: f64,
    pub weight: f64,
    pub weighted_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub date: NaiveDate,
    pub score: u8,
    pub severity: Severity,
    /// Triggered findings first by descending weighted contribution, then the rest.
    pub findings: Vec<SignalFinding>,
    pub contributions: Vec<SignalContribution>,
    pub evidence: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub headline_action: String,
    pub could_not_evaluate: Vec<SignalKind>,
    pub insufficient_history: bool,
    pub no_activity: bool,
}

impl RiskReport {
    pub fn triggered(&self) -> impl Iterator<Item = &SignalFinding> {
        self.findings.iter().filter(|finding| finding.triggered)
    }
}
