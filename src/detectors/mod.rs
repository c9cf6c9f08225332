//! The fixed set of signal detectors.
//!
//! Each detector reads the same baseline window and the day under review and
//! produces exactly one [`SignalFinding`]. Detectors share no state, so the
//! engine may run them in any order or concurrently.

pub mod daily_sales;
pub mod discount;
pub mod high_value;
pub mod outlier;
pub mod product_mix;
pub mod time_of_day;
pub mod velocity;
pub mod void_refund;

use chrono::Weekday;

use crate::config::EngineConfig;
use crate::error::DetectorError;
use crate::models::{DaySummary, FindingStatus, SignalFinding, SignalKind};
use crate::summary::History;

pub use daily_sales::DailySalesDetector;
pub use discount::DiscountDetector;
pub use high_value::HighValueDetector;
pub use outlier::OutlierDetector;
pub use product_mix::ProductMixDetector;
pub use time_of_day::TimeOfDayDetector;
pub use velocity::VelocityDetector;
pub use void_refund::VoidRefundDetector;

/// What a detector concluded before points are capped.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub points: f64,
    pub triggered: bool,
    pub evidence: Vec<String>,
}

impl Assessment {
    pub fn quiet(evidence: impl Into<String>) -> Self {
        Self {
            points: 0.0,
            triggered: false,
            evidence: vec![evidence.into()],
        }
    }
}

#[derive(Debug, Clone)]
pub enum Detector {
    DailySales(DailySalesDetector),
    Velocity(VelocityDetector),
    Discount(DiscountDetector),
    VoidRefund(VoidRefundDetector),
    TimeOfDay(TimeOfDayDetector),
    Outlier(OutlierDetector),
    HighValue(HighValueDetector),
    ProductMix(ProductMixDetector),
}

impl Detector {
    /// One detector per [`SignalKind`], in canonical order.
    pub fn standard_set(config: &EngineConfig) -> Vec<Detector> {
        SignalKind::ALL
            .iter()
            .map(|kind| Detector::for_kind(*kind, config))
            .collect()
    }

    pub fn for_kind(kind: SignalKind, config: &EngineConfig) -> Detector {
        match kind {
            SignalKind::DailySales => Detector::DailySales(DailySalesDetector::new(config)),
            SignalKind::Velocity => Detector::Velocity(VelocityDetector::new(config)),
            SignalKind::Discount => Detector::Discount(DiscountDetector::new(config)),
            SignalKind::VoidRefund => Detector::VoidRefund(VoidRefundDetector::new(config)),
            SignalKind::TimeOfDay => Detector::TimeOfDay(TimeOfDayDetector::new(config)),
            SignalKind::Outlier => Detector::Outlier(OutlierDetector::new(config)),
            SignalKind::HighValue => Detector::HighValue(HighValueDetector::new(config)),
            SignalKind::ProductMix => Detector::ProductMix(ProductMixDetector::new(config)),
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Detector::DailySales(_) => SignalKind::DailySales,
            Detector::Velocity(_) => SignalKind::Velocity,
            Detector::Discount(_) => SignalKind::Discount,
            Detector::VoidRefund(_) => SignalKind::VoidRefund,
            Detector::TimeOfDay(_) => SignalKind::TimeOfDay,
            Detector::Outlier(_) => SignalKind::Outlier,
            Detector::HighValue(_) => SignalKind::HighValue,
            Detector::ProductMix(_) => SignalKind::ProductMix,
        }
    }

    fn cap(&self) -> f64 {
        match self {
            Detector::DailySales(d) => d.cap,
            Detector::Velocity(d) => d.cap,
            Detector::Discount(d) => d.cap,
            Detector::VoidRefund(d) => d.cap,
            Detector::TimeOfDay(d) => d.cap,
            Detector::Outlier(d) => d.cap,
            Detector::HighValue(d) => d.cap,
            Detector::ProductMix(d) => d.cap,
        }
    }

    pub fn evaluate(&self, history: &History<'_>, day: &DaySummary) -> SignalFinding {
        let kind = self.kind();
        if day.no_activity {
            return SignalFinding::insufficient(
                kind,
                format!("no transactions recorded on {}", day.date),
            );
        }

        let result = match self {
            Detector::DailySales(d) => d.assess(history, day),
            Detector::Velocity(d) => d.assess(history, day),
            Detector::Discount(d) => d.assess(history, day),
            Detector::VoidRefund(d) => d.assess(day),
            Detector::TimeOfDay(d) => d.assess(history, day),
            Detector::Outlier(d) => d.assess(history, day),
            Detector::HighValue(d) => d.assess(history, day),
            Detector::ProductMix(d) => d.assess(history, day),
        };

        into_finding(kind, result, self.cap())
    }
}

fn into_finding(
    kind: SignalKind,
    result: Result<Assessment, DetectorError>,
    cap: f64,
) -> SignalFinding {
    match result {
        Ok(assessment) if !assessment.points.is_finite() => SignalFinding::error(
            kind,
            DetectorError::InvalidInput(format!("non-finite points {}", assessment.points))
                .to_string(),
        ),
        Ok(assessment) => SignalFinding {
            signal: kind,
            points: assessment.points.clamp(0.0, cap),
            triggered: assessment.triggered,
            evidence: assessment.evidence,
            status: FindingStatus::Evaluated,
        },
        Err(DetectorError::InsufficientData(reason)) => SignalFinding::insufficient(kind, reason),
        Err(err) => SignalFinding::error(kind, err.to_string()),
    }
}

pub(crate) fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, day_summary, weekly_history};

    #[test]
    fn standard_set_covers_every_signal_once() {
        let detectors = Detector::standard_set(&EngineConfig::default());
        let kinds: Vec<SignalKind> = detectors.iter().map(Detector::kind).collect();
        assert_eq!(kinds, SignalKind::ALL.to_vec());
    }

    #[test]
    fn zero_activity_day_is_insufficient_for_every_detector() {
        let today = date(2025, 9, 15);
        let days = weekly_history(today, &[1200.0; 12], 20);
        let history = History::from_days(today, days.iter().collect());
        let empty = DaySummary::empty(today);

        for detector in Detector::standard_set(&EngineConfig::default()) {
            let finding = detector.evaluate(&history, &empty);
            assert_eq!(finding.status, FindingStatus::InsufficientData);
            assert_eq!(finding.points, 0.0);
            assert!(!finding.triggered);
        }
    }

    #[test]
    fn day_matching_baseline_scores_zero_everywhere() {
        let today = date(2025, 9, 15);
        let days = weekly_history(today, &[1200.0; 12], 20);
        let history = History::from_days(today, days.iter().collect());
        let current = day_summary(today, 1200.0, 20);

        for detector in Detector::standard_set(&EngineConfig::default()) {
            if detector.kind() == SignalKind::Outlier {
                continue;
            }
            let finding = detector.evaluate(&history, &current);
            assert_eq!(finding.points, 0.0, "{} scored", finding.signal);
            assert!(!finding.triggered, "{} triggered", finding.signal);
            assert_eq!(finding.status, FindingStatus::Evaluated);
        }
    }

    #[test]
    fn detector_faults_surface_as_error_status() {
        let finding = into_finding(
            SignalKind::DailySales,
            Err(DetectorError::ZeroVariance {
                metric: "revenue",
                current: 10.0,
                baseline: 20.0,
            }),
            100.0,
        );
        assert_eq!(finding.status, FindingStatus::Error);
        assert_eq!(finding.points, 0.0);
    }

    #[test]
    fn points_are_capped() {
        let finding = into_finding(
            SignalKind::Discount,
            Ok(Assessment {
                points: 250.0,
                triggered: true,
                evidence: vec![],
            }),
            100.0,
        );
        assert_eq!(finding.points, 100.0);
    }
}
