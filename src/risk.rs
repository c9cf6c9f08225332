use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::models::{
    FindingStatus, RiskReport, Severity, SignalContribution, SignalFinding, SignalKind,
};

pub fn recommended_action(signal: SignalKind) -> &'static str {
    match signal {
        SignalKind::DailySales => {
            "Reconcile the cash drawer and sales records against expected takings; spot-check stock of top sellers"
        }
        SignalKind::Velocity => {
            "Review till logs and CCTV for the flagged hours and confirm who was on the register"
        }
        SignalKind::Discount => {
            "Audit discounted sales and who approved them; confirm each discount was authorised"
        }
        SignalKind::VoidRefund => {
            "Pull the void/refund receipts in the cluster window and verify each against customer and supervisor sign-off"
        }
        SignalKind::TimeOfDay => {
            "Verify who had till access outside business hours and why sales were rung up then"
        }
        SignalKind::Outlier => {
            "Review the full day's transactions; several metrics moved together in an unusual way"
        }
        SignalKind::HighValue => {
            "Count stock of high-value items against recorded sales; look for items leaving without being rung up"
        }
        SignalKind::ProductMix => {
            "Review the day's receipts for expensive items rung up as cheaper ones or split into small sales"
        }
    }
}

pub fn headline_action(severity: Severity, no_activity: bool, insufficient_history: bool) -> &'static str {
    if no_activity {
        return "No transactions recorded; confirm the store was closed or that sales were captured";
    }
    if insufficient_history {
        return "Insufficient historical data to judge this day; keep collecting daily records";
    }
    match severity {
        Severity::Critical => {
            "Investigate immediately, review CCTV if available, consider suspension pending investigation"
        }
        Severity::High => "Investigate today, review transactions in detail, check physical inventory",
        Severity::Medium => "Monitor closely, check again tomorrow, prepare to investigate",
        Severity::Low => "Normal operations, no immediate action needed",
    }
}

/// Combines one day's findings into a report.
///
/// The score is the weighted mean of points over signals that were actually
/// evaluated with a positive weight, so signals lacking data (or failing)
/// neither add to nor dilute it. Findings are summed in canonical signal
/// order, which makes the result independent of evaluation order.
pub fn aggregate(
    date: NaiveDate,
    findings: &[SignalFinding],
    no_activity: bool,
    config: &EngineConfig,
) -> RiskReport {
    let mut canonical: Vec<SignalFinding> = findings.to_vec();
    canonical.sort_by_key(|finding| finding.signal);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut contributions = Vec::with_capacity(canonical.len());

    for finding in &canonical {
        let weight = config.weights.get(finding.signal);
        let counts = finding.is_evaluated() && weight > 0.0;
        let weighted_points = if counts { finding.points * weight } else { 0.0 };
        if counts {
            numerator += weighted_points;
            denominator += weight;
        }
        contributions.push(SignalContribution {
            signal: finding.signal,
            status: finding.status,
            points: finding.points,
            weight,
            weighted_points,
        });
    }

    let insufficient_history = denominator == 0.0;
    let raw = if insufficient_history {
        0.0
    } else {
        numerator / denominator
    };
    let score = raw.clamp(0.0, 100.0).round() as u8;
    let severity = config.severity.classify(f64::from(score));

    let weighted = |signal: SignalKind| {
        contributions
            .iter()
            .find(|c| c.signal == signal)
            .map_or(0.0, |c| c.weighted_points)
    };

    let mut ordered = canonical;
    ordered.sort_by(|a, b| {
        b.triggered
            .cmp(&a.triggered)
            .then_with(|| weighted(b.signal).total_cmp(&weighted(a.signal)))
            .then(a.signal.cmp(&b.signal))
    });

    let mut evidence = Vec::new();
    let mut recommended_actions: Vec<String> = Vec::new();
    for finding in ordered.iter().filter(|f| f.triggered && f.is_evaluated()) {
        evidence.extend(finding.evidence.iter().cloned());
        let action = recommended_action(finding.signal);
        if !recommended_actions.iter().any(|existing| existing == action) {
            recommended_actions.push(action.to_string());
        }
    }

    let could_not_evaluate = ordered
        .iter()
        .filter(|f| f.status == FindingStatus::Error)
        .map(|f| f.signal)
        .collect();

    RiskReport {
        date,
        score,
        severity,
        headline_action: headline_action(severity, no_activity, insufficient_history).to_string(),
        findings: ordered,
        contributions,
        evidence,
        recommended_actions,
        could_not_evaluate,
        insufficient_history,
        no_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalWeights;
    use crate::testing::date;

    fn finding(signal: SignalKind, points: f64, triggered: bool) -> SignalFinding {
        SignalFinding {
            signal,
            points,
            triggered,
            evidence: vec![format!("{signal} evidence")],
            status: FindingStatus::Evaluated,
        }
    }

    fn scenario_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.weights = SignalWeights {
            daily_sales: 1.0,
            discount: 1.2,
            void_refund: 1.1,
            velocity: 0.8,
            time_of_day: 0.0,
            outlier: 0.0,
            high_value: 0.0,
            product_mix: 0.0,
        };
        config
    }

    fn scenario_findings() -> Vec<SignalFinding> {
        vec![
            finding(SignalKind::DailySales, 70.0, true),
            finding(SignalKind::Discount, 100.0, true),
            finding(SignalKind::VoidRefund, 100.0, true),
            finding(SignalKind::Velocity, 0.0, false),
        ]
    }

    #[test]
    fn three_triggers_combine_to_high() {
        let report = aggregate(date(2025, 9, 15), &scenario_findings(), false, &scenario_config());

        assert_eq!(report.score, 73);
        assert_eq!(report.severity, Severity::High);
        let order: Vec<SignalKind> = report.triggered().map(|f| f.signal).collect();
        assert_eq!(
            order,
            vec![SignalKind::Discount, SignalKind::VoidRefund, SignalKind::DailySales]
        );
        assert_eq!(report.recommended_actions.len(), 3);
        assert_eq!(report.recommended_actions[0], recommended_action(SignalKind::Discount));
        assert_eq!(report.evidence[0], "discount evidence");
        assert!(!report.insufficient_history);
    }

    #[test]
    fn insufficient_signals_do_not_dilute_the_score() {
        let mut findings = scenario_findings();
        findings[0] = SignalFinding::insufficient(SignalKind::DailySales, "only 3 prior Mondays");
        let report = aggregate(date(2025, 9, 15), &findings, false, &scenario_config());

        // (100 * 1.2 + 100 * 1.1 + 0 * 0.8) / (1.2 + 1.1 + 0.8)
        assert_eq!(report.score, 74);
        let daily = report
            .contributions
            .iter()
            .find(|c| c.signal == SignalKind::DailySales)
            .unwrap();
        assert_eq!(daily.status, FindingStatus::InsufficientData);
        assert_eq!(daily.weighted_points, 0.0);
    }

    #[test]
    fn error_findings_contribute_nothing_and_are_listed() {
        let mut findings = scenario_findings();
        findings.push(SignalFinding::error(SignalKind::Outlier, "boom"));
        let mut config = scenario_config();
        config.weights.outlier = 2.0;

        let report = aggregate(date(2025, 9, 15), &findings, false, &config);
        assert_eq!(report.score, 73);
        assert_eq!(report.could_not_evaluate, vec![SignalKind::Outlier]);
    }

    #[test]
    fn score_is_independent_of_finding_order() {
        let config = scenario_config();
        let forward = aggregate(date(2025, 9, 15), &scenario_findings(), false, &config);
        let mut reversed = scenario_findings();
        reversed.reverse();
        let backward = aggregate(date(2025, 9, 15), &reversed, false, &config);

        assert_eq!(forward, backward);
    }

    #[test]
    fn score_never_decreases_as_points_rise() {
        let config = EngineConfig::default();
        for signal in SignalKind::ALL {
            let mut previous = 0u8;
            for step in 0..=20 {
                let findings: Vec<SignalFinding> = SignalKind::ALL
                    .iter()
                    .map(|kind| {
                        let points = if *kind == signal { step as f64 * 5.0 } else { 30.0 };
                        finding(*kind, points, points > 0.0)
                    })
                    .collect();
                let report = aggregate(date(2025, 9, 15), &findings, false, &config);
                assert!(report.score >= previous, "{signal} at step {step}");
                previous = report.score;
            }
        }
    }

    #[test]
    fn nothing_evaluated_scores_zero_with_marker() {
        let findings: Vec<SignalFinding> = SignalKind::ALL
            .iter()
            .map(|kind| SignalFinding::insufficient(*kind, "no history"))
            .collect();
        let report = aggregate(date(2025, 9, 15), &findings, false, &EngineConfig::default());

        assert_eq!(report.score, 0);
        assert_eq!(report.severity, Severity::Low);
        assert!(report.insufficient_history);
        assert!(report.evidence.is_empty());
        assert!(report.headline_action.starts_with("Insufficient historical data"));
    }

    #[test]
    fn duplicate_signal_types_recommend_once() {
        let mut findings = scenario_findings();
        findings.push(finding(SignalKind::Discount, 60.0, true));
        let report = aggregate(date(2025, 9, 15), &findings, false, &scenario_config());

        let discount_actions = report
            .recommended_actions
            .iter()
            .filter(|a| a.as_str() == recommended_action(SignalKind::Discount))
            .count();
        assert_eq!(discount_actions, 1);
    }

    #[test]
    fn report_survives_json_round_trip() {
        let mut findings = scenario_findings();
        findings.push(SignalFinding::error(SignalKind::Outlier, "fit failed"));
        let report = aggregate(date(2025, 9, 15), &findings, false, &scenario_config());

        let json = serde_json::to_string(&report).unwrap();
        let restored: RiskReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, report);
    }
}
