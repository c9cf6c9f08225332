use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::detectors::Detector;
use crate::error::ConfigError;
use crate::models::{DaySummary, RiskReport, SignalFinding};
use crate::risk;
use crate::summary::History;

/// Validated configuration plus the detector set built from it.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    detectors: Vec<Detector>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let detectors = Detector::standard_set(&config);
        Ok(Self { config, detectors })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One finding per detector, in detector order. With `parallel` set each
    /// detector runs on its own scoped thread; a panicking detector becomes
    /// an error finding instead of taking the others down.
    pub fn evaluate_all(&self, history: &History<'_>, day: &DaySummary) -> Vec<SignalFinding> {
        let findings: Vec<SignalFinding> = if self.config.parallel {
            thread::scope(|scope| {
                let handles: Vec<_> = self
                    .detectors
                    .iter()
                    .map(|detector| (detector.kind(), scope.spawn(move || detector.evaluate(history, day))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(kind, handle)| {
                        handle
                            .join()
                            .unwrap_or_else(|_| SignalFinding::error(kind, "detector panicked"))
                    })
                    .collect()
            })
        } else {
            self.detectors
                .iter()
                .map(|detector| detector.evaluate(history, day))
                .collect()
        };

        for finding in &findings {
            debug!(
                date = %day.date,
                signal = %finding.signal,
                status = ?finding.status,
                points = finding.points,
                triggered = finding.triggered,
                "signal evaluated"
            );
        }
        findings
    }

    /// Scores one date. A date with no summary is treated as a day without
    /// any transactions.
    pub fn assess(
        &self,
        date: NaiveDate,
        summaries: &BTreeMap<NaiveDate, DaySummary>,
        flagged: &BTreeSet<NaiveDate>,
    ) -> RiskReport {
        let empty;
        let day = match summaries.get(&date) {
            Some(day) => day,
            None => {
                empty = DaySummary::empty(date);
                &empty
            }
        };

        let history = History::build(date, summaries, flagged, &self.config.baseline);
        let findings = self.evaluate_all(&history, day);
        let report = risk::aggregate(date, &findings, day.no_activity, &self.config);

        info!(
            date = %date,
            revenue = day.revenue,
            items = day.items_sold,
            baseline_days = history.len(),
            excluded_flagged = history.excluded_flagged,
            score = report.score,
            severity = %report.severity,
            "day assessed"
        );
        report
    }

    /// Assesses every summarised date oldest first. Dates that reach the
    /// exclusion tier stay out of the baselines of all later dates.
    pub fn scan(&self, summaries: &BTreeMap<NaiveDate, DaySummary>) -> Vec<RiskReport> {
        let mut flagged = BTreeSet::new();
        let reports: Vec<RiskReport> = summaries
            .keys()
            .map(|date| self.assess_and_flag(*date, summaries, &mut flagged))
            .collect();

        info!(days = reports.len(), flagged = flagged.len(), "scan finished");
        reports
    }

    /// Dates before `date` that a scan of the same summaries would have kept
    /// out of baselines, so a single-day assessment matches the scan.
    pub fn flagged_before(
        &self,
        date: NaiveDate,
        summaries: &BTreeMap<NaiveDate, DaySummary>,
    ) -> BTreeSet<NaiveDate> {
        let mut flagged = BTreeSet::new();
        for earlier in summaries.range(..date).map(|(day, _)| *day) {
            self.assess_and_flag(earlier, summaries, &mut flagged);
        }

        debug!(date = %date, flagged = flagged.len(), "replayed earlier days");
        flagged
    }

    fn assess_and_flag(
        &self,
        date: NaiveDate,
        summaries: &BTreeMap<NaiveDate, DaySummary>,
        flagged: &mut BTreeSet<NaiveDate>,
    ) -> RiskReport {
        let report = self.assess(date, summaries, flagged);
        if report.severity >= self.config.baseline.exclude_flagged_at {
            flagged.insert(date);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FindingStatus, Severity, SignalKind, TransactionStatus, VoidEvent};
    use crate::testing::{date, day_summary, time};
    use chrono::Duration;

    fn month_of_days(today: NaiveDate) -> BTreeMap<NaiveDate, DaySummary> {
        (1..=35)
            .map(|offset| {
                let day = today - Duration::days(offset);
                let mut summary =
                    day_summary(day, 1100.0 + (offset % 7) as f64 * 30.0, 18 + (offset % 3) as usize);
                summary.discount_rate = 0.03 + (offset % 4) as f64 * 0.004;
                (day, summary)
            })
            .collect()
    }

    fn finding(report: &RiskReport, signal: SignalKind) -> &SignalFinding {
        report.findings.iter().find(|f| f.signal == signal).unwrap()
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let today = date(2025, 9, 15);
        let mut summaries = month_of_days(today);
        let mut odd = day_summary(today, 450.0, 9);
        odd.discount_rate = 0.12;
        summaries.insert(today, odd);

        let sequential = Engine::new(EngineConfig::default()).unwrap();
        let parallel = Engine::new(EngineConfig {
            parallel: true,
            ..EngineConfig::default()
        })
        .unwrap();

        let flagged = BTreeSet::new();
        assert_eq!(
            sequential.assess(today, &summaries, &flagged),
            parallel.assess(today, &summaries, &flagged)
        );
    }

    #[test]
    fn repeated_assessment_is_identical() {
        let today = date(2025, 9, 15);
        let mut summaries = month_of_days(today);
        summaries.insert(today, day_summary(today, 1150.0, 19));
        let engine = Engine::new(EngineConfig::default()).unwrap();

        let first = engine.assess(today, &summaries, &BTreeSet::new());
        let second = engine.assess(today, &summaries, &BTreeSet::new());
        assert_eq!(first, second);
        assert_eq!(first.findings.len(), SignalKind::ALL.len());
    }

    #[test]
    fn day_without_records_reports_no_activity() {
        let today = date(2025, 9, 15);
        let summaries = month_of_days(today);
        let engine = Engine::new(EngineConfig::default()).unwrap();

        let report = engine.assess(today, &summaries, &BTreeSet::new());
        assert!(report.no_activity);
        assert_eq!(report.score, 0);
        assert_eq!(report.severity, Severity::Low);
        assert!(report
            .findings
            .iter()
            .all(|f| f.status == FindingStatus::InsufficientData));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = EngineConfig::default();
        config.weights.discount = -1.0;
        assert!(matches!(
            Engine::new(config),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn scan_keeps_flagged_days_out_of_later_baselines() {
        let today = date(2025, 9, 15);
        let summaries: BTreeMap<NaiveDate, DaySummary> = (0..6)
            .map(|week| {
                let day = today - Duration::days(7 * week);
                (day, day_summary(day, 1000.0, 20))
            })
            .collect();

        let normal = Engine::new(EngineConfig::default()).unwrap();
        let reports = normal.scan(&summaries);
        assert_eq!(reports.len(), 6);
        assert_eq!(reports.last().unwrap().date, today);
        assert!(reports.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert!(finding(reports.last().unwrap(), SignalKind::DailySales).is_evaluated());

        let mut strict = EngineConfig::default();
        strict.baseline.exclude_flagged_at = Severity::Low;
        let reports = Engine::new(strict).unwrap().scan(&summaries);
        assert_eq!(
            finding(reports.last().unwrap(), SignalKind::DailySales).status,
            FindingStatus::InsufficientData
        );
    }

    /// Eleven Mondays ending on `today`; the Mondays three and four weeks back
    /// have low takings, heavy discounting and a burst of voids.
    fn mondays_with_bad_weeks(today: NaiveDate) -> BTreeMap<NaiveDate, DaySummary> {
        (0..=10)
            .map(|week| {
                let day = today - Duration::days(7 * week);
                let summary = if week == 3 || week == 4 {
                    let mut bad = day_summary(day, 300.0, 8);
                    bad.discount_rate = 0.15;
                    for minute in [0, 5, 12, 20, 28] {
                        bad.void_events.push(VoidEvent {
                            time: time(15, minute),
                            staff_id: "S-9".to_string(),
                            status: TransactionStatus::Voided,
                        });
                    }
                    bad.void_count = 5;
                    bad
                } else {
                    day_summary(day, 1000.0 + (week % 3) as f64 * 40.0, 20)
                };
                (day, summary)
            })
            .collect()
    }

    #[test]
    fn flagged_before_replays_the_scan() {
        let today = date(2025, 9, 15);
        let summaries = mondays_with_bad_weeks(today);
        let engine = Engine::new(EngineConfig::default()).unwrap();

        let flagged = engine.flagged_before(today, &summaries);
        assert!(flagged.contains(&(today - Duration::days(21))));
        assert!(flagged.contains(&(today - Duration::days(28))));
        assert!(flagged.iter().all(|day| *day < today));

        let single = engine.assess(today, &summaries, &flagged);
        let scanned = engine.scan(&summaries);
        assert_eq!(&single, scanned.last().unwrap());
    }

    #[test]
    fn assessing_without_replay_lets_bad_days_into_the_baseline() {
        let today = date(2025, 9, 15);
        let summaries = mondays_with_bad_weeks(today);
        let engine = Engine::new(EngineConfig::default()).unwrap();

        let replayed = engine.assess(today, &summaries, &engine.flagged_before(today, &summaries));
        let naive = engine.assess(today, &summaries, &BTreeSet::new());
        assert_ne!(replayed.findings, naive.findings);
    }

    #[test]
    fn flagged_before_the_first_day_is_empty() {
        let today = date(2025, 9, 15);
        let summaries = mondays_with_bad_weeks(today);
        let engine = Engine::new(EngineConfig::default()).unwrap();

        let first = *summaries.keys().next().unwrap();
        assert!(engine.flagged_before(first, &summaries).is_empty());
    }
}
