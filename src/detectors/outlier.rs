use std::time::Duration;

use crate::config::{EngineConfig, OutlierConfig};
use crate::detectors::Assessment;
use crate::error::{DetectorError, FitError};
use crate::isolation::{ForestParams, IsolationForest};
use crate::models::DaySummary;
use crate::stats;
use crate::summary::History;

pub const FEATURE_NAMES: [&str; 6] = [
    "revenue",
    "transaction_count",
    "discount_rate",
    "void_count",
    "velocity_variance",
    "hour_entropy",
];

pub type FeatureVector = [f64; 6];

/// Fit on historical vectors, then score one vector in `[0, 1]` (higher is
/// more anomalous). Any model honouring this can replace the forest.
pub trait OutlierModel {
    fn fit(&mut self, samples: &[FeatureVector]) -> Result<(), FitError>;
    fn score(&self, sample: &FeatureVector) -> f64;
}

pub fn features(day: &DaySummary) -> FeatureVector {
    [
        day.revenue,
        day.transaction_count as f64,
        day.discount_rate,
        day.void_count as f64,
        day.velocity_variance(),
        day.hour_entropy(),
    ]
}

/// Column-wise standardisation fitted on the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    means: FeatureVector,
    scales: FeatureVector,
}

impl Scaler {
    pub fn fit(samples: &[FeatureVector]) -> Self {
        let mut means = [0.0; 6];
        let mut scales = [1.0; 6];
        for column in 0..FEATURE_NAMES.len() {
            let values: Vec<f64> = samples.iter().map(|s| s[column]).collect();
            means[column] = stats::mean(&values);
            let spread = stats::variance(&values).sqrt();
            if spread > 1e-12 {
                scales[column] = spread;
            }
        }
        Self { means, scales }
    }

    pub fn transform(&self, sample: &FeatureVector) -> FeatureVector {
        let mut scaled = [0.0; 6];
        for column in 0..FEATURE_NAMES.len() {
            scaled[column] = (sample[column] - self.means[column]) / self.scales[column];
        }
        scaled
    }
}

/// Linear map from raw anomaly score to points; independent of the model.
pub fn map_score(raw: f64, floor: f64, ceiling: f64, cap: f64) -> f64 {
    ((raw - floor) / (ceiling - floor)).clamp(0.0, 1.0) * cap
}

#[derive(Debug, Clone)]
pub struct OutlierDetector {
    config: OutlierConfig,
    pub(crate) cap: f64,
}

impl OutlierDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.outlier.clone(),
            cap: config.point_cap,
        }
    }

    fn forest(&self) -> IsolationForest {
        IsolationForest::new(ForestParams {
            trees: self.config.trees,
            sample_size: self.config.sample_size,
            seed: self.config.seed,
            budget: self.config.fit_budget_ms.map(Duration::from_millis),
        })
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        self.assess_with(self.forest(), history, day)
    }

    pub fn assess_with<M: OutlierModel>(
        &self,
        mut model: M,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        if history.len() < self.config.min_fit_days {
            return Err(DetectorError::insufficient(format!(
                "only {} historical days to fit the outlier model (need {})",
                history.len(),
                self.config.min_fit_days
            )));
        }

        let raw: Vec<FeatureVector> = history.days.iter().map(|d| features(d)).collect();
        let scaler = Scaler::fit(&raw);
        let scaled: Vec<FeatureVector> = raw.iter().map(|s| scaler.transform(s)).collect();

        model
            .fit(&scaled)
            .map_err(|err| DetectorError::insufficient(err.to_string()))?;

        let current = scaler.transform(&features(day));
        let score = model.score(&current);
        if !score.is_finite() {
            return Err(DetectorError::InvalidInput(format!(
                "model produced non-finite score {score}"
            )));
        }

        let points = map_score(
            score,
            self.config.score_floor,
            self.config.score_ceiling,
            self.cap,
        );
        let triggered = score >= self.config.trigger_score;

        let summary = format!(
            "anomaly score {:.3} (trigger {:.2}) against {} historical days",
            score,
            self.config.trigger_score,
            history.len()
        );
        if !triggered {
            return Ok(Assessment {
                points,
                triggered,
                evidence: vec![summary],
            });
        }

        let mut ranked: Vec<(usize, f64)> = current.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
        let drivers: Vec<String> = ranked
            .iter()
            .take(3)
            .map(|(column, z)| format!("{} {:+.1} sd", FEATURE_NAMES[*column], z))
            .collect();

        Ok(Assessment {
            points,
            triggered,
            evidence: vec![
                format!("day is jointly unusual across sales metrics: {summary}"),
                format!("largest deviations: {}", drivers.join(", ")),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, day_summary};
    use chrono::Duration as Days;

    struct FixedModel(f64);

    impl OutlierModel for FixedModel {
        fn fit(&mut self, _samples: &[FeatureVector]) -> Result<(), FitError> {
            Ok(())
        }

        fn score(&self, _sample: &FeatureVector) -> f64 {
            self.0
        }
    }

    struct SlowModel;

    impl OutlierModel for SlowModel {
        fn fit(&mut self, _samples: &[FeatureVector]) -> Result<(), FitError> {
            Err(FitError::BudgetExceeded {
                budget_ms: 10,
                trees_built: 3,
            })
        }

        fn score(&self, _sample: &FeatureVector) -> f64 {
            0.0
        }
    }

    fn varied_history(today: chrono::NaiveDate, days: usize) -> Vec<DaySummary> {
        (0..days)
            .map(|i| {
                let mut day = day_summary(
                    today - Days::days(i as i64 + 1),
                    1200.0 + (i % 5) as f64 * 40.0,
                    18 + i % 4,
                );
                day.discount_rate = 0.03 + (i % 3) as f64 * 0.005;
                day.void_count = i % 2;
                day
            })
            .collect()
    }

    #[test]
    fn score_mapping_is_linear_and_clamped() {
        assert_eq!(map_score(0.4, 0.5, 0.75, 100.0), 0.0);
        assert_eq!(map_score(0.625, 0.5, 0.75, 100.0), 50.0);
        assert_eq!(map_score(0.9, 0.5, 0.75, 100.0), 100.0);
    }

    #[test]
    fn fewer_than_ten_days_is_insufficient() {
        let today = date(2025, 9, 15);
        let days = varied_history(today, 9);
        let history = History::from_days(today, days.iter().collect());
        let detector = OutlierDetector::new(&EngineConfig::default());

        assert!(matches!(
            detector.assess(&history, &day_summary(today, 1200.0, 20)),
            Err(DetectorError::InsufficientData(_))
        ));
    }

    #[test]
    fn model_score_drives_trigger_and_points() {
        let today = date(2025, 9, 15);
        let days = varied_history(today, 20);
        let history = History::from_days(today, days.iter().collect());
        let detector = OutlierDetector::new(&EngineConfig::default());
        let current = day_summary(today, 1200.0, 20);

        let flagged = detector
            .assess_with(FixedModel(0.7), &history, &current)
            .unwrap();
        assert!(flagged.triggered);
        assert!((flagged.points - 80.0).abs() < 1e-9);

        let calm = detector
            .assess_with(FixedModel(0.45), &history, &current)
            .unwrap();
        assert!(!calm.triggered);
        assert_eq!(calm.points, 0.0);
    }

    #[test]
    fn fit_failure_degrades_to_insufficient_data() {
        let today = date(2025, 9, 15);
        let days = varied_history(today, 20);
        let history = History::from_days(today, days.iter().collect());
        let detector = OutlierDetector::new(&EngineConfig::default());

        let err = detector
            .assess_with(SlowModel, &history, &day_summary(today, 1200.0, 20))
            .unwrap_err();
        assert!(matches!(err, DetectorError::InsufficientData(_)));
    }

    #[test]
    fn jointly_unusual_day_outscores_a_typical_one() {
        let today = date(2025, 9, 15);
        let days = varied_history(today, 30);
        let history = History::from_days(today, days.iter().collect());
        let detector = OutlierDetector::new(&EngineConfig::default());

        let typical = day_summary(today, 1280.0, 19);
        let mut odd = day_summary(today, 700.0, 8);
        odd.discount_rate = 0.09;
        odd.void_count = 6;

        let typical_result = detector.assess(&history, &typical).unwrap();
        let odd_result = detector.assess(&history, &odd).unwrap();
        assert!(odd_result.points > typical_result.points);
        assert!(odd_result.points > 0.0);
    }
}
