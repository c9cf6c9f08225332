use crate::config::{DailySalesConfig, EngineConfig};
use crate::detectors::{weekday_name, Assessment};
use crate::error::DetectorError;
use crate::models::DaySummary;
use crate::stats;
use crate::summary::History;

/// Compares the day's revenue against a trimmed same-weekday baseline.
#[derive(Debug, Clone)]
pub struct DailySalesDetector {
    config: DailySalesConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

impl DailySalesDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.daily_sales.clone(),
            min_baseline_days: config.baseline.min_baseline_days,
            cap: config.point_cap,
        }
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        let comparable = history.comparable(self.config.same_weekday);
        let scope = if self.config.same_weekday {
            format!("{}s", weekday_name(day.weekday))
        } else {
            "days".to_string()
        };

        if comparable.len() < self.min_baseline_days {
            return Err(DetectorError::insufficient(format!(
                "only {} prior {} in baseline (need {})",
                comparable.len(),
                scope,
                self.min_baseline_days
            )));
        }

        let revenues: Vec<f64> = comparable.iter().map(|d| d.revenue).collect();
        let kept = stats::trimmed(&revenues, self.config.trim_fraction);
        let baseline = stats::mean(&kept);
        let std = stats::std_dev(&kept);

        let z = if std > 0.0 {
            (day.revenue - baseline) / std
        } else if (day.revenue - baseline).abs() < 1e-9 {
            0.0
        } else {
            return Err(DetectorError::ZeroVariance {
                metric: "revenue",
                current: day.revenue,
                baseline,
            });
        };

        let mut points = 0.0;
        let mut triggered = false;
        let mut evidence = Vec::new();

        if z <= -self.config.z_threshold {
            triggered = true;
            points += self.config.points_per_sigma * z.abs();
            let pct_below = (baseline - day.revenue) / baseline * 100.0;
            evidence.push(format!(
                "revenue ~{:.0}% below expected ({:.0} vs {:.0} baseline)",
                pct_below, day.revenue, baseline
            ));
            evidence.push(format!(
                "z-score {:.2} against {} prior {} (std-dev {:.0})",
                z,
                comparable.len(),
                scope,
                std
            ));
        }

        let counts: Vec<f64> = comparable
            .iter()
            .map(|d| d.transaction_count as f64)
            .collect();
        let avg_count = stats::mean(&counts);
        if avg_count > 0.0
            && (day.transaction_count as f64) < avg_count * self.config.low_count_ratio
        {
            triggered = true;
            points += self.config.low_count_points;
            evidence.push(format!(
                "only {} completed transactions (baseline average {:.0})",
                day.transaction_count, avg_count
            ));
        }

        if !triggered {
            let direction = if day.revenue >= baseline { "above" } else { "below" };
            let pct = if baseline > 0.0 {
                (day.revenue - baseline).abs() / baseline * 100.0
            } else {
                0.0
            };
            evidence.push(format!(
                "revenue {:.0} is {:.0}% {} the {:.0} baseline (z {:+.2})",
                day.revenue, pct, direction, baseline, z
            ));
        }

        Ok(Assessment {
            points,
            triggered,
            evidence,
        })
    }
}
