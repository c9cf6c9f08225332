use crate::config::{EngineConfig, VelocityConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::DaySummary;
use crate::stats;
use crate::summary::History;

/// Hour-bucket transaction rates against the per-hour historical distribution.
#[derive(Debug, Clone)]
pub struct VelocityDetector {
    config: VelocityConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct HourDeviation {
    hour: usize,
    count: u32,
    expected: f64,
    z: f64,
}

impl VelocityDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.velocity.clone(),
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
        if comparable.len() < self.min_baseline_days {
            return Err(DetectorError::insufficient(format!(
                "only {} baseline days for hourly rates (need {})",
                comparable.len(),
                self.min_baseline_days
            )));
        }

        let mut deviations = Vec::new();
        for hour in 0..24 {
            let samples: Vec<f64> = comparable
                .iter()
                .map(|d| d.hour_counts[hour] as f64)
                .collect();
            let expected = stats::mean(&samples);
            let std = stats::std_dev(&samples).max(self.config.min_hour_std);
            let count = day.hour_counts[hour];
            let z = (count as f64 - expected) / std;

            if z.abs() >= self.config.z_threshold {
                deviations.push(HourDeviation {
                    hour,
                    count,
                    expected,
                    z,
                });
            }
        }

        if deviations.is_empty() {
            return Ok(Assessment::quiet(format!(
                "hourly transaction rates within {:.1} sigma of {} baseline days",
                self.config.z_threshold,
                comparable.len()
            )));
        }

        let points = deviations
            .iter()
            .map(|d| self.config.points_per_bucket * d.z.abs() / self.config.z_threshold)
            .sum();

        deviations.sort_by(|a, b| b.z.abs().total_cmp(&a.z.abs()).then(a.hour.cmp(&b.hour)));
        let mut evidence = vec![format!(
            "{} hour bucket(s) deviate from the hourly baseline",
            deviations.len()
        )];
        evidence.extend(deviations.iter().map(|d| {
            format!(
                "{:02}:00-{:02}:59: {} transactions vs {:.1} expected (z {:+.1})",
                d.hour, d.hour, d.count, d.expected, d.z
            )
        }));

        Ok(Assessment {
            points,
            triggered: true,
            evidence,
        })
    }
}
