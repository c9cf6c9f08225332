use crate::config::{DiscountConfig, EngineConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::DaySummary;
use crate::stats;
use crate::summary::History;

#[derive(Debug, Clone)]
pub struct DiscountDetector {
    config: DiscountConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

impl DiscountDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.discount.clone(),
            min_baseline_days: config.baseline.min_baseline_days,
            cap: config.point_cap,
        }
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        if history.len() < self.min_baseline_days {
            return Err(DetectorError::insufficient(format!(
                "only {} baseline days for discount rate (need {})",
                history.len(),
                self.min_baseline_days
            )));
        }

        let rates: Vec<f64> = history.days.iter().map(|d| d.discount_rate).collect();
        let baseline = stats::mean(&rates);
        let current = day.discount_rate;

        if baseline <= 0.0 {
            if current <= 0.0 {
                return Ok(Assessment::quiet(format!(
                    "no discounts given today or in {} baseline days",
                    history.len()
                )));
            }
            return Ok(Assessment {
                points: self.cap,
                triggered: true,
                evidence: vec![format!(
                    "discount rate {:.1}% with no discounting in {} baseline days",
                    current * 100.0,
                    history.len()
                )],
            });
        }

        let ratio = current / baseline;
        let summary = format!(
            "discount rate {:.1}% vs {:.1}% baseline ({:.2}x)",
            current * 100.0,
            baseline * 100.0,
            ratio
        );

        if ratio < self.config.ratio_threshold {
            return Ok(Assessment::quiet(summary));
        }

        let points = self.config.base_points
            + self.config.points_per_ratio * (ratio - self.config.ratio_threshold);

        Ok(Assessment {
            points,
            triggered: true,
            evidence: vec![
                summary,
                format!(
                    "{:.0} discounted against {:.0} revenue",
                    day.discount_total, day.revenue
                ),
            ],
        })
    }
}
