use crate::config::{EngineConfig, ProductMixConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::DaySummary;
use crate::stats;
use crate::summary::History;

/// Shifts in basket size: cheaper average sales, a pile of small sales, or
/// large sales vanishing.
#[derive(Debug, Clone)]
pub struct ProductMixDetector {
    config: ProductMixConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

impl ProductMixDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.product_mix.clone(),
            min_baseline_days: config.baseline.min_baseline_days,
            cap: config.point_cap,
        }
    }

    fn large_count(&self, day: &DaySummary) -> usize {
        day.sale_amounts
            .iter()
            .filter(|amount| **amount >= self.config.large_amount)
            .count()
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        if day.transaction_count == 0 {
            return Err(DetectorError::insufficient("no completed sales on the day"));
        }

        let window: Vec<&DaySummary> = history
            .recent(self.config.window_days)
            .into_iter()
            .filter(|past| past.transaction_count > 0)
            .collect();
        if window.len() < self.min_baseline_days {
            return Err(DetectorError::insufficient(format!(
                "only {} days with sales in the last {} for a basket baseline (need {})",
                window.len(),
                self.config.window_days,
                self.min_baseline_days
            )));
        }

        let averages: Vec<f64> = window
            .iter()
            .map(|past| past.revenue / past.transaction_count as f64)
            .collect();
        let baseline_average = stats::mean(&averages);
        let average = day.revenue / day.transaction_count as f64;

        let mut points = 0.0;
        let mut evidence = Vec::new();

        if baseline_average > 0.0 && average / baseline_average < self.config.average_value_ratio {
            points += self.config.average_value_points;
            evidence.push(format!(
                "average sale {average:.2} vs {baseline_average:.2} baseline ({:.0}%)",
                average / baseline_average * 100.0
            ));
        }

        let sales = day.sale_amounts.len();
        if sales >= self.config.min_transactions {
            let small = day
                .sale_amounts
                .iter()
                .filter(|amount| **amount < self.config.small_amount)
                .count();
            if small as f64 > sales as f64 * self.config.small_share {
                points += self.config.small_share_points;
                evidence.push(format!(
                    "{small}/{sales} sales under {:.2}",
                    self.config.small_amount
                ));
            }
        }

        let past_sales: usize = window.iter().map(|past| past.sale_amounts.len()).sum();
        let past_large: usize = window.iter().map(|past| self.large_count(past)).sum();
        if past_sales > 0 && sales > 0 {
            let baseline_share = past_large as f64 / past_sales as f64;
            let share = self.large_count(day) as f64 / sales as f64;
            if baseline_share > self.config.min_large_share
                && share < baseline_share * self.config.large_share_drop
            {
                points += self.config.large_share_points;
                evidence.push(format!(
                    "sales of {:.2} or more: {:.0}% of the day vs {:.0}% baseline",
                    self.config.large_amount,
                    share * 100.0,
                    baseline_share * 100.0
                ));
            }
        }

        if evidence.is_empty() {
            return Ok(Assessment::quiet(format!(
                "average sale {average:.2} vs {baseline_average:.2} baseline"
            )));
        }

        Ok(Assessment {
            points,
            triggered: true,
            evidence,
        })
    }
}
