use std::collections::{BTreeMap, BTreeSet};
use std::iter;

use crate::config::{EngineConfig, HighValueConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::{DaySummary, ProductSales};
use crate::stats;
use crate::summary::History;

/// Expensive products selling less than usual, or not at all.
#[derive(Debug, Clone)]
pub struct HighValueDetector {
    config: HighValueConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

impl HighValueDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.high_value.clone(),
            min_baseline_days: config.baseline.min_baseline_days,
            cap: config.point_cap,
        }
    }

    /// Products whose average unit price over the window and the day reaches
    /// the threshold.
    fn high_value_products<'d>(&self, days: &[&'d DaySummary]) -> BTreeSet<&'d str> {
        let mut prices: BTreeMap<&str, ProductSales> = BTreeMap::new();
        for day in days {
            for (name, sales) in &day.products {
                let entry = prices.entry(name.as_str()).or_default();
                entry.unit_price_total += sales.unit_price_total;
                entry.lines += sales.lines;
            }
        }
        prices
            .into_iter()
            .filter(|(_, sales)| {
                sales.lines > 0 && sales.average_unit_price() >= self.config.price_threshold
            })
            .map(|(name, _)| name)
            .collect()
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        let window = history.recent(self.config.window_days);
        if window.len() < self.min_baseline_days {
            return Err(DetectorError::insufficient(format!(
                "only {} days in the last {} for a high-value baseline (need {})",
                window.len(),
                self.config.window_days,
                self.min_baseline_days
            )));
        }

        let everything: Vec<&DaySummary> = window.iter().copied().chain(iter::once(day)).collect();
        let products = self.high_value_products(&everything);
        if products.is_empty() {
            return Err(DetectorError::insufficient(format!(
                "no products average {:.0} or more per unit",
                self.config.price_threshold
            )));
        }

        let totals = |summary: &DaySummary| {
            products
                .iter()
                .filter_map(|name| summary.products.get(*name))
                .fold((0.0, 0.0), |(units, value), sales| {
                    (units + sales.quantity as f64, value + sales.revenue)
                })
        };

        let (past_units, past_values): (Vec<f64>, Vec<f64>) =
            window.iter().map(|summary| totals(summary)).unzip();
        let average_units = stats::mean(&past_units);
        let average_value = stats::mean(&past_values);
        if average_units <= 0.0 {
            return Err(DetectorError::insufficient(
                "no high-value sales in the baseline window",
            ));
        }

        let (units, value) = totals(day);
        let mut points = 0.0;
        let mut evidence = Vec::new();

        if units / average_units < self.config.unit_drop_ratio {
            points += self.config.unit_drop_points;
            evidence.push(format!(
                "high-value products: only {units:.0} units sold vs {average_units:.1} average"
            ));
        }

        if units == 0.0 && average_units > self.config.zero_sales_min_average {
            points += self.config.zero_sales_points;
            evidence.push(format!(
                "no high-value sales today (baseline averages {average_units:.1} units)"
            ));
        }

        if average_value > 0.0 && value / average_value < self.config.value_drop_ratio {
            points += self.config.value_drop_points;
            evidence.push(format!(
                "high-value revenue {value:.2} vs {average_value:.2} average"
            ));
        }

        if units > 0.0 {
            let unsold = products
                .iter()
                .filter(|name| day.products.get(**name).map_or(true, |s| s.quantity == 0))
                .count();
            if unsold as f64 >= products.len() as f64 * self.config.unsold_share {
                points += self.config.unsold_points;
                evidence.push(format!(
                    "{}/{} high-value products not sold today",
                    unsold,
                    products.len()
                ));
            }
        }

        if evidence.is_empty() {
            return Ok(Assessment::quiet(format!(
                "high-value sales {units:.0} units / {value:.2} vs {average_units:.1} / {average_value:.2} average across {} products",
                products.len()
            )));
        }

        Ok(Assessment {
            points,
            triggered: true,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, day_summary};
    use chrono::Duration;

    fn sales(quantity: u64, unit_price: f64) -> ProductSales {
        ProductSales {
            quantity,
            revenue: quantity as f64 * unit_price,
            lines: quantity as u32,
            unit_price_total: quantity as f64 * unit_price,
        }
    }

    /// A day selling cheap painkillers plus the given expensive lines.
    fn shop_day(day: chrono::NaiveDate, perfume: u64, watches: u64) -> DaySummary {
        let mut summary = day_summary(day, 200.0, 20);
        if perfume > 0 {
            summary.products.insert("Perfume".to_string(), sales(perfume, 120.0));
        }
        if watches > 0 {
            summary.products.insert("Watch".to_string(), sales(watches, 300.0));
        }
        summary
    }

    fn baseline(today: chrono::NaiveDate) -> Vec<DaySummary> {
        (1..=10)
            .map(|offset| shop_day(today - Duration::days(offset), 3, 1))
            .collect()
    }

    fn detector() -> HighValueDetector {
        HighValueDetector::new(&EngineConfig::default())
    }

    #[test]
    fn usual_high_value_sales_are_quiet() {
        let today = date(2025, 9, 15);
        let days = baseline(today);
        let history = History::from_days(today, days.iter().collect());

        let result = detector().assess(&history, &shop_day(today, 3, 1)).unwrap();
        assert!(!result.triggered);
        assert_eq!(result.points, 0.0);
    }

    #[test]
    fn no_expensive_sales_on_a_normal_day_triggers() {
        let today = date(2025, 9, 15);
        let days = baseline(today);
        let history = History::from_days(today, days.iter().collect());

        let result = detector().assess(&history, &shop_day(today, 0, 0)).unwrap();
        assert!(result.triggered);
        // unit drop + zero sales + value drop
        assert_eq!(result.points, 90.0);
        assert_eq!(
            result.evidence[1],
            "no high-value sales today (baseline averages 4.0 units)"
        );
    }

    #[test]
    fn most_expensive_lines_unsold_adds_points() {
        let today = date(2025, 9, 15);
        let days = baseline(today);
        let history = History::from_days(today, days.iter().collect());

        // 1 perfume, no watch: units 1 vs 4, value 120 vs 660.
        let result = detector().assess(&history, &shop_day(today, 1, 0)).unwrap();
        assert!(result.triggered);
        assert_eq!(result.points, 40.0 + 20.0);

        let mut strict = EngineConfig::default();
        strict.high_value.unsold_share = 0.5;
        let result = HighValueDetector::new(&strict)
            .assess(&history, &shop_day(today, 1, 0))
            .unwrap();
        assert_eq!(result.points, 40.0 + 20.0 + 10.0);
        assert_eq!(result.evidence[2], "1/2 high-value products not sold today");
    }

    #[test]
    fn store_without_expensive_products_is_insufficient() {
        let today = date(2025, 9, 15);
        let days: Vec<DaySummary> = (1..=10)
            .map(|offset| day_summary(today - Duration::days(offset), 200.0, 20))
            .collect();
        let history = History::from_days(today, days.iter().collect());

        assert!(matches!(
            detector().assess(&history, &day_summary(today, 200.0, 20)),
            Err(DetectorError::InsufficientData(_))
        ));
    }

    #[test]
    fn days_outside_the_window_are_ignored() {
        let today = date(2025, 9, 15);
        let days: Vec<DaySummary> = (40..=50)
            .map(|offset| shop_day(today - Duration::days(offset), 3, 1))
            .collect();
        let history = History::from_days(today, days.iter().collect());

        assert!(matches!(
            detector().assess(&history, &shop_day(today, 0, 0)),
            Err(DetectorError::InsufficientData(_))
        ));
    }
}
