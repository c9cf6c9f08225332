use chrono::Timelike;

use crate::config::{EngineConfig, TimeOfDayConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::DaySummary;
use crate::summary::History;

/// Off-hours sales, and unusual weight on hours that are normally quiet.
#[derive(Debug, Clone)]
pub struct TimeOfDayDetector {
    config: TimeOfDayConfig,
    min_baseline_days: usize,
    pub(crate) cap: f64,
}

impl TimeOfDayDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.time_of_day.clone(),
            min_baseline_days: config.baseline.min_baseline_days,
            cap: config.point_cap,
        }
    }

    fn is_open(&self, hour: u32) -> bool {
        hour >= self.config.open_hour && hour < self.config.close_hour
    }

    pub fn assess(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Result<Assessment, DetectorError> {
        let mut points = 0.0;
        let mut triggered = false;
        let mut evidence = Vec::new();

        let off_hours: Vec<_> = day
            .transaction_times
            .iter()
            .filter(|t| !self.is_open(t.hour()))
            .collect();
        if let Some(first) = off_hours.first() {
            triggered = true;
            points += self.config.points_per_off_hours * off_hours.len() as f64;
            evidence.push(format!(
                "{} transactions outside business hours {:02}:00-{:02}:00 (first at {})",
                off_hours.len(),
                self.config.open_hour,
                self.config.close_hour,
                first.format("%H:%M")
            ));
        }

        if history.len() < self.min_baseline_days {
            evidence.push(format!(
                "hour-of-day baseline unavailable ({} days, need {})",
                history.len(),
                self.min_baseline_days
            ));
        } else if let Some((quiet_count, line)) = self.quiet_hour_concentration(history, day) {
            triggered = true;
            points += self.config.concentration_points * f64::from(quiet_count)
                / f64::from(self.config.min_concentration_count);
            evidence.push(line);
        }

        if !triggered {
            evidence.push(format!(
                "all {} transactions within business hours and usual hourly mix",
                day.total_events()
            ));
        }

        Ok(Assessment {
            points,
            triggered,
            evidence,
        })
    }

    /// Compares the day's share of activity in historically quiet open hours
    /// with the historical share of those same hours. Returns the number of
    /// transactions in those hours when the share is too high.
    fn quiet_hour_concentration(
        &self,
        history: &History<'_>,
        day: &DaySummary,
    ) -> Option<(u32, String)> {
        let mut totals = [0u64; 24];
        for past in &history.days {
            for (hour, count) in past.hour_counts.iter().enumerate() {
                totals[hour] += u64::from(*count);
            }
        }
        let grand_total: u64 = totals.iter().sum();
        let day_total = day.total_events();
        if grand_total == 0 || day_total == 0 {
            return None;
        }

        let quiet_hours: Vec<usize> = (0..24)
            .filter(|hour| self.is_open(*hour as u32))
            .filter(|hour| (totals[*hour] as f64 / grand_total as f64) < self.config.low_traffic_share)
            .collect();
        if quiet_hours.is_empty() {
            return None;
        }

        let historical_share: f64 = quiet_hours
            .iter()
            .map(|hour| totals[*hour] as f64 / grand_total as f64)
            .sum();
        let quiet_count: u32 = quiet_hours.iter().map(|hour| day.hour_counts[*hour]).sum();
        let day_share = quiet_count as f64 / day_total as f64;

        if quiet_count < self.config.min_concentration_count
            || day_share < historical_share * self.config.concentration_ratio
        {
            return None;
        }

        let hours: Vec<String> = quiet_hours
            .iter()
            .filter(|hour| day.hour_counts[**hour] > 0)
            .map(|hour| format!("{hour:02}:00"))
            .collect();
        let line = format!(
            "{} transactions ({:.0}% of the day) in usually quiet hours [{}] vs {:.1}% historically",
            quiet_count,
            day_share * 100.0,
            hours.join(", "),
            historical_share * 100.0
        );
        Some((quiet_count, line))
    }
}
