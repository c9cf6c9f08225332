use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{Severity, SignalKind};

/// Every option the engine recognises. Loaded once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub baseline: BaselineConfig,
    pub severity: SeverityTable,
    pub weights: SignalWeights,
    /// Upper bound for any single detector's points.
    pub point_cap: f64,
    pub daily_sales: DailySalesConfig,
    pub velocity: VelocityConfig,
    pub discount: DiscountConfig,
    pub void_refund: VoidRefundConfig,
    pub time_of_day: TimeOfDayConfig,
    pub outlier: OutlierConfig,
    pub high_value: HighValueConfig,
    pub product_mix: ProductMixConfig,
    /// Lowest severity that warrants notifying the owner.
    pub alert_floor: Severity,
    /// Run detectors on scoped threads. Results are identical either way.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineConfig::default(),
            severity: SeverityTable::default(),
            weights: SignalWeights::default(),
            point_cap: 100.0,
            daily_sales: DailySalesConfig::default(),
            velocity: VelocityConfig::default(),
            discount: DiscountConfig::default(),
            void_refund: VoidRefundConfig::default(),
            time_of_day: TimeOfDayConfig::default(),
            outlier: OutlierConfig::default(),
            high_value: HighValueConfig::default(),
            product_mix: ProductMixConfig::default(),
            alert_floor: Severity::Medium,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub lookback_days: i64,
    pub min_baseline_days: usize,
    /// Days reported at or above this tier are kept out of later baselines.
    pub exclude_flagged_at: Severity,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            min_baseline_days: 4,
            exclude_flagged_at: Severity::Medium,
        }
    }
}

/// Four ascending cut points. Tiers are inclusive-lower, exclusive-upper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityTable {
    pub low_below: f64,
    pub medium_below: f64,
    pub high_below: f64,
    pub critical_from: f64,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            low_below: 25.0,
            medium_below: 50.0,
            high_below: 75.0,
            critical_from: 75.0,
        }
    }
}

impl SeverityTable {
    pub fn classify(&self, score: f64) -> Severity {
        if score >= self.critical_from {
            Severity::Critical
        } else if score >= self.medium_below {
            Severity::High
        } else if score >= self.low_below {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let cuts = [self.low_below, self.medium_below, self.high_below];
        if cuts.iter().any(|cut| !cut.is_finite()) || !self.critical_from.is_finite() {
            return Err(ConfigError::threshold("severity", "cut points must be finite"));
        }
        if !(0.0 < self.low_below
            && self.low_below < self.medium_below
            && self.medium_below < self.high_below
            && self.high_below <= 100.0)
        {
            return Err(ConfigError::threshold(
                "severity",
                format!(
                    "cut points must ascend strictly within (0, 100]: {} / {} / {}",
                    self.low_below, self.medium_below, self.high_below
                ),
            ));
        }
        if self.critical_from != self.high_below {
            return Err(ConfigError::SeverityGap {
                high_below: self.high_below,
                critical_from: self.critical_from,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub daily_sales: f64,
    pub velocity: f64,
    pub discount: f64,
    pub void_refund: f64,
    pub time_of_day: f64,
    pub outlier: f64,
    pub high_value: f64,
    pub product_mix: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            daily_sales: 1.0,
            velocity: 0.8,
            discount: 1.2,
            void_refund: 1.1,
            time_of_day: 0.7,
            outlier: 0.9,
            high_value: 1.0,
            product_mix: 0.8,
        }
    }
}

impl SignalWeights {
    pub fn get(&self, signal: SignalKind) -> f64 {
        match signal {
            SignalKind::DailySales => self.daily_sales,
            SignalKind::Velocity => self.velocity,
            SignalKind::Discount => self.discount,
            SignalKind::VoidRefund => self.void_refund,
            SignalKind::TimeOfDay => self.time_of_day,
            SignalKind::Outlier => self.outlier,
            SignalKind::HighValue => self.high_value,
            SignalKind::ProductMix => self.product_mix,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for signal in SignalKind::ALL {
            let value = self.get(signal);
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { signal, value });
            }
        }
        if SignalKind::ALL.iter().all(|signal| self.get(*signal) == 0.0) {
            return Err(ConfigError::NoActiveWeights);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySalesConfig {
    pub z_threshold: f64,
    pub points_per_sigma: f64,
    /// Fraction trimmed from each tail of the baseline before mean/std.
    pub trim_fraction: f64,
    pub same_weekday: bool,
    pub low_count_ratio: f64,
    pub low_count_points: f64,
}

impl Default for DailySalesConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            points_per_sigma: 35.0,
            trim_fraction: 0.1,
            same_weekday: true,
            low_count_ratio: 0.6,
            low_count_points: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub z_threshold: f64,
    pub same_weekday: bool,
    /// Floor for an hour's std-dev so always-quiet hours stay comparable.
    pub min_hour_std: f64,
    pub points_per_bucket: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.5,
            same_weekday: false,
            min_hour_std: 1.0,
            points_per_bucket: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountConfig {
    pub ratio_threshold: f64,
    pub base_points: f64,
    pub points_per_ratio: f64,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 2.0,
            base_points: 50.0,
            points_per_ratio: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoidRefundConfig {
    pub window_minutes: i64,
    pub min_cluster_size: usize,
    pub base_points: f64,
    pub points_per_extra_event: f64,
    /// Multiplier applied per additional cluster (second cluster ×d, third ×d², ...).
    pub additional_cluster_decay: f64,
}

impl Default for VoidRefundConfig {
    fn default() -> Self {
        Self {
            window_minutes: 120,
            min_cluster_size: 3,
            base_points: 40.0,
            points_per_extra_event: 15.0,
            additional_cluster_decay: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeOfDayConfig {
    pub open_hour: u32,
    pub close_hour: u32,
    pub points_per_off_hours: f64,
    /// Hours whose historical share is below this are "low traffic".
    pub low_traffic_share: f64,
    pub concentration_ratio: f64,
    pub min_concentration_count: u32,
    /// Awarded per `min_concentration_count` quiet-hour transactions.
    pub concentration_points: f64,
}

impl Default for TimeOfDayConfig {
    fn default() -> Self {
        Self {
            open_hour: 7,
            close_hour: 21,
            points_per_off_hours: 10.0,
            low_traffic_share: 0.02,
            concentration_ratio: 3.0,
            min_concentration_count: 3,
            concentration_points: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub min_fit_days: usize,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    pub trigger_score: f64,
    /// Raw anomaly score mapped to zero points.
    pub score_floor: f64,
    /// Raw anomaly score mapped to the point cap.
    pub score_ceiling: f64,
    pub fit_budget_ms: Option<u64>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_fit_days: 10,
            trees: 100,
            sample_size: 256,
            seed: 42,
            trigger_score: 0.62,
            score_floor: 0.5,
            score_ceiling: 0.75,
            fit_budget_ms: Some(5_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighValueConfig {
    /// Products whose average unit price reaches this are high-value.
    pub price_threshold: f64,
    pub window_days: i64,
    pub unit_drop_ratio: f64,
    pub unit_drop_points: f64,
    /// Zero high-value sales only count when the baseline averages more units than this.
    pub zero_sales_min_average: f64,
    pub zero_sales_points: f64,
    pub value_drop_ratio: f64,
    pub value_drop_points: f64,
    pub unsold_share: f64,
    pub unsold_points: f64,
}

impl Default for HighValueConfig {
    fn default() -> Self {
        Self {
            price_threshold: 50.0,
            window_days: 30,
            unit_drop_ratio: 0.5,
            unit_drop_points: 40.0,
            zero_sales_min_average: 2.0,
            zero_sales_points: 30.0,
            value_drop_ratio: 0.4,
            value_drop_points: 20.0,
            unsold_share: 0.7,
            unsold_points: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductMixConfig {
    pub window_days: i64,
    pub average_value_ratio: f64,
    pub average_value_points: f64,
    pub small_amount: f64,
    pub small_share: f64,
    /// The small-sale rule needs at least this many sales on the day.
    pub min_transactions: usize,
    pub small_share_points: f64,
    pub large_amount: f64,
    /// The large-sale rule only applies when the baseline share is above this.
    pub min_large_share: f64,
    pub large_share_drop: f64,
    pub large_share_points: f64,
}

impl Default for ProductMixConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            average_value_ratio: 0.6,
            average_value_points: 40.0,
            small_amount: 10.0,
            small_share: 0.5,
            min_transactions: 10,
            small_share_points: 30.0,
            large_amount: 50.0,
            min_large_share: 0.1,
            large_share_drop: 0.5,
            large_share_points: 30.0,
        }
    }
}

/// Longest window any lookback may span, roughly ten years.
pub const MAX_WINDOW_DAYS: i64 = 3660;

fn window(name: &'static str, days: i64) -> Result<(), ConfigError> {
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(ConfigError::threshold(
            name,
            format!("must be between 1 and {MAX_WINDOW_DAYS} days, got {days}"),
        ))
    }
}

fn fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::threshold(name, format!("must be within (0, 1], got {value}")))
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::threshold(name, format!("must be positive, got {value}")))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::threshold(name, format!("must not be negative, got {value}")))
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.severity.validate()?;
        positive("point_cap", self.point_cap)?;

        window("baseline.lookback_days", self.baseline.lookback_days)?;
        if self.baseline.min_baseline_days < 2 {
            return Err(ConfigError::threshold(
                "baseline.min_baseline_days",
                "need at least 2 days for a std-dev",
            ));
        }

        positive("daily_sales.z_threshold", self.daily_sales.z_threshold)?;
        non_negative("daily_sales.points_per_sigma", self.daily_sales.points_per_sigma)?;
        non_negative("daily_sales.low_count_ratio", self.daily_sales.low_count_ratio)?;
        non_negative("daily_sales.low_count_points", self.daily_sales.low_count_points)?;
        if !(0.0..0.5).contains(&self.daily_sales.trim_fraction) {
            return Err(ConfigError::threshold(
                "daily_sales.trim_fraction",
                "must be in [0, 0.5)",
            ));
        }

        positive("velocity.z_threshold", self.velocity.z_threshold)?;
        positive("velocity.min_hour_std", self.velocity.min_hour_std)?;
        non_negative("velocity.points_per_bucket", self.velocity.points_per_bucket)?;

        positive("discount.ratio_threshold", self.discount.ratio_threshold)?;
        non_negative("discount.base_points", self.discount.base_points)?;
        non_negative("discount.points_per_ratio", self.discount.points_per_ratio)?;

        if !(1..=1440).contains(&self.void_refund.window_minutes) {
            return Err(ConfigError::threshold(
                "void_refund.window_minutes",
                "must be between 1 and 1440",
            ));
        }
        if self.void_refund.min_cluster_size < 2 {
            return Err(ConfigError::threshold(
                "void_refund.min_cluster_size",
                "a cluster needs at least 2 events",
            ));
        }
        non_negative("void_refund.base_points", self.void_refund.base_points)?;
        non_negative(
            "void_refund.points_per_extra_event",
            self.void_refund.points_per_extra_event,
        )?;
        if !(0.0..=1.0).contains(&self.void_refund.additional_cluster_decay) {
            return Err(ConfigError::threshold(
                "void_refund.additional_cluster_decay",
                "must be in [0, 1]",
            ));
        }

        let tod = &self.time_of_day;
        if tod.open_hour >= tod.close_hour || tod.close_hour > 24 {
            return Err(ConfigError::threshold(
                "time_of_day",
                format!("open {} must be before close {} (<= 24)", tod.open_hour, tod.close_hour),
            ));
        }
        non_negative("time_of_day.points_per_off_hours", tod.points_per_off_hours)?;
        non_negative("time_of_day.low_traffic_share", tod.low_traffic_share)?;
        positive("time_of_day.concentration_ratio", tod.concentration_ratio)?;
        non_negative("time_of_day.concentration_points", tod.concentration_points)?;
        if tod.min_concentration_count == 0 {
            return Err(ConfigError::threshold(
                "time_of_day.min_concentration_count",
                "must be at least 1",
            ));
        }

        let outlier = &self.outlier;
        if outlier.min_fit_days < 2 {
            return Err(ConfigError::threshold("outlier.min_fit_days", "must be at least 2"));
        }
        if outlier.trees == 0 || outlier.sample_size < 2 {
            return Err(ConfigError::threshold(
                "outlier",
                "trees must be positive and sample_size at least 2",
            ));
        }
        if !(outlier.score_floor < outlier.score_ceiling)
            || !(0.0..=1.0).contains(&outlier.score_floor)
            || !(0.0..=1.0).contains(&outlier.score_ceiling)
        {
            return Err(ConfigError::threshold(
                "outlier.score_floor",
                "floor must be below ceiling, both within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&outlier.trigger_score) {
            return Err(ConfigError::threshold("outlier.trigger_score", "must be within [0, 1]"));
        }

        let hv = &self.high_value;
        positive("high_value.price_threshold", hv.price_threshold)?;
        window("high_value.window_days", hv.window_days)?;
        fraction("high_value.unit_drop_ratio", hv.unit_drop_ratio)?;
        fraction("high_value.value_drop_ratio", hv.value_drop_ratio)?;
        fraction("high_value.unsold_share", hv.unsold_share)?;
        non_negative("high_value.zero_sales_min_average", hv.zero_sales_min_average)?;
        for (name, points) in [
            ("high_value.unit_drop_points", hv.unit_drop_points),
            ("high_value.zero_sales_points", hv.zero_sales_points),
            ("high_value.value_drop_points", hv.value_drop_points),
            ("high_value.unsold_points", hv.unsold_points),
        ] {
            non_negative(name, points)?;
        }

        let mix = &self.product_mix;
        window("product_mix.window_days", mix.window_days)?;
        fraction("product_mix.average_value_ratio", mix.average_value_ratio)?;
        fraction("product_mix.small_share", mix.small_share)?;
        fraction("product_mix.large_share_drop", mix.large_share_drop)?;
        non_negative("product_mix.min_large_share", mix.min_large_share)?;
        positive("product_mix.small_amount", mix.small_amount)?;
        if mix.large_amount <= mix.small_amount || !mix.large_amount.is_finite() {
            return Err(ConfigError::threshold(
                "product_mix.large_amount",
                format!(
                    "must exceed small_amount {}, got {}",
                    mix.small_amount, mix.large_amount
                ),
            ));
        }
        for (name, points) in [
            ("product_mix.average_value_points", mix.average_value_points),
            ("product_mix.small_share_points", mix.small_share_points),
            ("product_mix.large_share_points", mix.large_share_points),
        ] {
            non_negative(name, points)?;
        }

        Ok(())
    }
}
