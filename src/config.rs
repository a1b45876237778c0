/// Analysis settings: every threshold the analysis uses, with its default.
///
/// Settings are loaded from an optional YAML file; any section or field that is left out
/// keeps its default. None of the defaults are calibrated, they are the values the
/// analysis has historically been run with.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;
use crate::reserve_price::PreliminaryLayout;
use crate::win_models::WinModelKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fractional half-width of the preliminary price band around the base amount
    pub variance_range: f64,
    pub trials: usize,
    pub preliminary_count: usize,
    /// Preliminary prices averaged into one reserve price
    pub draw_count: usize,
    pub seed: u64,
    pub layout: PreliminaryLayout,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            variance_range: 0.03,
            trials: 10_000,
            preliminary_count: 15,
            draw_count: 4,
            seed: 42,
            layout: PreliminaryLayout::Linspace,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Winner samples below this count are reported with a caveat
    pub min_winner_sample: usize,
    /// Keep only records whose bid ratio falls inside [lo, hi]
    pub valid_range: Option<[f64; 2]>,
    /// Trim competitor ratios outside [Q1 - k*IQR, Q3 + k*IQR] before density estimation
    pub iqr_outlier_factor: Option<f64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            min_winner_sample: 10,
            valid_range: None,
            iqr_outlier_factor: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DensityConfig {
    pub bucket_width: f64,
    /// Buckets partition [lo, hi); ratios outside are counted as excluded
    pub scan_range: [f64; 2],
    /// Buckets need strictly more occupants than this to count as avoid zones
    pub avoid_threshold: u32,
    pub avoid_top_k: usize,
    pub safe_max_occupancy: u32,
    /// Safe zones must start at or above this ratio
    pub safe_floor: f64,
    pub safe_limit: usize,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            bucket_width: 0.05,
            scan_range: [98.0, 102.0],
            avoid_threshold: 3,
            avoid_top_k: 5,
            safe_max_occupancy: 2,
            safe_floor: 98.0,
            safe_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrossDensityConfig {
    /// Bucket width on the reserve-ratio axis
    pub reserve_width: f64,
    /// Bucket width on the bid-ratio axis
    pub bid_width: f64,
    /// Reserve ratios outside [lo, hi) are left out of the grid; the bid axis uses `density.scan_range`
    pub reserve_range: [f64; 2],
    /// Non-empty cells at or below this percentile of non-empty counts are sparse
    pub sparse_percentile: f64,
    pub sparse_limit: usize,
}

impl Default for CrossDensityConfig {
    fn default() -> Self {
        Self {
            reserve_width: 0.2,
            bid_width: 0.2,
            reserve_range: [97.0, 103.0],
            sparse_percentile: 20.0,
            sparse_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RecencyWindow {
    pub days: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecencyConfig {
    /// Cumulative look-back windows; a record counts once for every window it falls into
    pub windows: Vec<RecencyWindow>,
    /// Defaults to the latest timestamp in the data
    pub reference_date: Option<NaiveDate>,
    pub top_k: usize,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                RecencyWindow { days: 30, weight: 0.40 },
                RecencyWindow { days: 90, weight: 0.30 },
                RecencyWindow { days: 180, weight: 0.20 },
                RecencyWindow { days: 365, weight: 0.10 },
            ],
            reference_date: None,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DigitConfig {
    pub top_digits: usize,
    pub top_endings: usize,
    /// Amount endings considered collision prone when adjusting strategy amounts
    pub collision_endings: Vec<u32>,
}

impl Default for DigitConfig {
    fn default() -> Self {
        Self {
            top_digits: 3,
            top_endings: 5,
            collision_endings: vec![0, 500],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgencyConfig {
    /// Mean bucket occupancy from which an agency counts as moderately crowded
    pub moderate_density: f64,
    pub high_density: f64,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            moderate_density: 10.0,
            high_density: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FloorLineConfig {
    /// Distance below the lowest historical winner still considered plausible
    pub margin_below_min: f64,
    /// Added on top of the safe floor for the recommended minimum
    pub cushion: f64,
}

impl Default for FloorLineConfig {
    fn default() -> Self {
        Self {
            margin_below_min: 0.1,
            cushion: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Added below Q1 and above Q3 of the winner ratios
    pub scan_margin: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub step: f64,
    /// Guard rail: candidates with more local competitors are not eligible as optimum
    pub competitor_cap: Option<u32>,
    /// Weight of the normalized local density subtracted from the utility
    pub risk_aversion: f64,
    pub top_k: usize,
    pub win_model: WinModelKind,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            scan_margin: 0.3,
            lower_bound: 98.0,
            upper_bound: 102.0,
            step: 0.001,
            competitor_cap: Some(200),
            risk_aversion: 0.0,
            top_k: 3,
            win_model: WinModelKind::ConditionalScenario,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub low_competition_cap: u32,
    pub profit_competitor_cap: u32,
    /// Floor-clear probability at or above which a strategy is labelled low risk
    pub low_risk_floor_probability: f64,
    pub medium_risk_floor_probability: f64,
    /// Win probability relative to the best in the table, at or above which a strategy is low risk
    pub low_risk_relative_win: f64,
    pub medium_risk_relative_win: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            low_competition_cap: 150,
            profit_competitor_cap: 200,
            low_risk_floor_probability: 0.9,
            medium_risk_floor_probability: 0.5,
            low_risk_relative_win: 0.75,
            medium_risk_relative_win: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub charts: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            charts: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub simulation: SimulationConfig,
    pub history: HistoryConfig,
    pub density: DensityConfig,
    pub cross_density: CrossDensityConfig,
    pub recency: RecencyConfig,
    pub digits: DigitConfig,
    pub agency: AgencyConfig,
    pub floor_line: FloorLineConfig,
    pub optimizer: OptimizerConfig,
    pub strategy: StrategyConfig,
    pub output: OutputConfig,
}

impl Settings {
    /// Load settings from a YAML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, AnalysisError> {
        let settings = match path {
            Some(path) => {
                let yaml = fs::read_to_string(path)?;
                serde_yaml::from_str::<Settings>(&yaml)?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the analysis cannot run with
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let positive = [
            ("simulation.variance_range", self.simulation.variance_range),
            ("density.bucket_width", self.density.bucket_width),
            ("cross_density.reserve_width", self.cross_density.reserve_width),
            ("cross_density.bid_width", self.cross_density.bid_width),
            ("optimizer.step", self.optimizer.step),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::InvalidParameter(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.simulation.variance_range >= 1.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "simulation.variance_range must be below 1.0, got {}",
                self.simulation.variance_range
            )));
        }
        if self.simulation.trials == 0 {
            return Err(AnalysisError::InvalidParameter("simulation.trials must be positive".to_string()));
        }
        if self.optimizer.lower_bound >= self.optimizer.upper_bound {
            return Err(AnalysisError::InvalidParameter(format!(
                "optimizer bounds are inverted: {} >= {}",
                self.optimizer.lower_bound, self.optimizer.upper_bound
            )));
        }
        if self.optimizer.risk_aversion < 0.0 {
            return Err(AnalysisError::InvalidParameter("optimizer.risk_aversion must not be negative".to_string()));
        }
        if let Some([lo, hi]) = self.history.valid_range {
            if lo >= hi {
                return Err(AnalysisError::InvalidParameter(format!("history.valid_range is inverted: {} >= {}", lo, hi)));
            }
        }
        let ranges = [
            ("density.scan_range", self.density.scan_range),
            ("cross_density.reserve_range", self.cross_density.reserve_range),
        ];
        for (name, [lo, hi]) in ranges {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(AnalysisError::InvalidParameter(format!("{} must be a finite, ascending pair, got [{}, {}]", name, lo, hi)));
            }
        }
        if self.strategy.medium_risk_relative_win > self.strategy.low_risk_relative_win {
            return Err(AnalysisError::InvalidParameter(
                "strategy.medium_risk_relative_win exceeds low_risk_relative_win".to_string(),
            ));
        }
        if self.agency.moderate_density > self.agency.high_density {
            return Err(AnalysisError::InvalidParameter(
                "agency.moderate_density exceeds agency.high_density".to_string(),
            ));
        }
        if self.strategy.medium_risk_floor_probability > self.strategy.low_risk_floor_probability {
            return Err(AnalysisError::InvalidParameter(
                "strategy.medium_risk_floor_probability exceeds low_risk_floor_probability".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.simulation.trials, 10_000);
        assert_eq!(settings.density.bucket_width, 0.05);
        assert_eq!(settings.optimizer.competitor_cap, Some(200));
        assert_eq!(settings.strategy.low_competition_cap, 150);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "simulation:\n  trials: 500\n  seed: 7\noptimizer:\n  competitor_cap: null\n  win_model: inverse_competitor").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.simulation.trials, 500);
        assert_eq!(settings.simulation.seed, 7);
        assert_eq!(settings.simulation.preliminary_count, 15);
        assert_eq!(settings.optimizer.competitor_cap, None);
        assert_eq!(settings.optimizer.win_model, WinModelKind::InverseCompetitor);
        assert_eq!(settings.density.avoid_threshold, 3);
    }

    #[test]
    fn test_rejects_non_positive_width() {
        let mut settings = Settings::default();
        settings.density.bucket_width = 0.0;
        assert!(matches!(settings.validate(), Err(AnalysisError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut settings = Settings::default();
        settings.optimizer.lower_bound = 103.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.density.scan_range = [102.0, 98.0];
        assert!(matches!(settings.validate(), Err(AnalysisError::InvalidParameter(_))));

        let mut settings = Settings::default();
        settings.agency.moderate_density = 30.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.strategy.medium_risk_relative_win = 0.9;
        assert!(settings.validate().is_err());
    }
}
