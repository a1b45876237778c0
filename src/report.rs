/// The analysis report: one immutable block per pipeline phase, composed at the end.

use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::agency::AgencyPatterns;
use crate::cross_density::CrossDensitySummary;
use crate::density::DensitySummary;
use crate::digits::DigitPatterns;
use crate::error::{AnalysisError, Availability};
use crate::floor_line::FloorLine;
use crate::optimizer::OptimizerSummary;
use crate::recency::RecencyDensity;
use crate::records::{DatasetColumns, HistoricalDataset};
use crate::reserve_price::SimulationSummary;
use crate::strategies::StrategyRecommendation;
use crate::winners::WinnerStatistics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnouncementInfo {
    pub base_amount: u64,
    pub agency_floor_rate: f64,
    pub data_file: String,
    pub analyzed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub records: usize,
    /// Records left after the optional valid-range filter
    pub analyzed_records: usize,
    pub winners: usize,
    pub disqualified: usize,
    pub skipped_rows: usize,
    pub has_reserve_ratio: bool,
    pub has_timestamp: bool,
    pub has_agency: bool,
    pub has_announcement: bool,
}

impl HistorySummary {
    pub fn new(dataset: &HistoricalDataset, analyzed_records: usize) -> Self {
        let DatasetColumns {
            reserve_ratio,
            timestamp,
            agency,
            announcement,
        } = dataset.columns.clone();
        Self {
            records: dataset.records.len(),
            analyzed_records,
            winners: dataset.records.iter().filter(|r| r.is_winner()).count(),
            disqualified: dataset.disqualified_count(),
            skipped_rows: dataset.skipped_rows,
            has_reserve_ratio: reserve_ratio,
            has_timestamp: timestamp,
            has_agency: agency,
            has_announcement: announcement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySet {
    pub strategies: Vec<StrategyRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub announcement: AnnouncementInfo,
    pub history: Availability<HistorySummary>,
    pub simulation: SimulationSummary,
    pub winner_statistics: Availability<WinnerStatistics>,
    pub density: Availability<DensitySummary>,
    pub cross_density: Availability<CrossDensitySummary>,
    pub recency: Availability<RecencyDensity>,
    pub digit_patterns: Availability<DigitPatterns>,
    pub agency_patterns: Availability<AgencyPatterns>,
    pub floor_line: FloorLine,
    pub optimizer: Availability<OptimizerSummary>,
    pub strategies: Availability<StrategySet>,
}

impl AnalysisReport {
    /// Sections without which no recommendation could be made
    pub fn missing_core_sections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.history.is_available() {
            missing.push("history");
        }
        if !self.winner_statistics.is_available() {
            missing.push("winner_statistics");
        }
        if !self.density.is_available() {
            missing.push("density");
        }
        if !self.strategies.is_available() {
            missing.push("strategies");
        }
        missing
    }
}

/// `<dir>/bidding_analysis_<round(rate * 1000)>.json`
pub fn analysis_output_path(output_dir: &Path, agency_floor_rate: f64) -> PathBuf {
    output_dir.join(format!("bidding_analysis_{}.json", (agency_floor_rate * 1000.0).round() as i64))
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
