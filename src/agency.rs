/// Per-agency competition patterns.
///
/// Records are grouped by their agency column, or by the issuing agency implied by the
/// announcement number when the export has no agency column. Each group gets its own winner
/// statistics and a density over the scan range, so an agency whose bidders cluster differently
/// from the pool stands out.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{AgencyConfig, DensityConfig};
use crate::density::{DensityBucket, DensityHistogram};
use crate::error::AnalysisError;
use crate::records::HistoricalBidRecord;
use crate::stats::SummaryStats;

pub const UNKNOWN_AGENCY: &str = "unknown";

/// Issuing agency implied by the shape of an announcement number
pub fn agency_from_announcement(announcement_id: &str) -> &'static str {
    let id = announcement_id.trim();
    if id.starts_with('R') {
        "public_procurement_service"
    } else if id.starts_with("202") && id.chars().count() > 10 {
        "heritage_administration"
    } else if id.starts_with('E') {
        "other_e"
    } else {
        "other"
    }
}

/// Grouping key of one record: the agency column first, the announcement number second
pub fn agency_key(record: &HistoricalBidRecord) -> String {
    if let Some(agency) = record.agency_id.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        return agency.to_string();
    }
    match record.announcement_id.as_deref() {
        Some(id) if !id.trim().is_empty() => agency_from_announcement(id).to_string(),
        _ => UNKNOWN_AGENCY.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityLevel {
    Low,
    Moderate,
    High,
}

impl DensityLevel {
    pub fn from_mean_occupancy(mean: f64, config: &AgencyConfig) -> Self {
        if mean < config.moderate_density {
            DensityLevel::Low
        } else if mean < config.high_density {
            DensityLevel::Moderate
        } else {
            DensityLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyProfile {
    pub agency: String,
    pub records: usize,
    pub winners: usize,
    pub winner_median: Option<f64>,
    pub winner_mean: Option<f64>,
    pub winner_std_dev: Option<f64>,
    pub mean_density: f64,
    pub max_density: u32,
    /// Emptiest bucket of the scan range, the lowest one on ties
    pub quietest_bucket: DensityBucket,
    pub density_level: DensityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyPatterns {
    pub agency_count: usize,
    /// True when agencies were inferred from announcement numbers
    pub inferred: bool,
    /// Ordered by record count, then agency name
    pub agencies: Vec<AgencyProfile>,
}

fn profile(
    agency: String,
    records: &[&HistoricalBidRecord],
    density: &DensityConfig,
    config: &AgencyConfig,
) -> Result<AgencyProfile, AnalysisError> {
    let rates: Vec<f64> = records.iter().map(|r| r.bid_ratio_to_base).collect();
    let winner_rates: Vec<f64> = records
        .iter()
        .filter(|r| r.is_winner())
        .map(|r| r.bid_ratio_to_base)
        .collect();
    let winners = SummaryStats::from_values(&winner_rates);

    let [lo, hi] = density.scan_range;
    let histogram = DensityHistogram::with_range(&rates, density.bucket_width, lo, hi)?;
    let quietest = histogram
        .counts
        .iter()
        .enumerate()
        .min_by_key(|&(i, &count)| (count, i))
        .map_or(0, |(i, _)| i);
    let mean_density = histogram.mean_occupancy();

    Ok(AgencyProfile {
        agency,
        records: records.len(),
        winners: winner_rates.len(),
        winner_median: winners.as_ref().map(|s| s.median),
        winner_mean: winners.as_ref().map(|s| s.mean),
        winner_std_dev: winners.as_ref().map(|s| s.std_dev),
        mean_density,
        max_density: histogram.max_occupancy(),
        quietest_bucket: histogram.bucket(quietest),
        density_level: DensityLevel::from_mean_occupancy(mean_density, config),
    })
}

pub fn agency_patterns(
    records: &[HistoricalBidRecord],
    density: &DensityConfig,
    config: &AgencyConfig,
) -> Result<AgencyPatterns, AnalysisError> {
    let has_agency = records.iter().any(|r| r.agency_id.is_some());
    let has_announcement = records.iter().any(|r| r.announcement_id.is_some());
    if !has_agency && !has_announcement {
        return Err(AnalysisError::InsufficientSample(
            "no agency or announcement number column for per-agency patterns".to_string(),
        ));
    }

    let mut groups: BTreeMap<String, Vec<&HistoricalBidRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(agency_key(record)).or_default().push(record);
    }

    let mut agencies = groups
        .into_iter()
        .map(|(agency, group)| profile(agency, &group, density, config))
        .collect::<Result<Vec<_>, _>>()?;
    // BTreeMap order is by name, the stable sort keeps it within a count
    agencies.sort_by(|a, b| b.records.cmp(&a.records));

    Ok(AgencyPatterns {
        agency_count: agencies.len(),
        inferred: !has_agency,
        agencies,
    })
}
