/// Statistics of historical first-place bid ratios.

use serde::Serialize;

use crate::error::AnalysisError;
use crate::records::{filter_winners, HistoricalBidRecord};
use crate::stats::{Percentiles, SummaryStats};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnerStatistics {
    pub data_count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
    /// None when the mean is zero
    pub coefficient_of_variation: Option<f64>,
    /// False when fewer winners than the configured minimum were available
    pub reliable: bool,
    pub caveat: Option<String>,
}

impl WinnerStatistics {
    /// Winners' ratios sorted ascending, as used by the optimizer scan range
    pub fn winner_ratios(records: &[HistoricalBidRecord]) -> Vec<f64> {
        let mut ratios: Vec<f64> = filter_winners(records).iter().map(|r| r.bid_ratio_to_base).collect();
        ratios.sort_by(|a, b| a.total_cmp(b));
        ratios
    }
}

/// Compute winner statistics. No winners is an `InsufficientSample` error, which the
/// pipeline reports as an unavailable section.
pub fn winner_statistics(records: &[HistoricalBidRecord], min_sample: usize) -> Result<WinnerStatistics, AnalysisError> {
    let ratios = WinnerStatistics::winner_ratios(records);
    let summary = SummaryStats::from_values(&ratios).ok_or_else(|| {
        AnalysisError::InsufficientSample(format!("no first-place records among {} rows", records.len()))
    })?;

    let reliable = summary.count >= min_sample;
    let caveat = if reliable {
        None
    } else {
        Some(format!(
            "only {} winners (minimum {}), statistics are unreliable",
            summary.count, min_sample
        ))
    };

    Ok(WinnerStatistics {
        data_count: summary.count,
        mean: summary.mean,
        median: summary.median,
        std_dev: summary.std_dev,
        min: summary.min,
        max: summary.max,
        percentiles: summary.percentiles,
        coefficient_of_variation: summary.coefficient_of_variation(),
        reliable,
        caveat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Availability;
    use crate::synthetic::uniform_history;

    #[test]
    fn test_fifty_records_five_winners() {
        let records = uniform_history(50, 5, 99.0, 101.0, 7);
        let stats = winner_statistics(&records, 10).unwrap();
        assert_eq!(stats.data_count, 5);
        let p = stats.percentiles;
        for value in [p.p5, p.p25, p.p50, p.p75, p.p95] {
            assert!(value > 99.0 && value < 101.0);
        }
        assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
        assert!(!stats.reliable);
        assert!(stats.caveat.is_some());
    }

    #[test]
    fn test_empty_history_is_unavailable() {
        let section = Availability::from_result(winner_statistics(&[], 10)).unwrap();
        assert!(!section.is_available());
    }

    #[test]
    fn test_no_winners_is_unavailable() {
        let records = vec![HistoricalBidRecord::new(99.5, 2), HistoricalBidRecord::new(98.0, -1)];
        let section = Availability::from_result(winner_statistics(&records, 10)).unwrap();
        assert!(!section.is_available());
    }

    #[test]
    fn test_reliable_sample() {
        let records = uniform_history(200, 40, 99.0, 101.0, 3);
        let stats = winner_statistics(&records, 10).unwrap();
        assert_eq!(stats.data_count, 40);
        assert!(stats.reliable);
        assert!(stats.caveat.is_none());
        assert!(stats.min >= 99.0 && stats.max <= 101.0);
    }
}
