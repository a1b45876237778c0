/// Two-dimensional competition density over (reserve ratio, bid ratio).
///
/// Each axis is bucketed exactly like the one-dimensional density. Cells that are occupied but
/// thinly so are the jointly sparse regions worth bidding into.

use serde::Serialize;

use crate::config::CrossDensityConfig;
use crate::density::DensityHistogram;
use crate::error::AnalysisError;
use crate::records::HistoricalBidRecord;
use crate::stats::{pearson_correlation, percentile};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossCell {
    pub reserve_start: f64,
    pub reserve_end: f64,
    pub bid_start: f64,
    pub bid_end: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossDensity {
    reserve_axis: DensityHistogram,
    bid_axis: DensityHistogram,
    /// counts[reserve_index][bid_index]
    pub counts: Vec<Vec<u32>>,
    pub pairs: usize,
    pub correlation: Option<f64>,
}

impl CrossDensity {
    /// Build from records carrying a reserve ratio; the rest are ignored, as are pairs
    /// falling outside `bid_range` or the configured reserve range
    pub fn from_records(
        records: &[HistoricalBidRecord],
        bid_range: [f64; 2],
        config: &CrossDensityConfig,
    ) -> Result<Self, AnalysisError> {
        let within = |v: f64, [lo, hi]: [f64; 2]| v.is_finite() && v >= lo && v < hi;
        let (reserves, bids): (Vec<f64>, Vec<f64>) = records
            .iter()
            .filter_map(|r| r.reserve_ratio_to_base.map(|x| (x, r.bid_ratio_to_base)))
            .filter(|&(x, y)| within(x, config.reserve_range) && within(y, bid_range))
            .unzip();
        if reserves.is_empty() {
            return Err(AnalysisError::InsufficientSample(
                "no records carry a reserve ratio for cross density".to_string(),
            ));
        }

        let reserve_axis = DensityHistogram::from_rates(&reserves, config.reserve_width, config.reserve_range)?;
        let bid_axis = DensityHistogram::from_rates(&bids, config.bid_width, bid_range)?;
        let mut counts = vec![vec![0u32; bid_axis.counts.len()]; reserve_axis.counts.len()];
        for (x, y) in reserves.iter().zip(&bids) {
            if let (Some(i), Some(j)) = (reserve_axis.bucket_index(*x), bid_axis.bucket_index(*y)) {
                counts[i][j] += 1;
            }
        }

        Ok(Self {
            correlation: pearson_correlation(&reserves, &bids),
            pairs: reserves.len(),
            reserve_axis,
            bid_axis,
            counts,
        })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.reserve_axis.counts.len(), self.bid_axis.counts.len())
    }

    fn cell(&self, i: usize, j: usize) -> CrossCell {
        let x = self.reserve_axis.bucket(i);
        let y = self.bid_axis.bucket(j);
        CrossCell {
            reserve_start: x.start,
            reserve_end: x.end,
            bid_start: y.start,
            bid_end: y.end,
            count: self.counts[i][j],
        }
    }

    fn occupied_cells(&self) -> Vec<CrossCell> {
        let (nx, ny) = self.dimensions();
        (0..nx)
            .flat_map(|i| (0..ny).map(move |j| (i, j)))
            .filter(|&(i, j)| self.counts[i][j] > 0)
            .map(|(i, j)| self.cell(i, j))
            .collect()
    }

    /// Occupied cells at or below the given percentile of occupied-cell counts,
    /// ordered by count then reserve then bid axis
    pub fn sparse_cells(&self, sparse_percentile: f64, limit: usize) -> (f64, Vec<CrossCell>) {
        let occupied = self.occupied_cells();
        let mut sorted: Vec<f64> = occupied.iter().map(|c| c.count as f64).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let threshold = percentile(&sorted, sparse_percentile);

        // occupied_cells() is ordered by reserve then bid, the stable sort keeps that within a count
        let mut sparse: Vec<CrossCell> = occupied.into_iter().filter(|c| c.count as f64 <= threshold).collect();
        sparse.sort_by_key(|c| c.count);
        sparse.truncate(limit);
        (threshold, sparse)
    }

    pub fn densest_cells(&self, limit: usize) -> Vec<CrossCell> {
        let mut cells = self.occupied_cells();
        cells.sort_by(|a, b| b.count.cmp(&a.count));
        cells.truncate(limit);
        cells
    }

    pub fn summarize(&self, config: &CrossDensityConfig) -> CrossDensitySummary {
        let (sparse_threshold, sparse_cells) = self.sparse_cells(config.sparse_percentile, config.sparse_limit);
        let (nx, ny) = self.dimensions();
        CrossDensitySummary {
            pairs: self.pairs,
            reserve_range: [self.reserve_axis.start, self.reserve_axis.end()],
            bid_range: [self.bid_axis.start, self.bid_axis.end()],
            grid: [nx, ny],
            correlation: self.correlation,
            sparse_threshold,
            sparse_cells,
            densest_cells: self.densest_cells(config.sparse_limit.min(5)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossDensitySummary {
    pub pairs: usize,
    pub reserve_range: [f64; 2],
    pub bid_range: [f64; 2],
    pub grid: [usize; 2],
    /// None when either axis has no variance
    pub correlation: Option<f64>,
    pub sparse_threshold: f64,
    pub sparse_cells: Vec<CrossCell>,
    pub densest_cells: Vec<CrossCell>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIDS: [f64; 2] = [98.0, 102.0];

    fn record(reserve: f64, bid: f64) -> HistoricalBidRecord {
        let mut r = HistoricalBidRecord::new(bid, 2);
        r.reserve_ratio_to_base = Some(reserve);
        r
    }

    #[test]
    fn test_counts_cover_all_pairs() {
        let records: Vec<_> = (0..60)
            .map(|i| record(99.0 + (i % 10) as f64 * 0.1, 99.5 + (i % 7) as f64 * 0.13))
            .collect();
        let cross = CrossDensity::from_records(&records, BIDS, &CrossDensityConfig::default()).unwrap();
        let total: u32 = cross.counts.iter().flatten().sum();
        assert_eq!(total as usize, 60);
        assert_eq!(cross.pairs, 60);
    }

    #[test]
    fn test_sparse_cells_ordering() {
        let mut records = Vec::new();
        records.extend((0..10).map(|_| record(99.1, 99.1)));
        records.extend((0..5).map(|_| record(99.1, 99.9)));
        records.push(record(99.9, 99.1));
        records.push(record(99.5, 99.5));
        let cross = CrossDensity::from_records(&records, BIDS, &CrossDensityConfig::default()).unwrap();
        let (threshold, sparse) = cross.sparse_cells(20.0, 10);
        // occupied counts [1, 1, 5, 10] -> 20th percentile 1.0
        assert!((threshold - 1.0).abs() < 1e-12);
        assert_eq!(sparse.len(), 2);
        assert!(sparse[0].reserve_start < sparse[1].reserve_start);
        assert!(sparse.iter().all(|c| c.count == 1));
    }

    #[test]
    fn test_constant_axis_has_no_correlation() {
        let records: Vec<_> = (0..5).map(|i| record(100.0, 99.0 + i as f64 * 0.3)).collect();
        let cross = CrossDensity::from_records(&records, BIDS, &CrossDensityConfig::default()).unwrap();
        assert_eq!(cross.correlation, None);
    }

    #[test]
    fn test_out_of_range_pairs_are_dropped() {
        let mut records: Vec<_> = (0..8).map(|i| record(99.0 + i as f64 * 0.2, 99.2 + i as f64 * 0.1)).collect();
        records.push(record(1.0e12, 99.5));
        records.push(record(99.5, 38_805_000.0));
        let cross = CrossDensity::from_records(&records, BIDS, &CrossDensityConfig::default()).unwrap();
        assert_eq!(cross.pairs, 8);
        let (nx, ny) = cross.dimensions();
        assert!(nx <= 61 && ny <= 81);
        let total: u32 = cross.counts.iter().flatten().sum();
        assert_eq!(total, 8);
    }

    #[test]
    fn test_missing_reserve_ratio_is_absence() {
        let records = vec![HistoricalBidRecord::new(99.0, 1)];
        let err = CrossDensity::from_records(&records, BIDS, &CrossDensityConfig::default()).unwrap_err();
        assert!(err.is_absence());
    }
}
