/// Competition density: fixed-width buckets over the bid ratios of every participant.
///
/// Buckets are half-open `[start, start + width)`. Bucket edges are computed as
/// `start + i * width`, and lookups allow a small epsilon so that a ratio printed as 99.35
/// lands in the 99.35 bucket even though `(99.35 - 99.0) / 0.05` is not exactly 7 in floating point.

use serde::Serialize;

use crate::config::DensityConfig;
use crate::error::AnalysisError;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityBucket {
    pub start: f64,
    pub end: f64,
    pub occupancy: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityHistogram {
    pub start: f64,
    pub width: f64,
    pub counts: Vec<u32>,
    /// Finite values that fell inside the scanned range
    pub in_range: usize,
    /// Values outside the range (or not finite); never silently lost
    pub excluded: usize,
}

impl DensityHistogram {
    /// Histogram over the range spanned by the data inside `bounds` = [lo, hi).
    /// Values outside the bounds are counted as excluded, so the bucket count never
    /// exceeds (hi - lo) / width + 1 whatever the data holds.
    pub fn from_rates(rates: &[f64], width: f64, bounds: [f64; 2]) -> Result<Self, AnalysisError> {
        check_width(width)?;
        let [lo, hi] = bounds;
        if !(hi > lo) {
            return Err(AnalysisError::EmptyScanRange { min: lo, max: hi });
        }
        let kept: Vec<f64> = rates
            .iter()
            .copied()
            .filter(|&r| r.is_finite() && r >= lo && r < hi)
            .collect();
        let (min, max) = kept
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &r| (a.min(r), b.max(r)));
        if min > max {
            return Err(AnalysisError::InsufficientSample(format!(
                "no bid ratios inside [{:.3}, {:.3}) to bucket",
                lo, hi
            )));
        }
        let start = (min / width + EPSILON).floor() * width;
        let buckets = ((max - start) / width + EPSILON).floor() as usize + 1;
        let mut histogram = Self::build(&kept, start, width, buckets);
        histogram.excluded += rates.len() - kept.len();
        Ok(histogram)
    }

    /// Histogram over an explicit scan range `[start, end)`
    pub fn with_range(rates: &[f64], width: f64, start: f64, end: f64) -> Result<Self, AnalysisError> {
        check_width(width)?;
        if !(end > start) {
            return Err(AnalysisError::EmptyScanRange { min: start, max: end });
        }
        let buckets = ((end - start) / width - EPSILON).ceil().max(1.0) as usize;
        Ok(Self::build(rates, start, width, buckets))
    }

    fn build(rates: &[f64], start: f64, width: f64, buckets: usize) -> Self {
        let mut histogram = Self {
            start,
            width,
            counts: vec![0; buckets],
            in_range: 0,
            excluded: 0,
        };
        for &rate in rates {
            match histogram.bucket_index(rate) {
                Some(i) => {
                    histogram.counts[i] += 1;
                    histogram.in_range += 1;
                }
                None => histogram.excluded += 1,
            }
        }
        histogram
    }

    pub fn end(&self) -> f64 {
        self.start + self.width * self.counts.len() as f64
    }

    /// Index of the bucket containing `rate`, None outside the scanned range
    pub fn bucket_index(&self, rate: f64) -> Option<usize> {
        if !rate.is_finite() {
            return None;
        }
        let position = ((rate - self.start) / self.width + EPSILON).floor();
        if position < 0.0 {
            return None;
        }
        let index = position as usize;
        (index < self.counts.len()).then_some(index)
    }

    /// Competitors sharing the bucket of `rate`; zero outside the range
    pub fn occupancy(&self, rate: f64) -> u32 {
        self.bucket_index(rate).map_or(0, |i| self.counts[i])
    }

    pub fn bucket(&self, index: usize) -> DensityBucket {
        let start = self.start + self.width * index as f64;
        DensityBucket {
            start,
            end: start + self.width,
            occupancy: self.counts[index],
        }
    }

    pub fn buckets(&self) -> Vec<DensityBucket> {
        (0..self.counts.len()).map(|i| self.bucket(i)).collect()
    }

    pub fn max_occupancy(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn mean_occupancy(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.in_range as f64 / self.counts.len() as f64
    }

    /// Most crowded buckets with occupancy above `threshold`: occupancy desc, start asc
    pub fn avoid_zones(&self, threshold: u32, top_k: usize) -> Vec<DensityBucket> {
        let mut crowded: Vec<DensityBucket> = self.buckets().into_iter().filter(|b| b.occupancy > threshold).collect();
        // buckets() is already ascending by start and the sort is stable
        crowded.sort_by(|a, b| b.occupancy.cmp(&a.occupancy));
        crowded.truncate(top_k);
        crowded
    }

    /// Sparse buckets at or above `floor`: occupancy asc, start asc
    pub fn safe_zones(&self, max_occupancy: u32, floor: f64, limit: usize) -> Vec<DensityBucket> {
        let mut sparse: Vec<DensityBucket> = self
            .buckets()
            .into_iter()
            .filter(|b| b.occupancy <= max_occupancy && b.start >= floor - EPSILON)
            .collect();
        sparse.sort_by(|a, b| a.occupancy.cmp(&b.occupancy));
        sparse.truncate(limit);
        sparse
    }

    pub fn summarize(&self, config: &DensityConfig) -> DensitySummary {
        DensitySummary {
            bucket_width: self.width,
            range: [self.start, self.end()],
            bucket_count: self.counts.len(),
            occupied_buckets: self.counts.iter().filter(|&&c| c > 0).count(),
            in_range: self.in_range,
            excluded: self.excluded,
            mean_occupancy: self.mean_occupancy(),
            max_occupancy: self.max_occupancy(),
            avoid_zones: self.avoid_zones(config.avoid_threshold, config.avoid_top_k),
            safe_zones: self.safe_zones(config.safe_max_occupancy, config.safe_floor, config.safe_limit),
        }
    }
}

fn check_width(width: f64) -> Result<(), AnalysisError> {
    if width.is_finite() && width > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::InvalidParameter(format!("bucket width must be positive, got {}", width)))
    }
}

/// Density block of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensitySummary {
    pub bucket_width: f64,
    pub range: [f64; 2],
    pub bucket_count: usize,
    pub occupied_buckets: usize,
    pub in_range: usize,
    pub excluded: usize,
    pub mean_occupancy: f64,
    pub max_occupancy: u32,
    pub avoid_zones: Vec<DensityBucket>,
    pub safe_zones: Vec<DensityBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_partition_coverage_with_explicit_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let rates: Vec<f64> = (0..2_000).map(|_| rng.gen_range(96.0..104.0)).collect();
        for width in [0.01, 0.05, 0.1, 0.37, 1.0] {
            let histogram = DensityHistogram::with_range(&rates, width, 98.0, 102.0).unwrap();
            let total: u32 = histogram.counts.iter().sum();
            let in_range = rates
                .iter()
                .filter(|&&r| histogram.bucket_index(r).is_some())
                .count();
            assert_eq!(total as usize, histogram.in_range);
            assert_eq!(histogram.in_range, in_range);
            assert_eq!(histogram.in_range + histogram.excluded, rates.len());
        }
    }

    #[test]
    fn test_data_range_includes_extremes() {
        let rates = vec![99.0, 99.01, 99.35, 100.0, 100.049];
        let histogram = DensityHistogram::from_rates(&rates, 0.05, [98.0, 102.0]).unwrap();
        assert_eq!(histogram.excluded, 0);
        assert_eq!(histogram.in_range, 5);
        assert!((histogram.start - 99.0).abs() < 1e-9);
        assert_eq!(histogram.occupancy(99.0), 2);
        assert_eq!(histogram.occupancy(99.35), 1);
        assert_eq!(histogram.occupancy(100.0), 2);
        assert_eq!(histogram.occupancy(120.0), 0);
    }

    #[test]
    fn test_stray_ratios_do_not_grow_the_histogram() {
        // an amount typed into the ratio column
        let rates = vec![99.5, 99.7, 38_805_000.0, 1.0e12, f64::NAN, 12.0];
        let histogram = DensityHistogram::from_rates(&rates, 0.05, [98.0, 102.0]).unwrap();
        assert!(histogram.counts.len() <= 81);
        assert_eq!(histogram.in_range, 2);
        assert_eq!(histogram.excluded, 4);
        assert!(histogram.end() <= 102.0 + 0.05);

        let bounded = DensityHistogram::with_range(&rates, 0.05, 98.0, 102.0).unwrap();
        assert_eq!(bounded.counts.len(), 80);
        assert_eq!(bounded.in_range, 2);
        assert_eq!(bounded.excluded, 4);

        let nothing_inside = DensityHistogram::from_rates(&[1.0e12], 0.05, [98.0, 102.0]);
        assert!(matches!(nothing_inside, Err(AnalysisError::InsufficientSample(_))));
    }

    #[test]
    fn test_half_open_buckets() {
        let histogram = DensityHistogram::with_range(&[99.0, 99.05, 99.0999], 0.05, 99.0, 99.1).unwrap();
        assert_eq!(histogram.counts, vec![1, 2]);
        let outside = DensityHistogram::with_range(&[99.1], 0.05, 99.0, 99.1).unwrap();
        assert_eq!(outside.excluded, 1);
    }

    #[test]
    fn test_avoid_zone_threshold_and_ties() {
        let mut rates = Vec::new();
        rates.extend(std::iter::repeat(99.52).take(4));
        rates.extend(std::iter::repeat(99.12).take(4));
        rates.extend(std::iter::repeat(100.02).take(6));
        rates.extend(std::iter::repeat(99.82).take(3));
        let histogram = DensityHistogram::with_range(&rates, 0.05, 98.0, 102.0).unwrap();
        let avoid = histogram.avoid_zones(3, 5);
        assert_eq!(avoid.len(), 3);
        assert_eq!(avoid[0].occupancy, 6);
        // equal occupancy: ascending start
        assert!((avoid[1].start - 99.10).abs() < 1e-9);
        assert!((avoid[2].start - 99.50).abs() < 1e-9);
    }

    #[test]
    fn test_safe_zones_respect_floor() {
        let rates = vec![97.0, 97.0, 98.02, 98.02, 98.02, 98.07];
        let histogram = DensityHistogram::with_range(&rates, 0.05, 97.0, 98.2).unwrap();
        let safe = histogram.safe_zones(2, 98.0, 10);
        assert!(safe.iter().all(|b| b.start >= 98.0 - 1e-9 && b.occupancy <= 2));
        assert_eq!(safe[0].occupancy, 0);
        assert!(safe.iter().all(|b| (b.start - 98.0).abs() > 1e-9));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            DensityHistogram::from_rates(&[99.0], 0.0, [98.0, 102.0]),
            Err(AnalysisError::InvalidParameter(_))
        ));
        assert!(matches!(
            DensityHistogram::from_rates(&[], 0.05, [98.0, 102.0]),
            Err(AnalysisError::InsufficientSample(_))
        ));
        assert!(matches!(
            DensityHistogram::with_range(&[99.0], 0.05, 100.0, 100.0),
            Err(AnalysisError::EmptyScanRange { .. })
        ));
    }
}
