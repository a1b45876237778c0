/// Descriptive statistics shared by the simulator, the winner statistics and the floor line.
///
/// Percentiles interpolate linearly between order statistics, standard deviation is the
/// population one (divide by n).

use serde::Serialize;

/// The percentile set reported everywhere in the analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl Percentiles {
    /// Compute from an ascending sorted, non-empty slice
    pub fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            p5: percentile(sorted, 5.0),
            p25: percentile(sorted, 25.0),
            p50: percentile(sorted, 50.0),
            p75: percentile(sorted, 75.0),
            p95: percentile(sorted, 95.0),
        }
    }
}

/// Location and spread summary of one numeric series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub percentiles: Percentiles,
}

impl SummaryStats {
    /// Summarize the finite values of `values`; None when there are none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = mean(&sorted);
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = sorted[0];
        let max = sorted[count - 1];

        Some(Self {
            count,
            mean,
            median: percentile(&sorted, 50.0),
            std_dev: variance.sqrt(),
            min,
            max,
            range: max - min,
            percentiles: Percentiles::from_sorted(&sorted),
        })
    }

    /// std_dev / |mean|, None when the mean is zero
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        safe_ratio(self.std_dev, self.mean.abs())
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolation percentile of an ascending sorted slice, `p` in [0, 100]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// numerator / denominator, or None when the denominator is (numerically) zero
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator.abs() < 1e-12 || !numerator.is_finite() || !denominator.is_finite() {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Pearson correlation of two equally long series; None if either has zero variance
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        covariance += (x - mean_x) * (y - mean_y);
        variance_x += (x - mean_x).powi(2);
        variance_y += (y - mean_y).powi(2);
    }
    safe_ratio(covariance, (variance_x * variance_y).sqrt())
}

/// Round to `decimals` places for presentation
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 50.0) - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
        // position 0.25 * 3 = 0.75
        assert!((percentile(&sorted, 25.0) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_ordering() {
        let values: Vec<f64> = (0..97).map(|i| ((i * 37) % 97) as f64 * 0.013 + 99.0).collect();
        let stats = SummaryStats::from_values(&values).unwrap();
        let p = stats.percentiles;
        assert!(p.p5 <= p.p25);
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p95);
        assert!(stats.min <= p.p5 && p.p95 <= stats.max);
    }

    #[test]
    fn test_summary_stats() {
        let stats = SummaryStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert_eq!(stats.range, 7.0);
    }

    #[test]
    fn test_summary_ignores_non_finite() {
        assert!(SummaryStats::from_values(&[]).is_none());
        assert!(SummaryStats::from_values(&[f64::NAN]).is_none());
        let stats = SummaryStats::from_values(&[1.0, f64::INFINITY, 3.0]).unwrap();
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn test_zero_variance_guards() {
        let stats = SummaryStats::from_values(&[0.0, 0.0]).unwrap();
        assert_eq!(stats.coefficient_of_variation(), None);
        assert_eq!(pearson_correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        let r = pearson_correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }
}
