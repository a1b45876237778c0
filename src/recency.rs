/// Recency-weighted competition density.
///
/// Every look-back window adds its weight to the buckets of the records it contains, so a bid
/// from last week counts in all windows and a bid from ten months ago only in the longest one.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::RecencyConfig;
use crate::density::{DensityBucket, DensityHistogram};
use crate::error::AnalysisError;
use crate::records::HistoricalBidRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowUsage {
    pub days: i64,
    pub weight: f64,
    pub records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedBucket {
    pub start: f64,
    pub end: f64,
    pub weighted_occupancy: f64,
    pub occupancy: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecencyDensity {
    pub reference_date: NaiveDate,
    pub timestamped_records: usize,
    pub windows: Vec<WindowUsage>,
    pub crowded_buckets: Vec<WeightedBucket>,
}

pub fn recency_density(
    records: &[HistoricalBidRecord],
    bucket_width: f64,
    scan_range: [f64; 2],
    config: &RecencyConfig,
) -> Result<RecencyDensity, AnalysisError> {
    let dated: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter_map(|r| r.bid_timestamp.map(|ts| (ts.date(), r.bid_ratio_to_base)))
        .collect();
    let latest = dated.iter().map(|(d, _)| *d).max().ok_or_else(|| {
        AnalysisError::InsufficientSample("no bid timestamps for recency weighting".to_string())
    })?;
    let reference_date = config.reference_date.unwrap_or(latest);

    let rates: Vec<f64> = dated.iter().map(|(_, r)| *r).collect();
    let histogram = DensityHistogram::from_rates(&rates, bucket_width, scan_range)?;
    let mut weighted = vec![0.0; histogram.counts.len()];
    let mut windows = Vec::with_capacity(config.windows.len());

    for window in &config.windows {
        let mut used = 0;
        for (date, rate) in &dated {
            let age = (reference_date - *date).num_days();
            if age < 0 || age > window.days {
                continue;
            }
            if let Some(i) = histogram.bucket_index(*rate) {
                weighted[i] += window.weight;
                used += 1;
            }
        }
        windows.push(WindowUsage {
            days: window.days,
            weight: window.weight,
            records: used,
        });
    }

    let mut crowded: Vec<WeightedBucket> = weighted
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0.0)
        .map(|(i, &w)| {
            let DensityBucket { start, end, occupancy } = histogram.bucket(i);
            WeightedBucket {
                start,
                end,
                weighted_occupancy: w,
                occupancy,
            }
        })
        .collect();
    crowded.sort_by(|a, b| b.weighted_occupancy.total_cmp(&a.weighted_occupancy));
    crowded.truncate(config.top_k);

    Ok(RecencyDensity {
        reference_date,
        timestamped_records: dated.len(),
        windows,
        crowded_buckets: crowded,
    })
}
