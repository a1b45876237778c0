/// Seeded synthetic auction histories for validation scenarios and tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::AnalysisError;
use crate::records::{HistoricalBidRecord, RANK_DISQUALIFIED, RANK_WINNER};

/// Object-safe wrapper so parameter structs can hold any f64 distribution
pub trait DistributionF64 {
    fn sample(&self, rng: &mut StdRng) -> f64;
}

impl<D: Distribution<f64>> DistributionF64 for D {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        Distribution::sample(self, rng)
    }
}

/// Shape of a generated multi-announcement history
pub struct SyntheticHistoryParams {
    pub announcements: usize,
    pub participants: usize,
    /// Reserve ratio of each announcement, percent of base
    pub reserve_ratio_dist: Box<dyn DistributionF64>,
    /// Participant bid ratios, percent of base
    pub bid_ratio_dist: Box<dyn DistributionF64>,
    pub first_date: NaiveDate,
    pub days_between: i64,
    pub agencies: usize,
}

impl SyntheticHistoryParams {
    /// Reserve ratios around 100% with bids clustered slightly above
    pub fn new(announcements: usize, participants: usize) -> Result<Self, AnalysisError> {
        let reserve = Normal::new(100.0, 0.6).map_err(|e| AnalysisError::InvalidParameter(e.to_string()))?;
        let bids = Normal::new(100.2, 0.7).map_err(|e| AnalysisError::InvalidParameter(e.to_string()))?;
        let first_date = NaiveDate::from_ymd_opt(2024, 1, 2)
            .ok_or_else(|| AnalysisError::InvalidParameter("invalid first date".to_string()))?;
        Ok(Self {
            announcements,
            participants,
            reserve_ratio_dist: Box::new(reserve),
            bid_ratio_dist: Box::new(bids),
            first_date,
            days_between: 3,
            agencies: 4,
        })
    }
}

fn announcement_time(params: &SyntheticHistoryParams, index: usize) -> Option<NaiveDateTime> {
    let date = params.first_date + Duration::days(params.days_between * index as i64);
    date.and_hms_opt(10, 0, 0)
}

/// Generate a history where, per announcement, bids below the reserve ratio are disqualified
/// and the rest are ranked ascending so the lowest qualifying bid wins.
pub fn generate_history(params: &SyntheticHistoryParams, seed: u64) -> Vec<HistoricalBidRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(params.announcements * params.participants);

    for a in 0..params.announcements {
        let reserve_ratio = params.reserve_ratio_dist.sample(&mut rng);
        let mut bids: Vec<f64> = (0..params.participants)
            .map(|_| params.bid_ratio_dist.sample(&mut rng))
            .collect();
        bids.sort_by(|x, y| x.total_cmp(y));

        let timestamp = announcement_time(params, a);
        let mut next_rank = RANK_WINNER;
        for bid in bids {
            let rank = if bid < reserve_ratio {
                RANK_DISQUALIFIED
            } else {
                next_rank += 1;
                next_rank - 1
            };
            records.push(HistoricalBidRecord {
                bid_ratio_to_base: bid,
                rank,
                reserve_ratio_to_base: Some(reserve_ratio),
                bid_timestamp: timestamp,
                agency_id: Some(format!("AG-{:02}", a % params.agencies.max(1))),
                announcement_id: Some(format!("ANN-{:04}", a)),
            });
        }
    }
    records
}

/// `count` records uniform in [lo, hi) of which exactly `winners` have rank 1
pub fn uniform_history(count: usize, winners: usize, lo: f64, hi: f64, seed: u64) -> Vec<HistoricalBidRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(lo, hi);
    let mut ranks: Vec<i32> = (0..count)
        .map(|i| if i < winners { RANK_WINNER } else { 2 + (i % 9) as i32 })
        .collect();
    ranks.shuffle(&mut rng);
    ranks
        .into_iter()
        .map(|rank| HistoricalBidRecord::new(Distribution::sample(&dist, &mut rng), rank))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_history_counts() {
        let records = uniform_history(50, 5, 99.0, 101.0, 1);
        assert_eq!(records.len(), 50);
        assert_eq!(records.iter().filter(|r| r.is_winner()).count(), 5);
        assert!(records.iter().all(|r| r.bid_ratio_to_base >= 99.0 && r.bid_ratio_to_base < 101.0));
        assert_eq!(records, uniform_history(50, 5, 99.0, 101.0, 1));
    }

    #[test]
    fn test_generated_history_has_one_winner_per_qualified_announcement() {
        let params = SyntheticHistoryParams::new(30, 12).unwrap();
        let records = generate_history(&params, 11);
        assert_eq!(records.len(), 360);
        for a in 0..30 {
            let id = format!("ANN-{:04}", a);
            let group: Vec<_> = records.iter().filter(|r| r.announcement_id.as_deref() == Some(id.as_str())).collect();
            let winners: Vec<_> = group.iter().filter(|r| r.is_winner()).collect();
            assert!(winners.len() <= 1);
            if let Some(winner) = winners.first() {
                let reserve = winner.reserve_ratio_to_base.unwrap();
                assert!(winner.bid_ratio_to_base >= reserve);
                // nobody qualified bid lower than the winner
                assert!(group
                    .iter()
                    .filter(|r| r.rank != RANK_DISQUALIFIED)
                    .all(|r| r.bid_ratio_to_base >= winner.bid_ratio_to_base));
            }
        }
        assert!(records.iter().all(|r| r.bid_timestamp.is_some()));
    }
}
