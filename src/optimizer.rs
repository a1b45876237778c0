/// Expected-utility scan over candidate bid rates.
///
/// utility(r) = win_probability(r) * profit_rate(r) - risk_aversion * C(r) / max C
///
/// where profit_rate(r) = (100 - r) / 100 is deliberately left unclamped, so bidding above
/// the base amount shows up as a negative margin.

use serde::Serialize;

use crate::config::OptimizerConfig;
use crate::error::AnalysisError;
use crate::stats::{percentile, round_to};
use crate::win_models::{ScanContext, WinProbabilityModelTrait};

const GRID_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub rate: f64,
    pub floor_clear_probability: f64,
    pub competitors: u32,
    pub win_probability: f64,
    pub profit_rate: f64,
    pub utility: f64,
}

pub fn profit_rate(rate: f64) -> f64 {
    (100.0 - rate) / 100.0
}

/// Winners' interquartile range widened by the margin, clipped to the global bounds
pub fn scan_range(winner_ratios: &[f64], config: &OptimizerConfig) -> Result<(f64, f64), AnalysisError> {
    let mut sorted: Vec<f64> = winner_ratios.iter().copied().filter(|r| r.is_finite()).collect();
    if sorted.is_empty() {
        return Err(AnalysisError::InsufficientSample("no winner ratios to derive a scan range".to_string()));
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let low = (percentile(&sorted, 25.0) - config.scan_margin).max(config.lower_bound);
    let high = (percentile(&sorted, 75.0) + config.scan_margin).min(config.upper_bound);
    if high <= low {
        return Err(AnalysisError::EmptyScanRange { min: low, max: high });
    }
    Ok((low, high))
}

/// Half-open grid `[low, high)` with the given step
pub fn candidate_rates(low: f64, high: f64, step: f64) -> Vec<f64> {
    let count = ((high - low) / step - GRID_EPSILON).ceil().max(0.0) as usize;
    (0..count).map(|i| round_to(low + step * i as f64, 6)).collect()
}

/// Every scanned candidate, ascending by rate
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTable {
    pub model: String,
    pub scan_range: (f64, f64),
    pub candidates: Vec<Candidate>,
}

impl CandidateTable {
    pub fn scan(
        low: f64,
        high: f64,
        config: &OptimizerConfig,
        model: &dyn WinProbabilityModelTrait,
        context: &ScanContext,
    ) -> Result<Self, AnalysisError> {
        let rates = candidate_rates(low, high, config.step);
        if rates.is_empty() {
            return Err(AnalysisError::EmptyScanRange { min: low, max: high });
        }
        let max_competitors = context.density().max_occupancy();

        let candidates = rates
            .into_iter()
            .map(|rate| {
                let competitors = context.local_competitors(rate);
                let win_probability = model.win_probability(rate, context);
                let profit = profit_rate(rate);
                let crowding = if max_competitors > 0 {
                    competitors as f64 / max_competitors as f64
                } else {
                    0.0
                };
                Candidate {
                    rate,
                    floor_clear_probability: context.floor_clear_probability(rate),
                    competitors,
                    win_probability,
                    profit_rate: profit,
                    utility: win_probability * profit - config.risk_aversion * crowding,
                }
            })
            .collect();

        Ok(Self {
            model: model.get_model_type(),
            scan_range: (low, high),
            candidates,
        })
    }

    /// Candidates with at most `cap` competitors, all of them when `cap` is None
    pub fn within_cap(&self, cap: Option<u32>) -> Vec<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| cap.map_or(true, |cap| c.competitors <= cap))
            .collect()
    }
}

/// Highest utility; the table is ascending so keeping the first maximum breaks ties to the lowest rate
pub fn best_by_utility<'a>(candidates: &[&'a Candidate]) -> Option<&'a Candidate> {
    let mut best: Option<&'a Candidate> = None;
    for &candidate in candidates {
        if best.map_or(true, |b| candidate.utility > b.utility) {
            best = Some(candidate);
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOutcome {
    pub table: CandidateTable,
    pub optimum: Candidate,
    pub top_candidates: Vec<Candidate>,
    pub eligible_candidates: usize,
    /// No candidate satisfied the competitor cap, so the whole table was used
    pub guard_relaxed: bool,
}

pub fn optimize(
    winner_ratios: &[f64],
    config: &OptimizerConfig,
    model: &dyn WinProbabilityModelTrait,
    context: &ScanContext,
) -> Result<OptimizerOutcome, AnalysisError> {
    let (low, high) = scan_range(winner_ratios, config)?;
    let table = CandidateTable::scan(low, high, config, model, context)?;

    let mut eligible = table.within_cap(config.competitor_cap);
    let guard_relaxed = eligible.is_empty();
    if guard_relaxed {
        eligible = table.within_cap(None);
    }

    let optimum = *best_by_utility(&eligible).ok_or(AnalysisError::EmptyScanRange { min: low, max: high })?;

    let mut ranked: Vec<Candidate> = eligible.iter().map(|&&c| c).collect();
    // ascending rate already, stable sort keeps the lower rate first among equal utilities
    ranked.sort_by(|a, b| b.utility.total_cmp(&a.utility));
    ranked.truncate(config.top_k);

    Ok(OptimizerOutcome {
        optimum,
        top_candidates: ranked,
        eligible_candidates: eligible.len(),
        guard_relaxed,
        table,
    })
}

/// Optimizer block of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerSummary {
    pub model: String,
    pub scan_range: [f64; 2],
    pub step: f64,
    pub candidates_scanned: usize,
    pub competitor_cap: Option<u32>,
    pub eligible_candidates: usize,
    pub guard_relaxed: bool,
    pub risk_aversion: f64,
    pub optimum: Candidate,
    pub top_candidates: Vec<Candidate>,
}

impl OptimizerOutcome {
    pub fn summarize(&self, config: &OptimizerConfig) -> OptimizerSummary {
        OptimizerSummary {
            model: self.table.model.clone(),
            scan_range: [self.table.scan_range.0, self.table.scan_range.1],
            step: config.step,
            candidates_scanned: self.table.candidates.len(),
            competitor_cap: config.competitor_cap,
            eligible_candidates: self.eligible_candidates,
            guard_relaxed: self.guard_relaxed,
            risk_aversion: config.risk_aversion,
            optimum: self.optimum,
            top_candidates: self.top_candidates.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::DensityHistogram;
    use crate::win_models::{WinModelConditionalScenario, WinModelInverseCompetitor};

    fn winners() -> Vec<f64> {
        (0..20).map(|i| 99.5 + i as f64 * 0.05).collect()
    }

    #[test]
    fn test_scan_range_clipped() {
        let config = OptimizerConfig::default();
        let (low, high) = scan_range(&winners(), &config).unwrap();
        // Q1 = 99.7375, Q3 = 100.2125
        assert!((low - 99.4375).abs() < 1e-9);
        assert!((high - 100.5125).abs() < 1e-9);

        let wide: Vec<f64> = vec![96.0, 97.0, 103.0, 104.0];
        let (low, high) = scan_range(&wide, &config).unwrap();
        assert_eq!((low, high), (98.0, 102.0));
    }

    #[test]
    fn test_empty_scan_range() {
        let config = OptimizerConfig::default();
        let result = scan_range(&[90.0, 90.1], &config);
        assert!(matches!(result, Err(AnalysisError::EmptyScanRange { .. })));
        assert!(matches!(scan_range(&[], &config), Err(AnalysisError::InsufficientSample(_))));
    }

    #[test]
    fn test_grid_is_half_open() {
        let rates = candidate_rates(99.0, 99.01, 0.001);
        assert_eq!(rates.len(), 10);
        assert_eq!(rates[0], 99.0);
        assert_eq!(rates[9], 99.009);
    }

    #[test]
    fn test_profit_strictly_decreases() {
        let competitors: Vec<f64> = (0..300).map(|i| 99.0 + (i % 60) as f64 * 0.03).collect();
        let density = DensityHistogram::from_rates(&competitors, 0.05, [98.0, 102.0]).unwrap();
        let floors: Vec<f64> = (0..500).map(|i| 99.0 + i as f64 * 0.003).collect();
        let context = ScanContext::new(&floors, &competitors, &density);
        let config = OptimizerConfig::default();
        let table = CandidateTable::scan(99.0, 101.0, &config, &WinModelConditionalScenario, &context).unwrap();
        for pair in table.candidates.windows(2) {
            assert!(pair[0].rate < pair[1].rate);
            assert!(pair[0].profit_rate > pair[1].profit_rate);
        }
        // above the base amount the margin is negative, not clamped
        let last = table.candidates.last().unwrap();
        assert!(last.rate > 100.0 && last.profit_rate < 0.0);
    }

    #[test]
    fn test_probabilities_are_fractions() {
        let competitors: Vec<f64> = (0..100).map(|i| 99.2 + (i % 25) as f64 * 0.04).collect();
        let density = DensityHistogram::from_rates(&competitors, 0.05, [98.0, 102.0]).unwrap();
        let floors: Vec<f64> = (0..200).map(|i| 99.3 + i as f64 * 0.004).collect();
        let context = ScanContext::new(&floors, &competitors, &density);
        let outcome = optimize(&winners(), &OptimizerConfig::default(), &WinModelInverseCompetitor, &context).unwrap();
        for c in &outcome.table.candidates {
            assert!((0.0..=1.0).contains(&c.win_probability));
            assert!((0.0..=1.0).contains(&c.floor_clear_probability));
            assert!(c.win_probability <= c.floor_clear_probability + 1e-12);
        }
        assert_eq!(outcome.top_candidates.len(), 3);
        assert_eq!(outcome.top_candidates[0], outcome.optimum);
        assert!(!outcome.guard_relaxed);
    }

    #[test]
    fn test_guard_relaxed_when_every_candidate_is_crowded() {
        let competitors: Vec<f64> = (0..4_000).map(|i| 99.0 + (i % 400) as f64 * 0.005).collect();
        let density = DensityHistogram::from_rates(&competitors, 0.05, [98.0, 102.0]).unwrap();
        let floors = vec![99.0; 10];
        let context = ScanContext::new(&floors, &competitors, &density);
        let mut config = OptimizerConfig::default();
        config.competitor_cap = Some(5);
        let outcome = optimize(&winners(), &config, &WinModelInverseCompetitor, &context).unwrap();
        assert!(outcome.guard_relaxed);
        assert_eq!(outcome.eligible_candidates, outcome.table.candidates.len());
    }

    #[test]
    fn test_ties_go_to_lowest_rate() {
        // no scenario floor is ever cleared: every utility is zero
        let density = DensityHistogram::from_rates(&[99.0], 0.05, [98.0, 102.0]).unwrap();
        let context = ScanContext::new(&[150.0; 4], &[], &density);
        let outcome = optimize(&winners(), &OptimizerConfig::default(), &WinModelConditionalScenario, &context).unwrap();
        assert_eq!(outcome.optimum.utility, 0.0);
        assert_eq!(outcome.optimum.rate, outcome.table.candidates[0].rate);
        assert_eq!(outcome.top_candidates[1].rate, outcome.table.candidates[1].rate);
    }

    #[test]
    fn test_risk_aversion_penalizes_crowding() {
        let mut competitors: Vec<f64> = vec![99.81; 50];
        competitors.extend([99.6, 100.1]);
        let density = DensityHistogram::from_rates(&competitors, 0.05, [98.0, 102.0]).unwrap();
        let context = ScanContext::new(&vec![99.0; 10], &competitors, &density);
        let mut config = OptimizerConfig::default();
        config.risk_aversion = 1.0;
        let table = CandidateTable::scan(99.7, 99.9, &config, &WinModelInverseCompetitor, &context).unwrap();
        let crowded = table.candidates.iter().find(|c| c.competitors == 50).unwrap();
        assert!(crowded.utility < 0.0);
    }
}
