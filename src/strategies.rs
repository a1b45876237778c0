/// Strategy assembly: named bid recommendations picked from the optimizer's candidate table.
///
/// Selection is a pure function of the table; the same table always gives the same strategies.

use serde::Serialize;

use crate::config::StrategyConfig;
use crate::digits::{amount_ending, implied_amount, DigitPatterns};
use crate::optimizer::{Candidate, OptimizerOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ExpectedUtilityOptimal,
    CompetitionAverse,
    ProfitMaximizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_thresholds(value: f64, low: f64, medium: f64) -> Self {
        if value >= low {
            RiskLevel::Low
        } else if value >= medium {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn from_floor_probability(probability: f64, config: &StrategyConfig) -> Self {
        Self::from_thresholds(probability, config.low_risk_floor_probability, config.medium_risk_floor_probability)
    }

    /// `relative_win` is the win probability divided by the best one in the table
    pub fn from_relative_win(relative_win: f64, config: &StrategyConfig) -> Self {
        Self::from_thresholds(relative_win, config.low_risk_relative_win, config.medium_risk_relative_win)
    }

    /// The worse of the floor-clearing and the relative-win label
    pub fn assess(candidate: &Candidate, best_win_probability: f64, config: &StrategyConfig) -> Self {
        let relative_win = if best_win_probability > 0.0 {
            candidate.win_probability / best_win_probability
        } else {
            0.0
        };
        Self::from_floor_probability(candidate.floor_clear_probability, config)
            .max(Self::from_relative_win(relative_win, config))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyRecommendation {
    pub kind: StrategyKind,
    pub name: String,
    pub rate: f64,
    pub bid_amount: u64,
    /// Same bid with a rarely used amount ending, when the plain amount ends in a common one
    pub adjusted_bid_amount: Option<u64>,
    pub win_probability: f64,
    pub floor_clear_probability: f64,
    pub profit_rate: f64,
    pub expected_utility: f64,
    pub competitors: u32,
    pub risk: RiskLevel,
    pub rationale: String,
}

/// Trait for strategies selecting one candidate of the scanned table
pub trait StrategySelectorTrait {
    fn select(&self, outcome: &OptimizerOutcome) -> Option<Candidate>;

    fn get_strategy_kind(&self) -> StrategyKind;

    fn get_strategy_name(&self) -> String;

    fn rationale(&self, candidate: &Candidate) -> String;
}

/// The optimizer's own optimum
pub struct StrategyExpectedUtility;

impl StrategySelectorTrait for StrategyExpectedUtility {
    fn select(&self, outcome: &OptimizerOutcome) -> Option<Candidate> {
        Some(outcome.optimum)
    }

    fn get_strategy_kind(&self) -> StrategyKind {
        StrategyKind::ExpectedUtilityOptimal
    }

    fn get_strategy_name(&self) -> String {
        "Expected-utility optimal".to_string()
    }

    fn rationale(&self, candidate: &Candidate) -> String {
        format!(
            "Highest expected utility ({:.6}) in the scan: win probability {:.2}% at a {:.3}% margin",
            candidate.utility,
            candidate.win_probability * 100.0,
            candidate.profit_rate * 100.0
        )
    }
}

/// Fewest competitors in the candidate's bucket
pub struct StrategyCompetitionAverse {
    pub competitor_cap: u32,
}

impl StrategySelectorTrait for StrategyCompetitionAverse {
    fn select(&self, outcome: &OptimizerOutcome) -> Option<Candidate> {
        let mut pool = outcome.table.within_cap(Some(self.competitor_cap));
        if pool.is_empty() {
            pool = outcome.table.within_cap(None);
        }
        pool.into_iter()
            .min_by(|a, b| {
                a.competitors
                    .cmp(&b.competitors)
                    .then_with(|| b.utility.total_cmp(&a.utility))
                    .then_with(|| a.rate.total_cmp(&b.rate))
            })
            .copied()
    }

    fn get_strategy_kind(&self) -> StrategyKind {
        StrategyKind::CompetitionAverse
    }

    fn get_strategy_name(&self) -> String {
        "Competition-averse".to_string()
    }

    fn rationale(&self, candidate: &Candidate) -> String {
        format!(
            "Least crowded rate in the scan: {} historical bids share its {:.3}% bucket",
            candidate.competitors, candidate.rate
        )
    }
}

/// Widest margin among moderately crowded candidates
pub struct StrategyProfitMaximizing {
    pub competitor_cap: u32,
}

impl StrategySelectorTrait for StrategyProfitMaximizing {
    fn select(&self, outcome: &OptimizerOutcome) -> Option<Candidate> {
        let by_profit = |a: &&Candidate, b: &&Candidate| a.profit_rate.total_cmp(&b.profit_rate);
        let mut pool = outcome.table.within_cap(Some(self.competitor_cap));
        if pool.is_empty() {
            pool = outcome.table.within_cap(None);
        }
        pool.into_iter().max_by(by_profit).copied()
    }

    fn get_strategy_kind(&self) -> StrategyKind {
        StrategyKind::ProfitMaximizing
    }

    fn get_strategy_name(&self) -> String {
        "Profit-maximizing".to_string()
    }

    fn rationale(&self, candidate: &Candidate) -> String {
        format!(
            "Widest margin ({:.3}%) among moderately crowded rates, winning in {:.2}% of simulated draws",
            candidate.profit_rate * 100.0,
            candidate.win_probability * 100.0
        )
    }
}

/// The selectors in presentation order
pub fn default_selectors(config: &StrategyConfig) -> Vec<Box<dyn StrategySelectorTrait>> {
    vec![
        Box::new(StrategyExpectedUtility),
        Box::new(StrategyCompetitionAverse {
            competitor_cap: config.low_competition_cap,
        }),
        Box::new(StrategyProfitMaximizing {
            competitor_cap: config.profit_competitor_cap,
        }),
    ]
}

/// Swap a collision-prone amount ending for the `nth` rarest observed one
pub fn adjusted_bid_amount(amount: u64, collision_endings: &[u32], rare_endings: &[u32], nth: usize) -> Option<u64> {
    if !collision_endings.contains(&amount_ending(amount)) {
        return None;
    }
    let usable: Vec<u32> = rare_endings
        .iter()
        .copied()
        .filter(|e| !collision_endings.contains(e))
        .collect();
    if usable.is_empty() {
        return None;
    }
    let ending = usable[nth % usable.len()] as u64;
    Some(amount - amount % 1000 + ending)
}

pub fn assemble(
    base_amount: f64,
    outcome: &OptimizerOutcome,
    config: &StrategyConfig,
    digits: Option<&DigitPatterns>,
    collision_endings: &[u32],
) -> Vec<StrategyRecommendation> {
    let rare_endings = digits.map(|d| d.rare_endings()).unwrap_or_default();
    let best_win = outcome
        .table
        .candidates
        .iter()
        .map(|c| c.win_probability)
        .fold(0.0, f64::max);

    default_selectors(config)
        .iter()
        .enumerate()
        .filter_map(|(i, selector)| {
            let candidate = selector.select(outcome)?;
            let bid_amount = implied_amount(base_amount, candidate.rate);
            Some(StrategyRecommendation {
                kind: selector.get_strategy_kind(),
                name: selector.get_strategy_name(),
                rate: candidate.rate,
                bid_amount,
                adjusted_bid_amount: adjusted_bid_amount(bid_amount, collision_endings, &rare_endings, i),
                win_probability: candidate.win_probability,
                floor_clear_probability: candidate.floor_clear_probability,
                profit_rate: candidate.profit_rate,
                expected_utility: candidate.utility,
                competitors: candidate.competitors,
                risk: RiskLevel::assess(&candidate, best_win, config),
                rationale: selector.rationale(&candidate),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::density::DensityHistogram;
    use crate::optimizer::{optimize, CandidateTable};
    use crate::win_models::{ScanContext, WinModelConditionalScenario};

    fn outcome() -> OptimizerOutcome {
        let mut competitors: Vec<f64> = (0..400).map(|i| 99.4 + (i % 80) as f64 * 0.0125).collect();
        competitors.extend(vec![99.91; 40]);
        let density = DensityHistogram::from_rates(&competitors, 0.05, [98.0, 102.0]).unwrap();
        let floors: Vec<f64> = (0..1_000).map(|i| 99.3 + i as f64 * 0.0009).collect();
        let context = ScanContext::new(&floors, &competitors, &density);
        let winners: Vec<f64> = (0..30).map(|i| 99.6 + i as f64 * 0.02).collect();
        optimize(&winners, &OptimizerConfig::default(), &WinModelConditionalScenario, &context).unwrap()
    }

    #[test]
    fn test_three_strategies_are_deterministic() {
        let config = StrategyConfig::default();
        let outcome = outcome();
        let first = assemble(39_000_000.0, &outcome, &config, None, &[0, 500]);
        let second = assemble(39_000_000.0, &outcome, &config, None, &[0, 500]);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].kind, StrategyKind::ExpectedUtilityOptimal);
        assert_eq!(first[0].rate, outcome.optimum.rate);
        assert_eq!(first[1].kind, StrategyKind::CompetitionAverse);
        assert_eq!(first[2].kind, StrategyKind::ProfitMaximizing);
    }

    #[test]
    fn test_strategy_fields() {
        let outcome = outcome();
        let strategies = assemble(39_000_000.0, &outcome, &StrategyConfig::default(), None, &[0, 500]);
        for s in &strategies {
            assert_eq!(s.bid_amount, (39_000_000.0 * s.rate / 100.0 + 1e-6).floor() as u64);
            assert!(!s.rationale.is_empty());
            assert!((s.profit_rate - (100.0 - s.rate) / 100.0).abs() < 1e-12);
        }

        let min_competitors = outcome.table.candidates.iter().map(|c| c.competitors).min().unwrap();
        assert_eq!(strategies[1].competitors, min_competitors);

        // widest margin is the lowest rate within the competitor cap
        let cap = StrategyConfig::default().profit_competitor_cap;
        let lowest_capped = outcome.table.candidates.iter().find(|c| c.competitors <= cap).unwrap();
        assert_eq!(strategies[2].rate, lowest_capped.rate);
    }

    #[test]
    fn test_risk_levels() {
        let config = StrategyConfig::default();
        assert_eq!(RiskLevel::from_floor_probability(0.95, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::from_floor_probability(0.9, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::from_floor_probability(0.6, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_floor_probability(0.1, &config), RiskLevel::High);

        let sure_floor = candidate(99.5, 0.99, 10, 0.1);
        assert_eq!(RiskLevel::assess(&sure_floor, 0.1, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::assess(&sure_floor, 0.2, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(&sure_floor, 0.5, &config), RiskLevel::High);
        assert_eq!(RiskLevel::assess(&candidate(99.5, 0.6, 10, 0.1), 0.1, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(&candidate(99.5, 0.99, 10, 0.0), 0.0, &config), RiskLevel::High);
    }

    fn candidate(rate: f64, floor_clear_probability: f64, competitors: u32, win_probability: f64) -> Candidate {
        let profit_rate = crate::optimizer::profit_rate(rate);
        Candidate {
            rate,
            floor_clear_probability,
            competitors,
            win_probability,
            profit_rate,
            utility: win_probability * profit_rate,
        }
    }

    #[test]
    fn test_strategies_get_distinct_risk_labels() {
        let candidates = vec![
            candidate(99.0, 0.99, 300, 0.01),
            candidate(99.2, 0.97, 180, 0.01),
            candidate(99.4, 0.95, 60, 0.05),
            candidate(99.6, 0.93, 120, 0.10),
        ];
        let optimum = candidates[3];
        let outcome = OptimizerOutcome {
            table: CandidateTable {
                model: "conditional_scenario".to_string(),
                scan_range: (99.0, 99.8),
                candidates,
            },
            optimum,
            top_candidates: vec![optimum],
            eligible_candidates: 4,
            guard_relaxed: false,
        };

        let strategies = assemble(39_000_000.0, &outcome, &StrategyConfig::default(), None, &[0, 500]);
        let picked: Vec<(f64, RiskLevel)> = strategies.iter().map(|s| (s.rate, s.risk)).collect();
        assert_eq!(
            picked,
            vec![(99.6, RiskLevel::Low), (99.4, RiskLevel::Medium), (99.2, RiskLevel::High)]
        );
    }

    #[test]
    fn test_profit_pick_ignores_win_probability() {
        let candidates = vec![candidate(99.0, 0.99, 20, 0.0), candidate(99.5, 0.99, 20, 0.3)];
        let optimum = candidates[1];
        let outcome = OptimizerOutcome {
            table: CandidateTable {
                model: "conditional_scenario".to_string(),
                scan_range: (99.0, 100.0),
                candidates,
            },
            optimum,
            top_candidates: vec![optimum],
            eligible_candidates: 2,
            guard_relaxed: false,
        };
        let selector = StrategyProfitMaximizing { competitor_cap: 200 };
        assert_eq!(selector.select(&outcome).map(|c| c.rate), Some(99.0));
    }

    #[test]
    fn test_adjusted_bid_amount() {
        assert_eq!(adjusted_bid_amount(38_805_000, &[0, 500], &[0, 137, 842], 0), Some(38_805_137));
        assert_eq!(adjusted_bid_amount(38_805_500, &[0, 500], &[137, 842], 1), Some(38_805_842));
        assert_eq!(adjusted_bid_amount(38_805_123, &[0, 500], &[137], 0), None);
        assert_eq!(adjusted_bid_amount(38_805_000, &[0, 500], &[500], 0), None);
    }
}
