/// Win-probability models used by the expected-utility scan
///
/// Both models see the same precomputed `ScanContext`: the simulated floor rates sorted
/// ascending, the competitor ratios sorted ascending and the density histogram.

use serde::{Deserialize, Serialize};

use crate::density::DensityHistogram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WinModelKind {
    InverseCompetitor,
    ConditionalScenario,
}

/// Simulated scenarios sharing one floor rate
#[derive(Debug, Clone, Copy, PartialEq)]
struct FloorGroup {
    floor: f64,
    scenarios: usize,
    /// Index of the first competitor ratio at or above `floor`
    first_competitor: usize,
}

/// Everything a model needs to score a candidate rate
pub struct ScanContext<'a> {
    floors: Vec<f64>,
    floor_groups: Vec<FloorGroup>,
    competitors: Vec<f64>,
    density: &'a DensityHistogram,
}

impl<'a> ScanContext<'a> {
    pub fn new(floor_rates: &[f64], competitor_rates: &[f64], density: &'a DensityHistogram) -> Self {
        let mut floors: Vec<f64> = floor_rates.iter().copied().filter(|f| f.is_finite()).collect();
        floors.sort_by(|a, b| a.total_cmp(b));
        let mut competitors: Vec<f64> = competitor_rates.iter().copied().filter(|r| r.is_finite()).collect();
        competitors.sort_by(|a, b| a.total_cmp(b));

        let mut floor_groups: Vec<FloorGroup> = Vec::new();
        for &floor in &floors {
            match floor_groups.last_mut() {
                Some(group) if group.floor == floor => group.scenarios += 1,
                _ => floor_groups.push(FloorGroup {
                    floor,
                    scenarios: 1,
                    first_competitor: competitors.partition_point(|&x| x < floor),
                }),
            }
        }

        Self {
            floors,
            floor_groups,
            competitors,
            density,
        }
    }

    pub fn scenario_count(&self) -> usize {
        self.floors.len()
    }

    /// Fraction of simulated floors at or below `rate`
    pub fn floor_clear_probability(&self, rate: f64) -> f64 {
        if self.floors.is_empty() {
            return 0.0;
        }
        self.floors.partition_point(|&f| f <= rate) as f64 / self.floors.len() as f64
    }

    /// Competitors in the density bucket containing `rate`
    pub fn local_competitors(&self, rate: f64) -> u32 {
        self.density.occupancy(rate)
    }

    pub fn density(&self) -> &DensityHistogram {
        self.density
    }
}

/// Trait for win-probability estimators of a candidate bid rate
pub trait WinProbabilityModelTrait {
    /// Probability in [0, 1] that bidding `rate` wins
    fn win_probability(&self, rate: f64, context: &ScanContext) -> f64;

    fn get_model_type(&self) -> String;
}

/// Floor-clear probability shared among the competitors of the candidate's bucket
pub struct WinModelInverseCompetitor;

impl WinProbabilityModelTrait for WinModelInverseCompetitor {
    fn win_probability(&self, rate: f64, context: &ScanContext) -> f64 {
        context.floor_clear_probability(rate) / (context.local_competitors(rate) as f64 + 1.0)
    }

    fn get_model_type(&self) -> String {
        "InverseCompetitor".to_string()
    }
}

/// Average over simulated scenarios: a scenario whose floor the candidate clears contributes
/// 1 / (competitors bidding between that floor and the candidate, plus one)
pub struct WinModelConditionalScenario;

impl WinProbabilityModelTrait for WinModelConditionalScenario {
    fn win_probability(&self, rate: f64, context: &ScanContext) -> f64 {
        let total = context.scenario_count();
        if total == 0 {
            return 0.0;
        }
        let upto = context.competitors.partition_point(|&x| x <= rate);
        let mut sum = 0.0;
        for group in context.floor_groups.iter().take_while(|g| g.floor <= rate) {
            let between = upto.saturating_sub(group.first_competitor);
            sum += group.scenarios as f64 / (between as f64 + 1.0);
        }
        sum / total as f64
    }

    fn get_model_type(&self) -> String {
        "ConditionalScenario".to_string()
    }
}

pub fn win_model(kind: WinModelKind) -> Box<dyn WinProbabilityModelTrait> {
    match kind {
        WinModelKind::InverseCompetitor => Box::new(WinModelInverseCompetitor),
        WinModelKind::ConditionalScenario => Box::new(WinModelConditionalScenario),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward scenario-by-scenario evaluation to compare the grouped one against
    fn brute_force(rate: f64, floors: &[f64], competitors: &[f64]) -> f64 {
        let mut sum = 0.0;
        for &floor in floors {
            if floor <= rate {
                let between = competitors.iter().filter(|&&x| x >= floor && x <= rate).count();
                sum += 1.0 / (between as f64 + 1.0);
            }
        }
        sum / floors.len() as f64
    }

    #[test]
    fn test_floor_clear_probability() {
        let density = DensityHistogram::from_rates(&[99.0], 0.05, [98.0, 102.0]).unwrap();
        let context = ScanContext::new(&[99.0, 99.5, 100.0, 100.5], &[], &density);
        assert_eq!(context.floor_clear_probability(98.0), 0.0);
        assert_eq!(context.floor_clear_probability(99.5), 0.5);
        assert_eq!(context.floor_clear_probability(101.0), 1.0);
    }

    #[test]
    fn test_inverse_competitor() {
        let competitors = vec![99.51, 99.52, 99.53];
        let density = DensityHistogram::with_range(&competitors, 0.05, 98.0, 102.0).unwrap();
        let context = ScanContext::new(&[99.0, 100.0], &competitors, &density);
        let model = WinModelInverseCompetitor;
        // half the floors cleared, three competitors in the bucket
        assert!((model.win_probability(99.54, &context) - 0.5 / 4.0).abs() < 1e-12);
        assert!((model.win_probability(98.0, &context)).abs() < 1e-12);
    }

    #[test]
    fn test_conditional_matches_brute_force() {
        let floors = vec![99.2, 99.2, 99.4, 99.7, 99.7, 99.7, 100.1];
        let competitors = vec![99.1, 99.25, 99.3, 99.45, 99.5, 99.72, 99.9, 100.2];
        let density = DensityHistogram::with_range(&competitors, 0.05, 98.0, 102.0).unwrap();
        let context = ScanContext::new(&floors, &competitors, &density);
        let model = WinModelConditionalScenario;
        for i in 0..40 {
            let rate = 99.0 + i as f64 * 0.037;
            let expected = brute_force(rate, &floors, &competitors);
            assert!((model.win_probability(rate, &context) - expected).abs() < 1e-12, "rate {}", rate);
        }
    }

    #[test]
    fn test_conditional_without_competitors_equals_floor_clear() {
        let floors = vec![99.0, 99.5, 100.0];
        let density = DensityHistogram::from_rates(&[99.0], 0.05, [98.0, 102.0]).unwrap();
        let context = ScanContext::new(&floors, &[], &density);
        let model = win_model(WinModelKind::ConditionalScenario);
        assert!((model.win_probability(99.7, &context) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.get_model_type(), "ConditionalScenario");
    }
}
