/// Monte Carlo simulation of the multi-reserve-price draw.
///
/// The procurement agency publishes a band of preliminary prices around the base amount and the
/// reserve price is the mean of a handful of them picked at random. The minimum winning price is
/// a fixed percentage (the agency floor rate) of that reserve price. Repeating the draw gives the
/// distribution of the floor expressed as a percentage of the base amount, which is what bids are
/// compared against.
///
/// Two layouts of the preliminary prices are supported:
/// - Linspace: evenly spaced over the band, the same for every trial
/// - UniformDraw: redrawn uniformly at random inside the band for every trial

use rand::seq::index;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::AnalysisError;
use crate::stats::SummaryStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreliminaryLayout {
    Linspace,
    UniformDraw,
}

/// Inputs of one simulation run
#[derive(Debug, Clone)]
pub struct ReservePriceParams {
    pub base_amount: f64,
    pub variance_range: f64,
    pub agency_floor_rate: f64,
    pub trials: usize,
    pub preliminary_count: usize,
    pub draw_count: usize,
    pub seed: u64,
    pub layout: PreliminaryLayout,
}

impl ReservePriceParams {
    pub fn new(base_amount: f64, agency_floor_rate: f64, config: &SimulationConfig) -> Self {
        Self {
            base_amount,
            variance_range: config.variance_range,
            agency_floor_rate,
            trials: config.trials,
            preliminary_count: config.preliminary_count,
            draw_count: config.draw_count,
            seed: config.seed,
            layout: config.layout,
        }
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.base_amount.is_finite() && self.base_amount > 0.0) {
            return Err(AnalysisError::InvalidParameter(format!("base amount must be positive, got {}", self.base_amount)));
        }
        if !(self.agency_floor_rate.is_finite() && self.agency_floor_rate > 0.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "agency floor rate must be positive, got {}",
                self.agency_floor_rate
            )));
        }
        if !(self.variance_range.is_finite() && self.variance_range >= 0.0 && self.variance_range < 1.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "variance range must be in [0, 1), got {}",
                self.variance_range
            )));
        }
        if self.trials == 0 {
            return Err(AnalysisError::InvalidParameter("trial count must be positive".to_string()));
        }
        if self.draw_count == 0 || self.draw_count > self.preliminary_count {
            return Err(AnalysisError::InsufficientDraws {
                draws: self.draw_count,
                available: self.preliminary_count,
            });
        }
        Ok(())
    }

    /// Lower and upper edge of the preliminary price band
    pub fn band(&self) -> (f64, f64) {
        (
            self.base_amount * (1.0 - self.variance_range),
            self.base_amount * (1.0 + self.variance_range),
        )
    }
}

/// Evenly spaced preliminary prices including both band edges
pub fn preliminary_prices(params: &ReservePriceParams) -> Vec<f64> {
    let (low, high) = params.band();
    let count = params.preliminary_count;
    if count == 1 {
        return vec![(low + high) / 2.0];
    }
    let step = (high - low) / (count - 1) as f64;
    (0..count).map(|i| low + step * i as f64).collect()
}

/// One simulated outcome per trial, matched by index across the three vectors
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationEnsemble {
    pub reserve_prices: Vec<f64>,
    pub min_winning_prices: Vec<f64>,
    pub base_to_floor_rates: Vec<f64>,
}

impl SimulationEnsemble {
    pub fn trials(&self) -> usize {
        self.base_to_floor_rates.len()
    }
}

/// Summary block of a simulation, as written to the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub trials: usize,
    pub seed: u64,
    pub layout: PreliminaryLayout,
    pub preliminary_band: [f64; 2],
    pub reserve_price: SummaryStats,
    pub min_winning_price: SummaryStats,
    pub base_to_floor_rate: SummaryStats,
}

/// Run the simulation. Deterministic for a given seed.
pub fn simulate(params: &ReservePriceParams) -> Result<SimulationEnsemble, AnalysisError> {
    params.validate()?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let linspace = preliminary_prices(params);
    let (low, high) = params.band();
    let band_dist = Uniform::new_inclusive(low, high);
    let mut drawn = vec![0.0; params.preliminary_count];

    let mut reserve_prices = Vec::with_capacity(params.trials);
    let mut min_winning_prices = Vec::with_capacity(params.trials);
    let mut base_to_floor_rates = Vec::with_capacity(params.trials);

    for _ in 0..params.trials {
        let population: &[f64] = match params.layout {
            PreliminaryLayout::Linspace => &linspace,
            PreliminaryLayout::UniformDraw => {
                for price in drawn.iter_mut() {
                    *price = band_dist.sample(&mut rng);
                }
                &drawn
            }
        };

        let picked = index::sample(&mut rng, population.len(), params.draw_count);
        let reserve_price = picked.iter().map(|i| population[i]).sum::<f64>() / params.draw_count as f64;
        let min_winning_price = reserve_price * params.agency_floor_rate / 100.0;

        reserve_prices.push(reserve_price);
        min_winning_prices.push(min_winning_price);
        base_to_floor_rates.push(min_winning_price / params.base_amount * 100.0);
    }

    Ok(SimulationEnsemble {
        reserve_prices,
        min_winning_prices,
        base_to_floor_rates,
    })
}

/// Summarize an ensemble produced by `simulate` with the same params
pub fn summarize(params: &ReservePriceParams, ensemble: &SimulationEnsemble) -> Result<SimulationSummary, AnalysisError> {
    let empty = || AnalysisError::InsufficientSample("simulation produced no outcomes".to_string());
    let (low, high) = params.band();
    Ok(SimulationSummary {
        trials: ensemble.trials(),
        seed: params.seed,
        layout: params.layout,
        preliminary_band: [low, high],
        reserve_price: SummaryStats::from_values(&ensemble.reserve_prices).ok_or_else(empty)?,
        min_winning_price: SummaryStats::from_values(&ensemble.min_winning_prices).ok_or_else(empty)?,
        base_to_floor_rate: SummaryStats::from_values(&ensemble.base_to_floor_rates).ok_or_else(empty)?,
    })
}
