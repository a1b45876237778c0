/// Reference auction: 39,000,000 won base amount at an 87.745% agency floor rate.
///
/// The simulated reserve price must stay inside the ±3% preliminary band and the floor rate
/// must track 87.745% of the mean reserve ratio. Two runs with the same seed must agree
/// exactly.

use crate::config::SimulationConfig;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::reserve_price::{simulate, summarize, ReservePriceParams};
use crate::scenarios::Checks;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "reference_auction",
    run,
});

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = ReservePriceParams::new(39_000_000.0, 87.745, &SimulationConfig::default());
    let ensemble = simulate(&params)?;
    let summary = summarize(&params, &ensemble)?;
    logln!(
        logger,
        LogEvent::Scenario,
        "{} trials: reserve mean {:.0}, floor rate mean {:.4}%",
        summary.trials,
        summary.reserve_price.mean,
        summary.base_to_floor_rate.mean
    );

    let mut checks = Checks::new();
    let (low, high) = params.band();

    checks.check(
        logger,
        ensemble.reserve_prices.len() == 10_000
            && ensemble.min_winning_prices.len() == 10_000
            && ensemble.base_to_floor_rates.len() == 10_000,
        "All three outcome arrays hold 10000 trials".to_string(),
    );

    let reserve_mean = summary.reserve_price.mean;
    checks.check(
        logger,
        reserve_mean >= low && reserve_mean <= high,
        format!("Reserve mean inside the band: {:.0} <= {:.0} <= {:.0}", low, reserve_mean, high),
    );

    let expected = 87.745 * (reserve_mean / 39_000_000.0 * 100.0) / 100.0;
    checks.check(
        logger,
        (summary.base_to_floor_rate.mean - expected).abs() < 1e-6,
        format!("Floor rate mean tracks the reserve ratio: {:.6} ~ {:.6}", summary.base_to_floor_rate.mean, expected),
    );

    let finite = ensemble
        .reserve_prices
        .iter()
        .chain(&ensemble.min_winning_prices)
        .chain(&ensemble.base_to_floor_rates)
        .all(|v| v.is_finite());
    checks.check(logger, finite, "No NaN or infinite outcome".to_string());

    let again = simulate(&params)?;
    checks.check(
        logger,
        again.base_to_floor_rates == ensemble.base_to_floor_rates,
        "Same seed reproduces identical floor rates".to_string(),
    );

    checks.finish()
}
