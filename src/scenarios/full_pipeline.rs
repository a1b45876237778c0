/// Full pipeline on a generated multi-announcement history.
///
/// Checks the structural guarantees of the recommendation: the density buckets account for
/// every ratio, profit strictly falls along the scan, the optimum respects the competitor cap,
/// and the three strategies come out identical on a second run.

use crate::analysis::BidAnalysis;
use crate::config::Settings;
use crate::error::Availability;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::records::HistoricalDataset;
use crate::scenarios::Checks;
use crate::synthetic::{generate_history, SyntheticHistoryParams};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "full_pipeline",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let params = SyntheticHistoryParams::new(120, 20)?;
    let records = generate_history(&params, 2025);
    let mut settings = Settings::default();
    settings.simulation.trials = 5_000;
    let analysis = BidAnalysis::new(39_000_000, 87.745, scenario_name.into(), settings);

    let first = analysis.run_with_history(Availability::Available(HistoricalDataset::from_records(records.clone())), logger)?;
    let second = analysis.run_with_history(Availability::Available(HistoricalDataset::from_records(records.clone())), logger)?;

    let mut checks = Checks::new();
    checks.check(
        logger,
        first.report.missing_core_sections().is_empty(),
        format!("All core sections available: missing {:?}", first.report.missing_core_sections()),
    );

    let density = first.density.as_ref().ok_or("density unavailable")?;
    let total: u32 = density.counts.iter().sum();
    checks.check(
        logger,
        total as usize == density.in_range && density.in_range + density.excluded == records.len(),
        format!("Buckets account for every ratio: {} + {} excluded = {}", total, density.excluded, records.len()),
    );

    let outcome = first.optimizer.as_ref().ok_or("optimizer unavailable")?;
    let monotonic = outcome.table.candidates.windows(2).all(|w| w[0].profit_rate > w[1].profit_rate);
    checks.check(logger, monotonic, "Profit rate strictly decreases along the scan".to_string());

    let cap = analysis.settings.optimizer.competitor_cap;
    checks.check(
        logger,
        outcome.guard_relaxed || cap.map_or(true, |cap| outcome.optimum.competitors <= cap),
        format!("Optimum {:.3}% respects the competitor cap ({} competitors)", outcome.optimum.rate, outcome.optimum.competitors),
    );

    let strategies = first.report.strategies.as_available().map(|s| s.strategies.len()).unwrap_or(0);
    checks.check(logger, strategies == 3, format!("Three strategies assembled: {}", strategies));
    checks.check(
        logger,
        first.report.strategies == second.report.strategies,
        "Identical inputs give identical strategies".to_string(),
    );

    if let Some(set) = first.report.strategies.as_available() {
        for s in &set.strategies {
            logln!(logger, LogEvent::Scenario, "{}: {:.3}% ({} won, {:?} risk)", s.name, s.rate, s.bid_amount, s.risk);
        }
    }

    checks.finish()
}
