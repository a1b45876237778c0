/// An empty history file must not abort the analysis.
///
/// The loader sees a header-only CSV, winner statistics become an explicit unavailable
/// block, the simulation still runs and the report still serializes.

use std::fs;

use crate::analysis::BidAnalysis;
use crate::config::Settings;
use crate::error::Availability;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::scenarios::Checks;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "empty_history",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("bidrate_{}_{}", scenario_name, std::process::id()));
    fs::create_dir_all(&dir)?;
    let data_file = dir.join("empty.csv");
    fs::write(&data_file, "공고번호,순위,기초대비투찰률\n")?;

    let mut settings = Settings::default();
    settings.simulation.trials = 1_000;
    let run = BidAnalysis::new(39_000_000, 87.745, data_file, settings).run(logger);
    fs::remove_dir_all(&dir)?;
    let report = run?.report;

    let mut checks = Checks::new();
    checks.check(
        logger,
        report.history.as_available().map(|h| h.records) == Some(0),
        "Header-only file loads as zero records".to_string(),
    );
    match &report.winner_statistics {
        Availability::Unavailable { reason } => {
            logln!(logger, LogEvent::Scenario, "winner statistics: {}", reason);
            checks.check(logger, true, "Winner statistics are unavailable".to_string());
        }
        Availability::Available(stats) => {
            checks.check(logger, false, format!("Winner statistics unexpectedly computed from {} winners", stats.data_count));
        }
    }
    checks.check(logger, !report.strategies.is_available(), "No strategies without history".to_string());
    checks.check(logger, report.simulation.trials == 1_000, "Simulation still ran".to_string());

    let json = serde_json::to_value(&report)?;
    checks.check(
        logger,
        json["winner_statistics"]["status"] == "unavailable",
        "Report marks the section as unavailable".to_string(),
    );

    checks.finish()
}
