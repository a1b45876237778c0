/// Fifty synthetic records uniform in [99, 101] with five marked as winners.
///
/// Winner statistics must count exactly the five winners and every percentile must lie
/// strictly inside the generating range. Five winners is below the reliable sample size,
/// so the block must carry a caveat.

use crate::config::HistoryConfig;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::records::filter_winners;
use crate::scenarios::Checks;
use crate::synthetic::uniform_history;
use crate::winners::winner_statistics;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "synthetic_winners",
    run,
});

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let records = uniform_history(50, 5, 99.0, 101.0, 42);
    let stats = winner_statistics(&records, HistoryConfig::default().min_winner_sample)?;
    let p = stats.percentiles;
    logln!(
        logger,
        LogEvent::Scenario,
        "winners {} | p5 {:.3} p25 {:.3} p50 {:.3} p75 {:.3} p95 {:.3}",
        stats.data_count,
        p.p5,
        p.p25,
        p.p50,
        p.p75,
        p.p95
    );

    let mut checks = Checks::new();
    checks.check(logger, stats.data_count == 5, format!("Data count is 5: {}", stats.data_count));

    let inside = [p.p5, p.p25, p.p50, p.p75, p.p95].iter().all(|&v| v > 99.0 && v < 101.0);
    checks.check(logger, inside, "Every percentile lies strictly within (99, 101)".to_string());

    let ordered = p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95;
    checks.check(logger, ordered, "Percentiles are ordered p5 <= p25 <= p50 <= p75 <= p95".to_string());

    checks.check(
        logger,
        !stats.reliable && stats.caveat.is_some(),
        "Small sample is flagged as unreliable".to_string(),
    );

    let once = filter_winners(&records);
    checks.check(logger, filter_winners(&once) == once, "Winner filter is idempotent".to_string());

    checks.finish()
}
