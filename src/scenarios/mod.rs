use std::error::Error;

use crate::errln;
use crate::logger::{LogEvent, Logger};
use crate::logln;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

inventory::collect!(ScenarioEntry);

/// All registered scenarios, sorted by name so `validate all` runs in a stable order
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut entries: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>.into_iter().cloned().collect();
    entries.sort_by_key(|entry| entry.short_name);
    entries
}

/// Collects the outcome of each check of one scenario
#[derive(Default)]
pub struct Checks {
    errors: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log ✓ or record and log the failure
    pub fn check(&mut self, logger: &mut Logger, passed: bool, msg: String) {
        if passed {
            logln!(logger, LogEvent::Scenario, "✓ {}", msg);
        } else {
            errln!(logger, LogEvent::Scenario, "{}", msg);
            self.errors.push(msg);
        }
    }

    pub fn finish(self) -> Result<(), Box<dyn Error>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(format!("{} check(s) failed: {}", self.errors.len(), self.errors.join("; ")).into())
        }
    }
}

pub mod empty_history;
pub mod full_pipeline;
pub mod reference_auction;
pub mod synthetic_winners;
