mod agency;
mod analysis;
mod charts;
mod config;
mod cross_density;
mod density;
mod digits;
mod error;
mod floor_line;
mod logger;
mod optimizer;
mod recency;
mod records;
mod report;
mod reserve_price;
mod scenarios;
mod stats;
mod strategies;
mod synthetic;
mod win_models;
mod winners;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use analysis::BidAnalysis;
use config::Settings;
use logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use report::{analysis_output_path, write_json};
use reserve_price::{simulate, summarize, ReservePriceParams};
use scenarios::get_scenario_catalog;

#[derive(Parser)]
#[command(name = "bidrate", about = "Bid-rate recommendation for multi-reserve-price procurement auctions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a history file and recommend bid rates for one announcement
    Analyze {
        /// Announced base amount in won
        #[arg(long)]
        base_amount: u64,
        /// Agency floor rate in percent, e.g. 87.745
        #[arg(long)]
        agency_rate: f64,
        /// CSV export of past auction participants
        #[arg(long)]
        data_file: PathBuf,
        /// YAML settings overriding the defaults
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Also render PNG charts next to the report
        #[arg(long)]
        charts: bool,
        /// Log every phase and the top candidates to the console
        #[arg(long)]
        verbose: bool,
    },
    /// Run only the reserve-price simulation and print its summary
    Simulate {
        #[arg(long)]
        base_amount: u64,
        #[arg(long)]
        agency_rate: f64,
        #[arg(long)]
        variance_range: Option<f64>,
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the registered validation scenarios
    Validate {
        /// Scenario short name, or "all"
        #[arg(default_value = "all")]
        scenario: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Analyze {
            base_amount,
            agency_rate,
            data_file,
            config,
            output_dir,
            charts,
            verbose,
        } => run_analyze(base_amount, agency_rate, data_file, config, output_dir, charts, verbose),
        Command::Simulate {
            base_amount,
            agency_rate,
            variance_range,
            trials,
            seed,
            config,
        } => run_simulate(base_amount, agency_rate, variance_range, trials, seed, config),
        Command::Validate { scenario } => run_validate(&scenario),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_analyze(
    base_amount: u64,
    agency_rate: f64,
    data_file: PathBuf,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    charts: bool,
    verbose: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut settings = Settings::load(config.as_deref())?;
    if let Some(dir) = output_dir {
        settings.output.output_dir = dir;
    }
    settings.output.charts |= charts;

    let mut logger = Logger::new();
    let console_events = if verbose {
        vec![LogEvent::Candidate, LogEvent::Phase, LogEvent::Analysis]
    } else {
        vec![LogEvent::Analysis]
    };
    logger.add_receiver(ConsoleReceiver::new(console_events));
    logger.add_receiver(FileReceiver::new(
        &PathBuf::from("log/analysis.log"),
        vec![LogEvent::Candidate, LogEvent::Phase, LogEvent::Analysis],
    )?);

    let output_dir = settings.output.output_dir.clone();
    let render_charts = settings.output.charts;
    let run = BidAnalysis::new(base_amount, agency_rate, data_file, settings).run(&mut logger)?;

    let path = analysis_output_path(&output_dir, agency_rate);
    write_json(&run.report, &path)?;
    logln!(logger, LogEvent::Analysis, "Report saved to {}", path.display());

    if render_charts {
        if let Err(e) = charts::generate_analysis_charts(&run, &output_dir, &mut logger) {
            errln!(logger, LogEvent::Analysis, "chart rendering failed: {}", e);
        }
    }

    let recommended = finish_analysis(&run.report.missing_core_sections(), &mut logger)?;
    Ok(if recommended { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Log the missing core sections, if any, then flush every receiver.
/// Returns whether a recommendation could be made.
fn finish_analysis(missing: &[&str], logger: &mut Logger) -> std::io::Result<bool> {
    if !missing.is_empty() {
        errln!(logger, LogEvent::Analysis, "no recommendation possible, unavailable: {}", missing.join(", "));
    }
    logger.flush()?;
    Ok(missing.is_empty())
}

fn run_simulate(
    base_amount: u64,
    agency_rate: f64,
    variance_range: Option<f64>,
    trials: Option<usize>,
    seed: Option<u64>,
    config: Option<PathBuf>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut settings = Settings::load(config.as_deref())?;
    if let Some(v) = variance_range {
        settings.simulation.variance_range = v;
    }
    if let Some(n) = trials {
        settings.simulation.trials = n;
    }
    if let Some(s) = seed {
        settings.simulation.seed = s;
    }
    settings.validate()?;

    let params = ReservePriceParams::new(base_amount as f64, agency_rate, &settings.simulation);
    let ensemble = simulate(&params)?;
    let summary = summarize(&params, &ensemble)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

fn run_validate(scenario_arg: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let all_scenarios = get_scenario_catalog();
    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                eprintln!("Available scenarios:");
                for s in &all_scenarios {
                    eprintln!("  - {}", s.short_name);
                }
                return Ok(ExitCode::FAILURE);
            }
        }
    };

    // A single scenario also shows its individual checks on the console
    let mut logger = Logger::new();
    if scenario_arg == "all" {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    }
    let summary_receiver_id = logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    logln!(&mut logger, LogEvent::Validation, "Running {} scenario(s)...\n", scenarios.len());

    let mut failures = 0;
    for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);
        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(
            &PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name))),
            vec![LogEvent::Scenario, LogEvent::Phase, LogEvent::Analysis],
        )?);

        match (scenario.run)(scenario.short_name, &mut logger) {
            Ok(()) => logln!(&mut logger, LogEvent::Validation, "✓ PASSED"),
            Err(e) => {
                failures += 1;
                logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
            }
        }
        let _ = logger.flush();
        logger.remove_receiver(scenario_receiver_id);
    }

    logln!(&mut logger, LogEvent::Validation, "\n{} passed, {} failed", scenarios.len() - failures, failures);
    logger.remove_receiver(summary_receiver_id);

    Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
