/// The analysis pipeline: load, simulate, aggregate, optimize, assemble.
///
/// Every phase produces its own immutable block; the report is composed from them at the end.
/// Phases that need the history degrade to `Availability::Unavailable` when it is missing,
/// while unexpected failures (bad parameters, IO) propagate.

use chrono::Local;
use std::path::PathBuf;

use crate::agency::{agency_patterns, AgencyPatterns};
use crate::config::Settings;
use crate::cross_density::CrossDensity;
use crate::density::DensityHistogram;
use crate::digits::analyze_digits;
use crate::error::{AnalysisError, Availability};
use crate::floor_line::floor_line;
use crate::logger::{LogEvent, Logger};
use crate::optimizer::{optimize, OptimizerOutcome};
use crate::recency::recency_density;
use crate::records::{describe, filter_valid_range, load_csv, trim_iqr_outliers, HistoricalBidRecord, HistoricalDataset};
use crate::report::{AnalysisReport, AnnouncementInfo, HistorySummary, StrategySet};
use crate::reserve_price::{simulate, summarize, ReservePriceParams, SimulationEnsemble};
use crate::strategies::assemble;
use crate::win_models::{win_model, ScanContext};
use crate::winners::{winner_statistics, WinnerStatistics};
use crate::{logln, warnln};

/// One announcement to analyze
#[derive(Debug, Clone)]
pub struct BidAnalysis {
    pub base_amount: u64,
    pub agency_floor_rate: f64,
    pub data_file: PathBuf,
    pub settings: Settings,
}

/// The report plus the intermediate results charts are drawn from
pub struct AnalysisRun {
    pub report: AnalysisReport,
    pub ensemble: SimulationEnsemble,
    pub density: Option<DensityHistogram>,
    pub optimizer: Option<OptimizerOutcome>,
}

fn section<T>(result: Result<T, AnalysisError>, name: &str, logger: &mut Logger) -> Result<Availability<T>, AnalysisError> {
    let availability = Availability::from_result(result)?;
    if let Availability::Unavailable { reason } = &availability {
        warnln!(logger, LogEvent::Phase, "{} unavailable: {}", name, reason);
    }
    Ok(availability)
}

impl BidAnalysis {
    pub fn new(base_amount: u64, agency_floor_rate: f64, data_file: PathBuf, settings: Settings) -> Self {
        Self {
            base_amount,
            agency_floor_rate,
            data_file,
            settings,
        }
    }

    /// Load the history file and run the pipeline on it
    pub fn run(&self, logger: &mut Logger) -> Result<AnalysisRun, AnalysisError> {
        let history = Availability::from_result(load_csv(&self.data_file))?;
        self.run_with_history(history, logger)
    }

    pub fn run_with_history(
        &self,
        history: Availability<HistoricalDataset>,
        logger: &mut Logger,
    ) -> Result<AnalysisRun, AnalysisError> {
        let settings = &self.settings;
        let base_amount = self.base_amount as f64;

        logln!(logger, LogEvent::Analysis, "Base amount: {} | agency floor rate: {:.3}%", self.base_amount, self.agency_floor_rate);

        // Reserve-price simulation does not depend on the history
        let params = ReservePriceParams::new(base_amount, self.agency_floor_rate, &settings.simulation);
        let ensemble = simulate(&params)?;
        let simulation = summarize(&params, &ensemble)?;
        logln!(
            logger,
            LogEvent::Phase,
            "Simulation: {} trials, reserve mean {:.0}, floor rate {:.3}% ~ {:.3}% (mean {:.3}%)",
            simulation.trials,
            simulation.reserve_price.mean,
            simulation.base_to_floor_rate.min,
            simulation.base_to_floor_rate.max,
            simulation.base_to_floor_rate.mean
        );

        let records: Result<Vec<HistoricalBidRecord>, AnalysisError> = match &history {
            Availability::Available(dataset) => {
                logln!(logger, LogEvent::Phase, "History: {}", describe(dataset));
                Ok(match settings.history.valid_range {
                    Some([lo, hi]) => filter_valid_range(&dataset.records, lo, hi),
                    None => dataset.records.clone(),
                })
            }
            Availability::Unavailable { reason } => {
                warnln!(logger, LogEvent::Phase, "History unavailable: {}", reason);
                Err(AnalysisError::InsufficientSample(format!("history unavailable: {}", reason)))
            }
        };
        let history_summary = match &history {
            Availability::Available(dataset) => Availability::Available(HistorySummary::new(
                dataset,
                records.as_ref().map_or(0, |r| r.len()),
            )),
            Availability::Unavailable { reason } => Availability::unavailable(reason.clone()),
        };
        let records: &[HistoricalBidRecord] = records.as_deref().unwrap_or(&[]);
        let unavailable_reason = match &history {
            Availability::Unavailable { reason } => Some(reason.clone()),
            Availability::Available(_) => None,
        };
        let require_history = || match &unavailable_reason {
            Some(reason) => Err(AnalysisError::InsufficientSample(format!("history unavailable: {}", reason))),
            None => Ok(()),
        };

        // Winners
        let winners = section(
            require_history().and_then(|_| winner_statistics(records, settings.history.min_winner_sample)),
            "Winner statistics",
            logger,
        )?;
        if let Availability::Available(stats) = &winners {
            log_winners(stats, logger);
        }
        let winner_ratios = WinnerStatistics::winner_ratios(records);

        // Competition density over every participant
        let mut competitor_rates: Vec<f64> = records.iter().map(|r| r.bid_ratio_to_base).collect();
        if let Some(factor) = settings.history.iqr_outlier_factor {
            let (kept, (low, high)) = trim_iqr_outliers(&competitor_rates, factor);
            logln!(
                logger,
                LogEvent::Phase,
                "IQR trim: kept {} of {} ratios inside [{:.3}, {:.3}]",
                kept.len(),
                competitor_rates.len(),
                low,
                high
            );
            competitor_rates = kept;
        }
        let histogram = section(
            require_history().and_then(|_| {
                DensityHistogram::from_rates(&competitor_rates, settings.density.bucket_width, settings.density.scan_range)
            }),
            "Density",
            logger,
        )?;
        let density = match &histogram {
            Availability::Available(h) => {
                let summary = h.summarize(&settings.density);
                logln!(
                    logger,
                    LogEvent::Phase,
                    "Density: {} buckets of {:.3}%, {} in range, {} avoid zones, {} safe zones",
                    summary.bucket_count,
                    summary.bucket_width,
                    summary.in_range,
                    summary.avoid_zones.len(),
                    summary.safe_zones.len()
                );
                for zone in &summary.avoid_zones {
                    logln!(logger, LogEvent::Candidate, "  avoid {:.3}% ~ {:.3}%: {}", zone.start, zone.end, zone.occupancy);
                }
                Availability::Available(summary)
            }
            Availability::Unavailable { reason } => Availability::unavailable(reason.clone()),
        };

        let cross_density = section(
            require_history()
                .and_then(|_| CrossDensity::from_records(records, settings.density.scan_range, &settings.cross_density))
                .map(|c| c.summarize(&settings.cross_density)),
            "Cross density",
            logger,
        )?;
        let recency = section(
            require_history().and_then(|_| {
                recency_density(records, settings.density.bucket_width, settings.density.scan_range, &settings.recency)
            }),
            "Recency weighting",
            logger,
        )?;
        let digit_patterns = section(
            require_history().and_then(|_| analyze_digits(base_amount, &competitor_rates, &settings.digits)),
            "Digit patterns",
            logger,
        )?;

        let agencies = section(
            require_history().and_then(|_| agency_patterns(records, &settings.density, &settings.agency)),
            "Agency patterns",
            logger,
        )?;
        if let Availability::Available(patterns) = &agencies {
            log_agencies(patterns, logger);
        }

        let floor = floor_line(
            winners.as_available().map(|w| w.min),
            simulation.base_to_floor_rate.percentiles.p5,
            &settings.floor_line,
        );
        logln!(
            logger,
            LogEvent::Phase,
            "Floor line: safe {:.3}%, recommended minimum {:.3}% ({:?})",
            floor.safe_floor,
            floor.recommended_minimum,
            floor.basis
        );

        // Expected-utility scan
        let model = win_model(settings.optimizer.win_model);
        let outcome = match histogram.as_available() {
            Some(h) => {
                let context = ScanContext::new(&ensemble.base_to_floor_rates, &competitor_rates, h);
                section(
                    optimize(&winner_ratios, &settings.optimizer, model.as_ref(), &context),
                    "Optimizer",
                    logger,
                )?
            }
            None => section(
                Err(AnalysisError::InsufficientSample("optimizer needs the competition density".to_string())),
                "Optimizer",
                logger,
            )?,
        };
        if let Availability::Available(o) = &outcome {
            log_optimizer(o, logger);
        }

        let optimizer_summary = match &outcome {
            Availability::Available(o) => Availability::Available(o.summarize(&settings.optimizer)),
            Availability::Unavailable { reason } => Availability::unavailable(reason.clone()),
        };
        let strategies = match &outcome {
            Availability::Available(o) => {
                let strategies = assemble(
                    base_amount,
                    o,
                    &settings.strategy,
                    digit_patterns.as_available(),
                    &settings.digits.collision_endings,
                );
                for s in &strategies {
                    logln!(
                        logger,
                        LogEvent::Analysis,
                        "{}: {:.3}% -> {} won (win {:.2}%, risk {:?})",
                        s.name,
                        s.rate,
                        s.bid_amount,
                        s.win_probability * 100.0,
                        s.risk
                    );
                }
                Availability::Available(StrategySet { strategies })
            }
            Availability::Unavailable { reason } => Availability::unavailable(format!("no candidate table: {}", reason)),
        };

        let report = AnalysisReport {
            announcement: AnnouncementInfo {
                base_amount: self.base_amount,
                agency_floor_rate: self.agency_floor_rate,
                data_file: self.data_file.display().to_string(),
                analyzed_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
            history: history_summary,
            simulation,
            winner_statistics: winners,
            density,
            cross_density,
            recency,
            digit_patterns,
            agency_patterns: agencies,
            floor_line: floor,
            optimizer: optimizer_summary,
            strategies,
        };

        Ok(AnalysisRun {
            report,
            ensemble,
            density: match histogram {
                Availability::Available(h) => Some(h),
                Availability::Unavailable { .. } => None,
            },
            optimizer: match outcome {
                Availability::Available(o) => Some(o),
                Availability::Unavailable { .. } => None,
            },
        })
    }
}

fn log_winners(stats: &WinnerStatistics, logger: &mut Logger) {
    logln!(
        logger,
        LogEvent::Phase,
        "Winners: {} | mean {:.3}% | median {:.3}% | std {:.3} | p5 {:.3}% p95 {:.3}%",
        stats.data_count,
        stats.mean,
        stats.median,
        stats.std_dev,
        stats.percentiles.p5,
        stats.percentiles.p95
    );
    if let Some(caveat) = &stats.caveat {
        warnln!(logger, LogEvent::Phase, "{}", caveat);
    }
}

fn log_agencies(patterns: &AgencyPatterns, logger: &mut Logger) {
    logln!(
        logger,
        LogEvent::Phase,
        "Agencies: {}{}",
        patterns.agency_count,
        if patterns.inferred { " (inferred from announcement numbers)" } else { "" }
    );
    for a in &patterns.agencies {
        logln!(
            logger,
            LogEvent::Candidate,
            "  {}: {} bids, {} winners, density {:?} (mean {:.1}, max {}), quietest {:.2}% ~ {:.2}%",
            a.agency,
            a.records,
            a.winners,
            a.density_level,
            a.mean_density,
            a.max_density,
            a.quietest_bucket.start,
            a.quietest_bucket.end
        );
    }
}

fn log_optimizer(outcome: &OptimizerOutcome, logger: &mut Logger) {
    let (low, high) = outcome.table.scan_range;
    logln!(
        logger,
        LogEvent::Phase,
        "Optimizer ({}): scanned {} rates in [{:.3}, {:.3})",
        outcome.table.model,
        outcome.table.candidates.len(),
        low,
        high
    );
    if outcome.guard_relaxed {
        warnln!(logger, LogEvent::Phase, "no candidate within the competitor cap, using all candidates");
    }
    for c in &outcome.top_candidates {
        logln!(
            logger,
            LogEvent::Candidate,
            "  {:.3}% utility {:.6} win {:.4} competitors {}",
            c.rate,
            c.utility,
            c.win_probability,
            c.competitors
        );
    }
    logln!(
        logger,
        LogEvent::Analysis,
        "Optimum: {:.3}% (utility {:.6}, win {:.2}%, {} competitors)",
        outcome.optimum.rate,
        outcome.optimum.utility,
        outcome.optimum.win_probability * 100.0,
        outcome.optimum.competitors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_history, SyntheticHistoryParams};

    fn quick_settings() -> Settings {
        let mut settings = Settings::default();
        settings.simulation.trials = 2_000;
        settings
    }

    fn analysis(settings: Settings) -> BidAnalysis {
        BidAnalysis::new(39_000_000, 87.745, PathBuf::from("synthetic"), settings)
    }

    #[test]
    fn test_full_pipeline_on_synthetic_history() {
        let params = SyntheticHistoryParams::new(60, 15).unwrap();
        let dataset = HistoricalDataset::from_records(generate_history(&params, 21));
        let mut logger = Logger::new();
        let run = analysis(quick_settings())
            .run_with_history(Availability::Available(dataset), &mut logger)
            .unwrap();

        let report = &run.report;
        assert!(report.missing_core_sections().is_empty());
        assert!(report.cross_density.is_available());
        assert!(report.recency.is_available());
        assert!(report.digit_patterns.is_available());
        let agencies = report.agency_patterns.as_available().unwrap();
        assert!(!agencies.inferred);
        assert_eq!(agencies.agency_count, 4);
        let grouped: usize = agencies.agencies.iter().map(|a| a.records).sum();
        assert_eq!(grouped, report.history.as_available().unwrap().analyzed_records);
        let strategies = &report.strategies.as_available().unwrap().strategies;
        assert_eq!(strategies.len(), 3);
        assert_eq!(run.ensemble.trials(), 2_000);
        assert!(run.density.is_some() && run.optimizer.is_some());

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["winner_statistics"]["status"], "available");
        assert_eq!(json["strategies"]["strategies"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let params = SyntheticHistoryParams::new(40, 10).unwrap();
        let records = generate_history(&params, 3);
        let mut logger = Logger::new();
        let a = analysis(quick_settings())
            .run_with_history(Availability::Available(HistoricalDataset::from_records(records.clone())), &mut logger)
            .unwrap();
        let b = analysis(quick_settings())
            .run_with_history(Availability::Available(HistoricalDataset::from_records(records)), &mut logger)
            .unwrap();
        assert_eq!(a.report.strategies, b.report.strategies);
        assert_eq!(a.report.optimizer, b.report.optimizer);
    }

    #[test]
    fn test_missing_file_degrades_to_unavailable() {
        let mut logger = Logger::new();
        let analysis = BidAnalysis::new(39_000_000, 87.745, PathBuf::from("/nonexistent/history.csv"), quick_settings());
        let run = analysis.run(&mut logger).unwrap();
        let report = &run.report;
        assert!(!report.history.is_available());
        assert!(!report.winner_statistics.is_available());
        assert!(!report.strategies.is_available());
        assert_eq!(report.simulation.trials, 2_000);
        assert_eq!(report.floor_line.basis, crate::floor_line::FloorBasis::SimulatedFloor);
        assert!(report.missing_core_sections().contains(&"history"));
    }

    #[test]
    fn test_amount_typed_as_ratio_is_excluded() {
        let mut records = vec![
            HistoricalBidRecord::new(99.5, 1),
            HistoricalBidRecord::new(99.7, 2),
            HistoricalBidRecord::new(1.0e12, 3),
            HistoricalBidRecord::new(38_805_000.0, 4),
        ];
        for r in records.iter_mut() {
            r.reserve_ratio_to_base = Some(99.8);
        }
        let mut logger = Logger::new();
        let run = analysis(quick_settings())
            .run_with_history(Availability::Available(HistoricalDataset::from_records(records)), &mut logger)
            .unwrap();

        let density = run.density.unwrap();
        assert_eq!(density.in_range, 2);
        assert_eq!(density.excluded, 2);
        assert!(density.counts.len() <= 81);
        let summary = run.report.density.as_available().unwrap();
        assert_eq!(summary.excluded, 2);
        assert_eq!(run.report.cross_density.as_available().unwrap().pairs, 2);
    }

    #[test]
    fn test_empty_history_is_reported_not_raised() {
        let mut logger = Logger::new();
        let run = analysis(quick_settings())
            .run_with_history(Availability::Available(HistoricalDataset::default()), &mut logger)
            .unwrap();
        assert!(run.report.history.is_available());
        assert!(!run.report.winner_statistics.is_available());
        assert!(!run.report.density.is_available());
        assert!(!run.report.optimizer.is_available());
    }
}
