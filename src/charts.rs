use plotters::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::AnalysisRun;
use crate::density::DensityHistogram;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::optimizer::OptimizerOutcome;
use crate::stats::mean;

const NUM_BINS: usize = 50;

/// Render every chart the run has data for into `dir`
pub fn generate_analysis_charts(run: &AnalysisRun, dir: &Path, logger: &mut Logger) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let rate_tag = (run.report.announcement.agency_floor_rate * 1000.0).round() as i64;
    let mut written = Vec::new();

    let floor_path = dir.join(format!("floor_rate_histogram_{}.png", rate_tag));
    create_single_histogram(
        &run.ensemble.base_to_floor_rates,
        "Simulated Floor Rate Distribution",
        &floor_path,
        "Floor rate (% of base)",
        &BLUE,
    )?;
    written.push(floor_path);

    if let (Some(density), Some(outcome)) = (&run.density, &run.optimizer) {
        let balance_path = dir.join(format!("balance_graph_{}.png", rate_tag));
        create_balance_graph(density, outcome, &balance_path)?;
        written.push(balance_path);

        let heat_path = dir.join(format!("density_heat_strip_{}.png", rate_tag));
        create_heat_strip(density, outcome, &heat_path)?;
        written.push(heat_path);
    }

    for path in &written {
        logln!(logger, LogEvent::Analysis, "Chart saved to {}", path.display());
    }
    Ok(written)
}

/// Equal-width bins over [min, max]; the maximum lands in the last bin
fn bin_values(values: &[f64], bins: usize) -> (f64, f64, Vec<u32>) {
    let min_val = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    // constant data still gets a drawable width
    let bin_width = if max_val > min_val { (max_val - min_val) / bins as f64 } else { 1e-3 };

    let mut counts = vec![0u32; bins];
    for &value in values {
        let bin_idx = ((value - min_val) / bin_width).floor() as usize;
        counts[bin_idx.min(bins - 1)] += 1;
    }
    (min_val, bin_width, counts)
}

/// Green for empty buckets through red for the most crowded one
fn heat_color(occupancy: u32, max_occupancy: u32) -> HSLColor {
    let ratio = if max_occupancy == 0 { 0.0 } else { occupancy as f64 / max_occupancy as f64 };
    HSLColor((1.0 - ratio) * 120.0 / 360.0, 0.75, 0.5)
}

fn create_single_histogram(
    values: &[f64],
    title: &str,
    path: &Path,
    x_label: &str,
    color: &RGBColor,
) -> Result<(), Box<dyn std::error::Error>> {
    if values.is_empty() {
        return Err("Cannot create histogram: dataset is empty".into());
    }

    let (min_val, bin_width, bins) = bin_values(values, NUM_BINS);
    let max_val = min_val + bin_width * NUM_BINS as f64;
    let mean_val = mean(values);
    let max_count = *bins.iter().max().unwrap_or(&0);

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(min_val..max_val, 0u32..max_count + max_count / 10 + 1)?;

    chart.configure_mesh()
        .x_desc(x_label)
        .y_desc("Count")
        .draw()?;

    chart.draw_series(
        bins.iter().enumerate().map(|(i, &count)| {
            let x0 = min_val + i as f64 * bin_width;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0), (x1, count)], color.filled())
        })
    )?
    .label(format!("Trials (n={})", values.len()))
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(mean_val, 0), (mean_val, max_count)],
        &BLACK,
    )))?
    .label(format!("Mean: {:.3}", mean_val))
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Density bars with utility and win probability on a secondary axis, optimum marked
fn create_balance_graph(density: &DensityHistogram, outcome: &OptimizerOutcome, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (low, high) = outcome.table.scan_range;
    let buckets: Vec<_> = density
        .buckets()
        .into_iter()
        .filter(|b| b.end > low && b.start < high)
        .collect();
    let max_count = buckets.iter().map(|b| b.occupancy).max().unwrap_or(0);
    let max_utility = outcome
        .table
        .candidates
        .iter()
        .map(|c| c.utility)
        .fold(f64::NEG_INFINITY, f64::max)
        .max(f64::MIN_POSITIVE);

    let root = BitMapBackend::new(path, (1200, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Balance: competition density vs expected utility", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .right_y_label_area_size(50)
        .build_cartesian_2d(low..high, 0u32..max_count + max_count / 10 + 1)?
        .set_secondary_coord(low..high, 0.0..1.05);

    chart.configure_mesh()
        .x_desc("Bid rate (% of base)")
        .y_desc("Competitors per bucket")
        .draw()?;
    chart.configure_secondary_axes()
        .y_desc("Normalized utility / win probability")
        .draw()?;

    chart.draw_series(buckets.iter().map(|b| {
        Rectangle::new([(b.start.max(low), 0), (b.end.min(high), b.occupancy)], BLUE.mix(0.3).filled())
    }))?
    .label("Competitors")
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.mix(0.3).filled()));

    chart.draw_secondary_series(LineSeries::new(
        outcome.table.candidates.iter().map(|c| (c.rate, (c.utility / max_utility).max(0.0))),
        &RED,
    ))?
    .label("Expected utility (normalized)")
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart.draw_secondary_series(LineSeries::new(
        outcome.table.candidates.iter().map(|c| (c.rate, c.win_probability)),
        &GREEN,
    ))?
    .label("Win probability")
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));

    let optimum = outcome.optimum.rate;
    chart.draw_secondary_series(std::iter::once(PathElement::new(
        vec![(optimum, 0.0), (optimum, 1.05)],
        &BLACK,
    )))?
    .label(format!("Optimum: {:.3}%", optimum))
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// One colored cell per density bucket across the scan range
fn create_heat_strip(density: &DensityHistogram, outcome: &OptimizerOutcome, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (low, high) = outcome.table.scan_range;
    let max_occupancy = density.max_occupancy();

    let root = BitMapBackend::new(path, (1200, 300)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Competition density (red = crowded, green = open)", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .build_cartesian_2d(low..high, 0.0..1.0)?;

    chart.configure_mesh()
        .disable_y_mesh()
        .disable_y_axis()
        .x_desc("Bid rate (% of base)")
        .draw()?;

    chart.draw_series(
        density
            .buckets()
            .into_iter()
            .filter(|b| b.end > low && b.start < high)
            .map(|b| {
                Rectangle::new(
                    [(b.start.max(low), 0.0), (b.end.min(high), 1.0)],
                    heat_color(b.occupancy, max_occupancy).filled(),
                )
            }),
    )?;

    let optimum = outcome.optimum.rate;
    chart.draw_series(std::iter::once(PathElement::new(vec![(optimum, 0.0), (optimum, 1.0)], &BLACK)))?;

    root.present()?;
    Ok(())
}
