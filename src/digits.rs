/// Digit-pattern analysis of historical bid ratios and implied bid amounts.
///
/// Bidders favour some decimals and some amount endings; the tables here show which ones.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::DigitConfig;
use crate::error::AnalysisError;

/// Absorbs representation error such as 99.52 * 100 = 9951.999...
const DIGIT_EPSILON: f64 = 1e-6;

pub const DECIMAL_POSITIONS: u32 = 3;

/// k-th decimal digit of `value`, k starting at 1
pub fn decimal_digit(value: f64, k: u32) -> u8 {
    let scaled = (value.abs() * 10f64.powi(k as i32) + DIGIT_EPSILON).floor();
    (scaled % 10.0) as u8
}

/// Truncated integer currency amount of `ratio` percent of `base_amount`
pub fn implied_amount(base_amount: f64, ratio: f64) -> u64 {
    (base_amount * ratio / 100.0 + DIGIT_EPSILON).floor().max(0.0) as u64
}

/// Last three digits of an amount
pub fn amount_ending(amount: u64) -> u32 {
    (amount % 1000) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitCount {
    pub digit: u8,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitPosition {
    pub position: u32,
    pub frequencies: [u32; 10],
    pub most_frequent: Vec<DigitCount>,
    pub least_frequent: Vec<DigitCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndingCount {
    pub ending: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndingPatterns {
    pub distinct: usize,
    pub most_frequent: Vec<EndingCount>,
    /// Among endings that were observed at all
    pub least_frequent: Vec<EndingCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitPatterns {
    pub sample_size: usize,
    pub positions: Vec<DigitPosition>,
    pub endings: EndingPatterns,
}

impl DigitPatterns {
    /// Rarest observed amount endings, rarest first
    pub fn rare_endings(&self) -> Vec<u32> {
        self.endings.least_frequent.iter().map(|e| e.ending).collect()
    }
}

fn digit_position(ratios: &[f64], position: u32, top: usize) -> DigitPosition {
    let mut frequencies = [0u32; 10];
    for &ratio in ratios {
        frequencies[decimal_digit(ratio, position) as usize] += 1;
    }
    let counts: Vec<DigitCount> = (0..10u8)
        .map(|digit| DigitCount {
            digit,
            count: frequencies[digit as usize],
        })
        .collect();

    // counts is ascending by digit, stable sorts keep that order within a tie
    let mut most = counts.clone();
    most.sort_by(|a, b| b.count.cmp(&a.count));
    most.truncate(top);
    let mut least = counts;
    least.sort_by_key(|c| c.count);
    least.truncate(top);

    DigitPosition {
        position,
        frequencies,
        most_frequent: most,
        least_frequent: least,
    }
}

fn ending_patterns(base_amount: f64, ratios: &[f64], top: usize) -> EndingPatterns {
    let mut table: BTreeMap<u32, u32> = BTreeMap::new();
    for &ratio in ratios {
        *table.entry(amount_ending(implied_amount(base_amount, ratio))).or_insert(0) += 1;
    }
    let counts: Vec<EndingCount> = table.into_iter().map(|(ending, count)| EndingCount { ending, count }).collect();

    let mut most = counts.clone();
    most.sort_by(|a, b| b.count.cmp(&a.count));
    most.truncate(top);
    let distinct = counts.len();
    let mut least = counts;
    least.sort_by_key(|c| c.count);
    least.truncate(top);

    EndingPatterns {
        distinct,
        most_frequent: most,
        least_frequent: least,
    }
}

/// Frequency tables of the first three decimals of `ratios` and of the amount endings they
/// imply for `base_amount`
pub fn analyze_digits(base_amount: f64, ratios: &[f64], config: &DigitConfig) -> Result<DigitPatterns, AnalysisError> {
    let ratios: Vec<f64> = ratios.iter().copied().filter(|r| r.is_finite()).collect();
    if ratios.is_empty() {
        return Err(AnalysisError::InsufficientSample("no bid ratios for digit analysis".to_string()));
    }
    Ok(DigitPatterns {
        sample_size: ratios.len(),
        positions: (1..=DECIMAL_POSITIONS)
            .map(|k| digit_position(&ratios, k, config.top_digits))
            .collect(),
        endings: ending_patterns(base_amount, &ratios, config.top_endings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_digit_extraction() {
        assert_eq!(decimal_digit(99.527, 1), 5);
        assert_eq!(decimal_digit(99.527, 2), 2);
        assert_eq!(decimal_digit(99.527, 3), 7);
        assert_eq!(decimal_digit(99.52, 2), 2);
        assert_eq!(decimal_digit(100.0, 1), 0);
    }

    #[test]
    fn test_amount_endings() {
        assert_eq!(implied_amount(39_000_000.0, 99.5), 38_805_000);
        assert_eq!(amount_ending(38_805_000), 0);
        assert_eq!(amount_ending(38_805_123), 123);
    }

    #[test]
    fn test_frequency_tables_and_ties() {
        let ratios = vec![99.511, 99.522, 99.533, 99.544, 99.611];
        let patterns = analyze_digits(1_000_000.0, &ratios, &DigitConfig::default()).unwrap();
        assert_eq!(patterns.sample_size, 5);

        let first = &patterns.positions[0];
        assert_eq!(first.frequencies[5], 4);
        assert_eq!(first.frequencies[6], 1);
        assert_eq!(first.most_frequent[0], DigitCount { digit: 5, count: 4 });
        assert_eq!(first.most_frequent[1], DigitCount { digit: 6, count: 1 });
        // zero-count digits tie, ascending digit order
        assert_eq!(first.least_frequent[0].digit, 0);
        assert_eq!(first.least_frequent[1].digit, 1);

        let second = &patterns.positions[1];
        // digits 1 appear twice (99.511, 99.611)
        assert_eq!(second.most_frequent[0], DigitCount { digit: 1, count: 2 });
        assert_eq!(second.frequencies.iter().sum::<u32>(), 5);
    }

    #[test]
    fn test_endings_only_list_observed() {
        let ratios = vec![99.5, 99.5, 99.5001, 99.6];
        let patterns = analyze_digits(1_000_000.0, &ratios, &DigitConfig::default()).unwrap();
        // 995000, 995000, 995001, 996000
        assert_eq!(patterns.endings.distinct, 2);
        assert_eq!(patterns.endings.most_frequent[0], EndingCount { ending: 0, count: 3 });
        assert_eq!(patterns.rare_endings(), vec![1, 0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(analyze_digits(1.0, &[], &DigitConfig::default()).unwrap_err().is_absence());
    }
}
