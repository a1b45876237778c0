/// Historical participant records and their loader.
///
/// The history is a CSV export of the pre-cleaned auction spreadsheet: one row per participant
/// of a past announcement. Headers may use the Korean column names of the export or English ones.
/// Rows whose ratio or rank cannot be parsed are skipped and counted, never fatal.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

use crate::error::AnalysisError;
use crate::stats::{percentile, round_to};

pub const RANK_WINNER: i32 = 1;
pub const RANK_DISQUALIFIED: i32 = -1;

/// One participant of a past auction
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalBidRecord {
    /// Bid amount / base amount * 100
    pub bid_ratio_to_base: f64,
    /// 1 = winner, -1 = disqualified below the floor, other positive values = runner-up order
    pub rank: i32,
    /// Announcement reserve price / base amount * 100, when the export has it
    pub reserve_ratio_to_base: Option<f64>,
    pub bid_timestamp: Option<NaiveDateTime>,
    pub agency_id: Option<String>,
    pub announcement_id: Option<String>,
}

impl HistoricalBidRecord {
    pub fn new(bid_ratio_to_base: f64, rank: i32) -> Self {
        Self {
            bid_ratio_to_base,
            rank,
            reserve_ratio_to_base: None,
            bid_timestamp: None,
            agency_id: None,
            announcement_id: None,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.rank == RANK_WINNER
    }
}

/// Filter to first-place records. Pure, so applying it twice changes nothing.
pub fn filter_winners(records: &[HistoricalBidRecord]) -> Vec<HistoricalBidRecord> {
    records.iter().filter(|r| r.is_winner()).cloned().collect()
}

/// Keep only records whose bid ratio is inside [lo, hi]
pub fn filter_valid_range(records: &[HistoricalBidRecord], lo: f64, hi: f64) -> Vec<HistoricalBidRecord> {
    records
        .iter()
        .filter(|r| r.bid_ratio_to_base >= lo && r.bid_ratio_to_base <= hi)
        .cloned()
        .collect()
}

/// Drop ratios outside [Q1 - k*IQR, Q3 + k*IQR]; returns the kept ratios and the fences
pub fn trim_iqr_outliers(rates: &[f64], factor: f64) -> (Vec<f64>, (f64, f64)) {
    if rates.is_empty() {
        return (Vec::new(), (f64::NEG_INFINITY, f64::INFINITY));
    }
    let mut sorted = rates.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let fences = (q1 - factor * iqr, q3 + factor * iqr);
    let kept = rates.iter().copied().filter(|&r| r >= fences.0 && r <= fences.1).collect();
    (kept, fences)
}

/// Which optional columns the loaded file carried
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetColumns {
    pub reserve_ratio: bool,
    pub timestamp: bool,
    pub agency: bool,
    pub announcement: bool,
}

/// All rows loaded from one history file
#[derive(Debug, Clone, Default)]
pub struct HistoricalDataset {
    pub records: Vec<HistoricalBidRecord>,
    pub skipped_rows: usize,
    pub columns: DatasetColumns,
}

impl HistoricalDataset {
    pub fn from_records(records: Vec<HistoricalBidRecord>) -> Self {
        let columns = DatasetColumns {
            reserve_ratio: records.iter().any(|r| r.reserve_ratio_to_base.is_some()),
            timestamp: records.iter().any(|r| r.bid_timestamp.is_some()),
            agency: records.iter().any(|r| r.agency_id.is_some()),
            announcement: records.iter().any(|r| r.announcement_id.is_some()),
        };
        Self {
            records,
            skipped_rows: 0,
            columns,
        }
    }

    pub fn disqualified_count(&self) -> usize {
        self.records.iter().filter(|r| r.rank == RANK_DISQUALIFIED).count()
    }
}

const BID_RATIO_HEADERS: &[&str] = &["기초대비투찰률", "bid_ratio_to_base", "bidRatioToBase"];
const RANK_HEADERS: &[&str] = &["순위", "rank"];
const RESERVE_RATIO_HEADERS: &[&str] = &["기초대비사정률", "reserve_ratio_to_base", "reserveRatioToBase"];
const TIMESTAMP_HEADERS: &[&str] = &["투찰일시", "bid_timestamp", "bidTimestamp"];
const AGENCY_HEADERS: &[&str] = &["발주처", "agency_id", "agencyId"];
const ANNOUNCEMENT_HEADERS: &[&str] = &["공고번호", "announcement_id", "announcementId"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y.%m.%d %H:%M",
];

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let name = h.trim().trim_start_matches('\u{feff}');
        candidates.iter().any(|c| c.eq_ignore_ascii_case(name))
    })
}

fn parse_number(field: Option<&str>) -> Option<f64> {
    let text = field?.trim().trim_end_matches('%').replace(',', "");
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ranks come out of spreadsheets as "1" or "1.0"
fn parse_rank(field: Option<&str>) -> Option<i32> {
    let value = parse_number(field)?;
    if value.fract() != 0.0 {
        return None;
    }
    Some(value as i32)
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn optional_text(record: &csv::StringRecord, column: Option<usize>) -> Option<String> {
    column
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Load a CSV history file
pub fn load_csv(path: &Path) -> Result<HistoricalDataset, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::DataFileNotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let ratio_col = find_column(&headers, BID_RATIO_HEADERS).ok_or_else(|| AnalysisError::MissingColumn {
        column: BID_RATIO_HEADERS[0],
        path: path.to_path_buf(),
    })?;
    let rank_col = find_column(&headers, RANK_HEADERS).ok_or_else(|| AnalysisError::MissingColumn {
        column: RANK_HEADERS[0],
        path: path.to_path_buf(),
    })?;
    let reserve_col = find_column(&headers, RESERVE_RATIO_HEADERS);
    let timestamp_col = find_column(&headers, TIMESTAMP_HEADERS);
    let agency_col = find_column(&headers, AGENCY_HEADERS);
    let announcement_col = find_column(&headers, ANNOUNCEMENT_HEADERS);

    let mut records = Vec::new();
    let mut skipped_rows = 0;
    for row in reader.records() {
        let row = row?;
        let ratio = parse_number(row.get(ratio_col));
        let rank = parse_rank(row.get(rank_col));
        let (Some(bid_ratio_to_base), Some(rank)) = (ratio, rank) else {
            skipped_rows += 1;
            continue;
        };

        records.push(HistoricalBidRecord {
            bid_ratio_to_base,
            rank,
            reserve_ratio_to_base: reserve_col.and_then(|i| parse_number(row.get(i))),
            bid_timestamp: timestamp_col.and_then(|i| row.get(i)).and_then(parse_timestamp),
            agency_id: optional_text(&row, agency_col),
            announcement_id: optional_text(&row, announcement_col),
        });
    }

    Ok(HistoricalDataset {
        records,
        skipped_rows,
        columns: DatasetColumns {
            reserve_ratio: reserve_col.is_some(),
            timestamp: timestamp_col.is_some(),
            agency: agency_col.is_some(),
            announcement: announcement_col.is_some(),
        },
    })
}

/// Short human readable description of a dataset for the logs
pub fn describe(dataset: &HistoricalDataset) -> String {
    let winners = dataset.records.iter().filter(|r| r.is_winner()).count();
    let min = dataset.records.iter().map(|r| r.bid_ratio_to_base).fold(f64::INFINITY, f64::min);
    let max = dataset.records.iter().map(|r| r.bid_ratio_to_base).fold(f64::NEG_INFINITY, f64::max);
    if dataset.records.is_empty() {
        return format!("0 records ({} skipped)", dataset.skipped_rows);
    }
    format!(
        "{} records, {} winners, {} disqualified, ratios {:.3}% ~ {:.3}% ({} skipped)",
        dataset.records.len(),
        winners,
        dataset.disqualified_count(),
        round_to(min, 3),
        round_to(max, 3),
        dataset.skipped_rows
    )
}
