/// Error taxonomy for the analysis pipeline.
///
/// Two families live here:
/// - absence-of-data conditions (missing file, missing column, too few samples, empty scan range)
///   which the pipeline turns into `Availability::Unavailable` report sections
/// - everything else (IO, CSV parsing, bad parameters) which propagates to the caller

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("data file not found: {}", .0.display())]
    DataFileNotFound(PathBuf),

    #[error("required column '{column}' missing from {}", .path.display())]
    MissingColumn { column: &'static str, path: PathBuf },

    #[error("cannot draw {draws} distinct prices from {available} preliminary prices")]
    InsufficientDraws { draws: usize, available: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("insufficient sample: {0}")]
    InsufficientSample(String),

    #[error("empty scan range [{min:.3}, {max:.3})")]
    EmptyScanRange { min: f64, max: f64 },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl AnalysisError {
    /// True for the expected "there is nothing to analyze" conditions
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            AnalysisError::DataFileNotFound(_)
                | AnalysisError::MissingColumn { .. }
                | AnalysisError::InsufficientSample(_)
                | AnalysisError::EmptyScanRange { .. }
        )
    }
}

/// A report section that is either computed or explicitly marked as not computable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Availability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable { reason: reason.into() }
    }

    /// Convert a component result: absence errors become `Unavailable`, the rest propagate
    pub fn from_result(result: Result<T, AnalysisError>) -> Result<Self, AnalysisError> {
        match result {
            Ok(value) => Ok(Availability::Available(value)),
            Err(e) if e.is_absence() => Ok(Availability::unavailable(e.to_string())),
            Err(e) => Err(e),
        }
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Availability::Available(value) => Some(value),
            Availability::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Block {
        value: u32,
    }

    #[test]
    fn test_absence_errors_become_unavailable() {
        let result: Result<Block, AnalysisError> = Err(AnalysisError::DataFileNotFound(PathBuf::from("missing.csv")));
        let section = Availability::from_result(result).unwrap();
        assert!(!section.is_available());
        match section {
            Availability::Unavailable { reason } => assert!(reason.contains("missing.csv")),
            Availability::Available(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_unexpected_errors_propagate() {
        let result: Result<Block, AnalysisError> = Err(AnalysisError::InvalidParameter("negative width".to_string()));
        assert!(Availability::from_result(result).is_err());
    }

    #[test]
    fn test_serialized_status_tag() {
        let available = Availability::Available(Block { value: 7 });
        let json = serde_json::to_value(&available).unwrap();
        assert_eq!(json["status"], "available");
        assert_eq!(json["value"], 7);

        let missing: Availability<Block> = Availability::unavailable("no winners");
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "no winners");
    }
}
