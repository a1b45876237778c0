/// Psychological floor line: the lowest rate worth bidding.

use serde::Serialize;

use crate::config::FloorLineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorBasis {
    HistoricalWinners,
    SimulatedFloor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloorLine {
    pub min_winner_ratio: Option<f64>,
    pub simulated_floor_p5: f64,
    pub safe_floor: f64,
    pub recommended_minimum: f64,
    pub basis: FloorBasis,
}

/// max(lowest winner - margin, 5th percentile of simulated floors), plus a cushion
pub fn floor_line(min_winner_ratio: Option<f64>, simulated_floor_p5: f64, config: &FloorLineConfig) -> FloorLine {
    let historical = min_winner_ratio.map(|m| m - config.margin_below_min);
    let (safe_floor, basis) = match historical {
        Some(h) if h > simulated_floor_p5 => (h, FloorBasis::HistoricalWinners),
        _ => (simulated_floor_p5, FloorBasis::SimulatedFloor),
    };
    FloorLine {
        min_winner_ratio,
        simulated_floor_p5,
        safe_floor,
        recommended_minimum: safe_floor + config.cushion,
        basis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_floor_dominates() {
        let line = floor_line(Some(99.4), 87.6, &FloorLineConfig::default());
        assert!((line.safe_floor - 99.3).abs() < 1e-9);
        assert!((line.recommended_minimum - 99.35).abs() < 1e-9);
        assert_eq!(line.basis, FloorBasis::HistoricalWinners);
    }

    #[test]
    fn test_simulated_floor_dominates() {
        let line = floor_line(Some(87.0), 87.6, &FloorLineConfig::default());
        assert_eq!(line.safe_floor, 87.6);
        assert_eq!(line.basis, FloorBasis::SimulatedFloor);

        let no_winners = floor_line(None, 87.6, &FloorLineConfig::default());
        assert_eq!(no_winners.safe_floor, 87.6);
        assert!((no_winners.recommended_minimum - 87.65).abs() < 1e-9);
    }
}
