use crate::models::{Bar, Side};

const MIN_STREAK_BARS: usize = 10;

/// One maximal run of same-direction closes
#[derive(Debug, Clone)]
struct Run {
    side: Side,
    start_price: f64,
    /// Indices of the bars in the run (flat bars are skipped, not counted)
    bars: Vec<usize>,
    high: f64,
    low: f64,
}

impl Run {
    fn len(&self) -> usize {
        self.bars.len()
    }

    fn move_pct_at(&self, closes: &[f64], length: usize) -> Option<f64> {
        let idx = *self.bars.get(length.checked_sub(1)?)?;
        Some((closes[idx] - self.start_price).abs() / self.start_price * 100.0)
    }
}

/// Min/avg/max of absolute % moves across matching historical runs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveStats {
    pub avg_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

impl MoveStats {
    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        Self {
            avg_pct: samples.iter().sum::<f64>() / samples.len() as f64,
            min_pct: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_pct: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Statistics for the active streak
#[derive(Debug, Clone, PartialEq)]
pub struct StreakAnalysis {
    pub side: Side,
    pub length: usize,
    pub start_price: f64,
    pub current_move_pct: f64,
    pub high: f64,
    pub low: f64,
    /// Completed same-direction runs at least as long as the current one
    pub matching_runs: usize,
    /// Fraction of matching runs that kept going past the current length, in [0, 1]
    pub continuation_prob: f64,
    /// Moves of matching runs when they were as long as the current run
    pub stage_moves: MoveStats,
    /// Moves of matching runs at their final length
    pub final_moves: MoveStats,
}

impl StreakAnalysis {
    pub fn reversal_prob(&self) -> f64 {
        if self.matching_runs == 0 {
            0.0
        } else {
            1.0 - self.continuation_prob
        }
    }
}

fn collect_runs(bars: &[Bar]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();

    for i in 1..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        let side = if change > 0.0 {
            Side::Buy
        } else if change < 0.0 {
            Side::Sell
        } else {
            continue;
        };

        match runs.last_mut() {
            Some(run) if run.side == side => {
                run.bars.push(i);
                run.high = run.high.max(bars[i].high);
                run.low = run.low.min(bars[i].low);
            }
            _ => runs.push(Run {
                side,
                start_price: bars[i - 1].close,
                bars: vec![i],
                high: bars[i].high,
                low: bars[i].low,
            }),
        }
    }

    runs
}

/// Analyze the streak in progress on the last bars
///
/// Returns None with fewer than 10 bars or when every close is flat.
pub fn analyze_streak(bars: &[Bar]) -> Option<StreakAnalysis> {
    if bars.len() < MIN_STREAK_BARS {
        return None;
    }

    let mut runs = collect_runs(bars);
    let current = runs.pop()?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let length = current.len();

    let matching: Vec<&Run> = runs
        .iter()
        .filter(|r| r.side == current.side && r.len() >= length)
        .collect();
    let continued = matching.iter().filter(|r| r.len() > length).count();
    let continuation_prob = if matching.is_empty() {
        0.0
    } else {
        continued as f64 / matching.len() as f64
    };

    let stage: Vec<f64> = matching
        .iter()
        .filter_map(|r| r.move_pct_at(&closes, length))
        .collect();
    let finals: Vec<f64> = matching
        .iter()
        .filter_map(|r| r.move_pct_at(&closes, r.len()))
        .collect();

    let last_close = closes[closes.len() - 1];
    Some(StreakAnalysis {
        side: current.side,
        length,
        start_price: current.start_price,
        current_move_pct: (last_close - current.start_price).abs() / current.start_price * 100.0,
        high: current.high,
        low: current.low,
        matching_runs: matching.len(),
        continuation_prob,
        stage_moves: MoveStats::from_samples(&stage),
        final_moves: MoveStats::from_samples(&finals),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + chrono::Duration::minutes(15 * i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_continuation_probability() {
        // up runs of 4 and 2, then a current up run of 2
        let closes = [
            100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0, 103.0, 104.0, 103.0, 104.0, 105.0,
        ];
        let analysis = analyze_streak(&bars_from_closes(&closes)).unwrap();

        assert_eq!(analysis.side, Side::Buy);
        assert_eq!(analysis.length, 2);
        assert_eq!(analysis.matching_runs, 2);
        // only the 4-bar run went further than 2
        assert!((analysis.continuation_prob - 0.5).abs() < 1e-12);
        assert!((analysis.reversal_prob() - 0.5).abs() < 1e-12);
        assert_eq!(analysis.start_price, 103.0);
    }

    #[test]
    fn test_stage_and_final_moves() {
        let closes = [
            100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0, 103.0, 104.0, 103.0, 104.0, 105.0,
        ];
        let analysis = analyze_streak(&bars_from_closes(&closes)).unwrap();

        // first run: 100 -> 102 at stage 2, 100 -> 104 final
        // second run: 102 -> 104 at stage 2 and final
        let expected_stage = (2.0 + 2.0 / 102.0 * 100.0) / 2.0;
        assert!((analysis.stage_moves.avg_pct - expected_stage).abs() < 1e-9);
        assert!((analysis.final_moves.max_pct - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_bars_are_ignored() {
        let closes = [
            100.0, 99.0, 98.0, 98.0, 99.0, 99.0, 100.0, 100.0, 101.0, 101.0, 102.0,
        ];
        let analysis = analyze_streak(&bars_from_closes(&closes)).unwrap();

        assert_eq!(analysis.side, Side::Buy);
        assert_eq!(analysis.length, 4);
        assert_eq!(analysis.start_price, 98.0);
        assert_eq!(analysis.matching_runs, 0);
        assert_eq!(analysis.continuation_prob, 0.0);
        assert_eq!(analysis.reversal_prob(), 0.0);
    }

    #[test]
    fn test_requires_ten_bars() {
        let closes = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0];
        assert!(analyze_streak(&bars_from_closes(&closes)).is_none());
    }
}
