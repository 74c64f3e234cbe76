// Trading strategy module
pub mod pullback;
pub mod scalp;
pub mod signals;
pub mod smart;
pub mod streak;
pub mod swing;

pub use pullback::PullbackStrategy;
pub use scalp::ScalpStrategy;
pub use signals::{validate_bar_sequence, SignalConfig};
pub use smart::SmartStrategy;
pub use streak::StreakStrategy;
pub use swing::SwingStrategy;

use crate::models::{Bar, StrategyTag, Timeframe, TradeSignal};
use std::collections::HashMap;

/// Bar series for one symbol, keyed by timeframe
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub symbol: String,
    /// Broker point size, for thresholds expressed in points
    pub point: f64,
    series: HashMap<Timeframe, Vec<Bar>>,
}

impl MarketData {
    pub fn new(symbol: impl Into<String>, point: f64) -> Self {
        Self {
            symbol: symbol.into(),
            point,
            series: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.insert(timeframe, bars);
        self
    }

    pub fn insert(&mut self, timeframe: Timeframe, bars: Vec<Bar>) {
        self.series.insert(timeframe, bars);
    }

    pub fn has(&self, timeframe: Timeframe) -> bool {
        self.series.contains_key(&timeframe)
    }

    /// Bars for `timeframe`, empty if none were loaded
    pub fn bars(&self, timeframe: Timeframe) -> &[Bar] {
        self.series.get(&timeframe).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Base trait for all entry strategies
///
/// A strategy is a pure function of the market data: no state, no I/O.
pub trait Strategy: Send + Sync {
    /// Evaluate the latest bars, yielding at most one entry candidate
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal>;

    /// Get strategy name
    fn name(&self) -> &str;

    fn tag(&self) -> StrategyTag;

    /// Timeframe whose new bars drive this strategy
    fn timeframe(&self) -> Timeframe;

    /// Every timeframe `evaluate` reads
    fn required_timeframes(&self) -> Vec<Timeframe> {
        vec![self.timeframe()]
    }

    /// Minimum bars on the driving timeframe
    fn min_bars_required(&self) -> usize;
}

/// First strategy in order whose signal passes `accept`, with its position
///
/// A rejected signal does not count as a match, so evaluation moves on to
/// the next strategy. Later strategies are not evaluated once one is accepted.
pub fn first_signal<'a, I, F>(strategies: I, market: &MarketData, mut accept: F) -> Option<(usize, TradeSignal)>
where
    I: IntoIterator<Item = &'a dyn Strategy>,
    F: FnMut(&TradeSignal) -> bool,
{
    strategies
        .into_iter()
        .enumerate()
        .filter_map(|(index, strategy)| strategy.evaluate(market).map(|signal| (index, signal)))
        .find(|(_, signal)| accept(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        signal: Option<TradeSignal>,
        calls: AtomicUsize,
    }

    impl Strategy for Fixed {
        fn evaluate(&self, _market: &MarketData) -> Option<TradeSignal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.signal.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn tag(&self) -> StrategyTag {
            StrategyTag::Swing
        }

        fn timeframe(&self) -> Timeframe {
            Timeframe::M15
        }

        fn min_bars_required(&self) -> usize {
            0
        }
    }

    fn fixed(signal: Option<TradeSignal>) -> Fixed {
        Fixed {
            signal,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_first_match_wins_and_stops() {
        let long = TradeSignal::new(Side::Buy, 10.0, 9.0, 12.0, StrategyTag::Swing, 0.7);
        let short = TradeSignal::new(Side::Sell, 10.0, 11.0, 8.0, StrategyTag::Scalp, 0.6);
        let strategies = [fixed(None), fixed(long.clone()), fixed(short)];

        let market = MarketData::new("EURUSD", 0.00001);
        let (index, signal) =
            first_signal(strategies.iter().map(|s| s as &dyn Strategy), &market, |_| true).unwrap();

        assert_eq!(index, 1);
        assert_eq!(Some(signal), long);
        assert_eq!(strategies[0].calls.load(Ordering::SeqCst), 1);
        assert_eq!(strategies[2].calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_strategy_fires() {
        let strategies = [fixed(None), fixed(None)];
        let market = MarketData::new("EURUSD", 0.00001);

        assert!(first_signal(strategies.iter().map(|s| s as &dyn Strategy), &market, |_| true).is_none());
    }

    #[test]
    fn test_rejected_signal_falls_through() {
        let short = TradeSignal::new(Side::Sell, 10.0, 11.0, 8.0, StrategyTag::Swing, 0.6);
        let long = TradeSignal::new(Side::Buy, 10.0, 9.0, 12.0, StrategyTag::Pullback, 0.7);
        let strategies = [fixed(short), fixed(long.clone())];
        let market = MarketData::new("EURUSD", 0.00001);

        let (index, signal) = first_signal(
            strategies.iter().map(|s| s as &dyn Strategy),
            &market,
            |signal| signal.side() == Side::Buy,
        )
        .unwrap();

        assert_eq!(index, 1);
        assert_eq!(Some(signal), long);
    }

    #[test]
    fn test_missing_timeframe_is_empty() {
        let market = MarketData::new("EURUSD", 0.00001);
        assert!(market.bars(Timeframe::H1).is_empty());
        assert!(!market.has(Timeframe::H1));
    }
}
