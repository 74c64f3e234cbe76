use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::execution::reconciler::ExitReconciler;
use crate::models::{StrategyTag, Timeframe};
use crate::risk::TradingState;

/// Outcome of offering a mode's latest bar to the symbol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First bar seen for this mode, recorded only
    Warmup,
    /// Bar already processed
    SameBar,
    /// Too soon after the last close on the symbol
    PostCloseCooldown,
    /// Too soon after the last entry on the symbol
    ReentryCooldown,
    Ready,
}

impl Admission {
    pub fn is_ready(self) -> bool {
        self == Admission::Ready
    }
}

/// Per-symbol entry cadence, created lazily and never persisted
#[derive(Debug, Clone, Default)]
pub struct SymbolState {
    /// Latest bar seen per entry mode and its timeframe
    last_bar: HashMap<(StrategyTag, Timeframe), DateTime<Utc>>,
    pub last_close: Option<DateTime<Utc>>,
    pub last_entry: Option<DateTime<Utc>>,
}

impl SymbolState {
    /// Offer the latest bar of an entry mode
    ///
    /// New bars are recorded before the cooldowns are checked, so a bar
    /// skipped for cooldown is not offered again.
    ///
    /// # Arguments
    /// * `mode` - Tag of the entry mode offering the bar
    /// * `timeframe` - Driving timeframe of the mode
    /// * `bar_time` - Timestamp of the mode's latest bar
    /// * `post_close_cooldown` - Minimum wait after the last close
    /// * `cooldown_bars` - Bars of the mode's timeframe to wait after an entry
    pub fn admit(
        &mut self,
        mode: StrategyTag,
        timeframe: Timeframe,
        bar_time: DateTime<Utc>,
        post_close_cooldown: Duration,
        cooldown_bars: i64,
    ) -> Admission {
        let key = (mode, timeframe);
        match self.last_bar.get(&key) {
            None => {
                self.last_bar.insert(key, bar_time);
                return Admission::Warmup;
            }
            Some(&seen) if bar_time <= seen => return Admission::SameBar,
            Some(_) => {
                self.last_bar.insert(key, bar_time);
            }
        }

        if let Some(closed) = self.last_close {
            if bar_time - closed < post_close_cooldown {
                return Admission::PostCloseCooldown;
            }
        }

        if let Some(entered) = self.last_entry {
            if bar_time - entered <= timeframe.duration() * cooldown_bars as i32 {
                return Admission::ReentryCooldown;
            }
        }

        Admission::Ready
    }

    pub fn last_bar(&self, mode: StrategyTag, timeframe: Timeframe) -> Option<DateTime<Utc>> {
        self.last_bar.get(&(mode, timeframe)).copied()
    }

    pub fn record_entry(&mut self, time: DateTime<Utc>) {
        self.last_entry = Some(time);
    }

    /// Keep the latest close, deals can arrive out of order
    pub fn record_close(&mut self, time: DateTime<Utc>) {
        if self.last_close.map_or(true, |prev| time > prev) {
            self.last_close = Some(time);
        }
    }
}

/// Everything the engine remembers between cycles
#[derive(Debug)]
pub struct EngineState {
    pub session: TradingState,
    pub symbols: HashMap<String, SymbolState>,
    /// Best locked profit per ticket, recorded after the broker accepted the stop
    pub trailing_locks: HashMap<u64, f64>,
    pub exits: ExitReconciler,
    pub session_start: DateTime<Utc>,
    pub cycles: u64,
}

impl EngineState {
    pub fn new(baseline_equity: f64, started: DateTime<Utc>) -> Self {
        Self {
            session: TradingState::new(baseline_equity),
            symbols: HashMap::new(),
            trailing_locks: HashMap::new(),
            exits: ExitReconciler::new(started),
            session_start: started,
            cycles: 0,
        }
    }

    pub fn symbol_mut(&mut self, symbol: &str) -> &mut SymbolState {
        self.symbols.entry(symbol.to_string()).or_default()
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    pub fn trailing_lock(&self, ticket: u64) -> Option<f64> {
        self.trailing_locks.get(&ticket).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SWING: StrategyTag = StrategyTag::Swing;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    #[test]
    fn test_first_bar_is_warmup_then_same_bar() {
        let mut state = SymbolState::default();

        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 0), Duration::minutes(15), 1), Admission::Warmup);
        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 0), Duration::minutes(15), 1), Admission::SameBar);
        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 15), Duration::minutes(15), 1), Admission::Ready);
    }

    #[test]
    fn test_warmup_is_per_timeframe() {
        let mut state = SymbolState::default();

        state.admit(SWING, Timeframe::M15, t(10, 0), Duration::zero(), 1);
        assert_eq!(state.admit(SWING, Timeframe::M1, t(10, 1), Duration::zero(), 1), Admission::Warmup);
        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 15), Duration::zero(), 1), Admission::Ready);
    }

    #[test]
    fn test_modes_on_one_timeframe_see_each_bar() {
        let mut state = SymbolState::default();

        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 0), Duration::zero(), 1), Admission::Warmup);
        assert_eq!(
            state.admit(StrategyTag::Pullback, Timeframe::M15, t(10, 0), Duration::zero(), 1),
            Admission::Warmup
        );
        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 15), Duration::zero(), 1), Admission::Ready);
        assert_eq!(
            state.admit(StrategyTag::Pullback, Timeframe::M15, t(10, 15), Duration::zero(), 1),
            Admission::Ready
        );
        assert_eq!(state.last_bar(StrategyTag::Pullback, Timeframe::M15), Some(t(10, 15)));
    }

    #[test]
    fn test_reentry_cooldown_is_inclusive() {
        let mut state = SymbolState::default();
        state.admit(SWING, Timeframe::M15, t(10, 0), Duration::zero(), 1);
        state.record_entry(t(10, 0));

        assert_eq!(
            state.admit(SWING, Timeframe::M15, t(10, 15), Duration::zero(), 1),
            Admission::ReentryCooldown
        );
        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 30), Duration::zero(), 1), Admission::Ready);
    }

    #[test]
    fn test_post_close_cooldown_is_strict() {
        let mut state = SymbolState::default();
        state.admit(SWING, Timeframe::M1, t(10, 0), Duration::minutes(2), 1);
        state.record_close(t(10, 0));

        assert_eq!(
            state.admit(SWING, Timeframe::M1, t(10, 1), Duration::minutes(2), 1),
            Admission::PostCloseCooldown
        );
        assert_eq!(state.admit(SWING, Timeframe::M1, t(10, 2), Duration::minutes(2), 1), Admission::Ready);
    }

    #[test]
    fn test_stale_bar_is_not_reprocessed() {
        let mut state = SymbolState::default();
        state.admit(SWING, Timeframe::M15, t(10, 15), Duration::zero(), 1);

        assert_eq!(state.admit(SWING, Timeframe::M15, t(10, 0), Duration::zero(), 1), Admission::SameBar);
        assert_eq!(state.last_bar(SWING, Timeframe::M15), Some(t(10, 15)));
    }

    #[test]
    fn test_record_close_keeps_latest() {
        let mut state = SymbolState::default();
        state.record_close(t(11, 0));
        state.record_close(t(10, 0));

        assert_eq!(state.last_close, Some(t(11, 0)));
    }
}
