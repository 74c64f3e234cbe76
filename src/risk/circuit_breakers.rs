use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-wide limits that suspend new entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakers {
    /// Equity loss from session start that halts entries for the rest of the process
    pub max_session_drawdown_usd: f64,
    /// Realized daily profit that halts entries until the next day, 0 disables
    pub daily_profit_target_usd: f64,
    pub max_open_trades: usize,
    /// Aggregate dollar risk of open engine positions
    pub max_open_risk_usd: f64,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            max_session_drawdown_usd: 8.0,
            daily_profit_target_usd: 0.0,
            max_open_trades: 15,
            max_open_risk_usd: 6.0,
        }
    }
}

/// Session accounting: equity baseline, daily realized P&L and halt flags
#[derive(Debug, Clone, Serialize)]
pub struct TradingState {
    pub baseline_equity: f64,
    pub equity: f64,
    pub daily_pnl: f64,
    pub accounting_day: Option<NaiveDate>,
    /// Sticky for the lifetime of the process
    pub drawdown_halted: bool,
    /// Cleared on day rollover
    pub daily_target_halted: bool,
}

impl TradingState {
    pub fn new(baseline_equity: f64) -> Self {
        Self {
            baseline_equity,
            equity: baseline_equity,
            daily_pnl: 0.0,
            accounting_day: None,
            drawdown_halted: false,
            daily_target_halted: false,
        }
    }

    pub fn session_drawdown(&self) -> f64 {
        self.baseline_equity - self.equity
    }

    /// Record current equity, returning the trip if this update set the drawdown halt
    pub fn update_equity(
        &mut self,
        equity: f64,
        breakers: &CircuitBreakers,
    ) -> Option<CircuitBreakerTrip> {
        self.equity = equity;
        if self.drawdown_halted || breakers.max_session_drawdown_usd <= 0.0 {
            return None;
        }
        let drawdown = self.session_drawdown();
        if drawdown >= breakers.max_session_drawdown_usd {
            self.drawdown_halted = true;
            return Some(CircuitBreakerTrip::SessionDrawdown { drawdown });
        }
        None
    }

    /// Add a closed deal to the daily accumulator
    ///
    /// A deal from a different calendar day (UTC) than the current accounting
    /// day resets the accumulator and clears the daily halt first. Returns the
    /// trip if this deal set the daily halt.
    pub fn record_closed_deal(
        &mut self,
        profit: f64,
        time: DateTime<Utc>,
        breakers: &CircuitBreakers,
    ) -> Option<CircuitBreakerTrip> {
        let day = time.date_naive();
        if self.accounting_day != Some(day) {
            if self.daily_target_halted {
                tracing::info!("📅 New trading day {}: daily profit halt cleared", day);
            }
            self.accounting_day = Some(day);
            self.daily_pnl = 0.0;
            self.daily_target_halted = false;
        }

        self.daily_pnl += profit;

        let target = breakers.daily_profit_target_usd;
        if target > 0.0 && !self.daily_target_halted && self.daily_pnl >= target {
            self.daily_target_halted = true;
            return Some(CircuitBreakerTrip::DailyProfitTarget {
                pnl: self.daily_pnl,
            });
        }
        None
    }

    /// Active halt, drawdown first
    pub fn halt(&self) -> Option<CircuitBreakerTrip> {
        if self.drawdown_halted {
            return Some(CircuitBreakerTrip::SessionDrawdown {
                drawdown: self.session_drawdown(),
            });
        }
        if self.daily_target_halted {
            return Some(CircuitBreakerTrip::DailyProfitTarget {
                pnl: self.daily_pnl,
            });
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerTrip {
    SessionDrawdown { drawdown: f64 },
    DailyProfitTarget { pnl: f64 },
    MaxOpenTrades { open: usize },
    MaxOpenRisk { risk: f64 },
}

impl fmt::Display for CircuitBreakerTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerTrip::SessionDrawdown { drawdown } => {
                write!(f, "session drawdown ${:.2}", drawdown)
            }
            CircuitBreakerTrip::DailyProfitTarget { pnl } => {
                write!(f, "daily profit target reached (${:.2})", pnl)
            }
            CircuitBreakerTrip::MaxOpenTrades { open } => write!(f, "{} open trades", open),
            CircuitBreakerTrip::MaxOpenRisk { risk } => write!(f, "open risk ${:.2}", risk),
        }
    }
}

impl CircuitBreakers {
    /// Exposure limits for a new entry, checked trade count first
    pub fn check_exposure(&self, open_trades: usize, open_risk: f64) -> Result<(), CircuitBreakerTrip> {
        if open_trades >= self.max_open_trades {
            return Err(CircuitBreakerTrip::MaxOpenTrades { open: open_trades });
        }
        if open_risk >= self.max_open_risk_usd {
            return Err(CircuitBreakerTrip::MaxOpenRisk { risk: open_risk });
        }
        Ok(())
    }

    pub fn check(&self, state: &TradingState) -> Result<(), CircuitBreakerTrip> {
        match state.halt() {
            Some(trip) => Err(trip),
            None => Ok(()),
        }
    }
}
