use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Timeframe;
use crate::risk::{CircuitBreakers, InstrumentClass, PositionSizer};

/// Default settings file, optional
pub const DEFAULT_CONFIG_PATH: &str = "trendbot.toml";
/// Overrides written by `set-risk`, applied at the next startup
pub const PENDING_OVERRIDES_PATH: &str = "trendbot.overrides.json";
const ENV_PREFIX: &str = "TRADING_BOT";

/// Below this balance the risk settings are scaled down at startup
const SMALL_ACCOUNT_BALANCE: f64 = 100.0;

/// Engine limits for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Broker minimum stop distance, in points
    pub min_stop_points: f64,
    pub min_lot: f64,
    pub max_lot: f64,
}

impl SymbolSpec {
    fn new(symbol: &str, min_stop_points: f64, min_lot: f64, max_lot: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            min_stop_points,
            min_lot,
            max_lot,
        }
    }

    /// Known limits for `symbol`, or the defaults of its instrument class
    pub fn for_symbol(symbol: &str) -> Self {
        if let Some(spec) = default_symbol_specs().into_iter().find(|s| s.symbol == symbol) {
            return spec;
        }
        match InstrumentClass::of(symbol) {
            InstrumentClass::Forex => Self::new(symbol, 60.0, 0.09, 0.5),
            InstrumentClass::JpyCross => Self::new(symbol, 80.0, 0.09, 0.4),
            InstrumentClass::Metal => Self::new(symbol, 200.0, 0.01, 0.05),
            InstrumentClass::Crypto => Self::new(symbol, 500.0, 0.001, 0.01),
        }
    }
}

pub fn default_symbol_specs() -> Vec<SymbolSpec> {
    let mut specs: Vec<SymbolSpec> = ["EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "NZDUSD", "USDCAD"]
        .iter()
        .map(|s| SymbolSpec::new(s, 60.0, 0.09, 0.5))
        .collect();
    specs.push(SymbolSpec::new("EURJPY", 80.0, 0.09, 0.4));
    specs.push(SymbolSpec::new("GBPJPY", 80.0, 0.09, 0.4));
    specs.push(SymbolSpec::new("XAUUSD", 200.0, 0.01, 0.05));
    specs.push(SymbolSpec::new("BTCUSD", 500.0, 0.001, 0.01));
    specs
}

fn default_symbols() -> Vec<String> {
    default_symbol_specs().into_iter().map(|s| s.symbol).collect()
}

/// Engine settings, layered from defaults, an optional TOML file, pending
/// overrides and `TRADING_BOT_*` environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub symbols: Vec<String>,
    pub symbol_specs: Vec<SymbolSpec>,
    /// Bars fetched per timeframe each cycle
    pub bars: usize,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub magic: u64,

    // Risk
    pub risk_per_trade: f64,
    pub max_risk_usd: f64,
    pub max_open_risk_usd: f64,
    pub max_open_trades: usize,
    pub max_session_drawdown_usd: f64,
    pub daily_profit_target_usd: f64,

    // Entry cadence
    pub cooldown_bars: i64,
    pub swing_cooldown_after_close_mins: i64,
    pub cooldown_after_close_mins: i64,

    // Swing (M15)
    pub enable_m15_swing: bool,
    pub require_triangle_breakout: bool,
    pub max_spread_points: f64,
    pub min_sl_points: f64,
    pub sl_atr_mult: f64,
    pub tp_rr: f64,

    // Scalp (M1)
    pub enable_m1_scalp: bool,
    pub m1_max_spread_points: f64,
    pub m1_min_sl_points: f64,
    pub m1_min_atr_points: f64,
    pub m1_sl_atr_mult: f64,
    pub m1_tp_rr: f64,

    // Additional strategies
    pub enable_pullback: bool,
    pub enable_smart: bool,
    pub enable_streak: bool,
    pub use_h1_confirm: bool,

    // SuperTrend
    pub atr_period: usize,
    pub supertrend_multiplier: f64,
    pub confirm_timeframe: Timeframe,

    // Trailing stop
    pub enable_trailing_sl: bool,
    pub trail_activate_usd: f64,
    pub trail_distance_usd: f64,

    pub ledger_path: PathBuf,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            symbol_specs: default_symbol_specs(),
            bars: 500,
            poll_interval_secs: 30,
            error_backoff_secs: 10,
            magic: 777001,
            risk_per_trade: 0.02,
            max_risk_usd: 1.0,
            max_open_risk_usd: 6.0,
            max_open_trades: 15,
            max_session_drawdown_usd: 8.0,
            daily_profit_target_usd: 0.0,
            cooldown_bars: 1,
            swing_cooldown_after_close_mins: 15,
            cooldown_after_close_mins: 2,
            enable_m15_swing: true,
            require_triangle_breakout: true,
            max_spread_points: 30.0,
            min_sl_points: 50.0,
            sl_atr_mult: 2.0,
            tp_rr: 1.5,
            enable_m1_scalp: true,
            m1_max_spread_points: 20.0,
            m1_min_sl_points: 20.0,
            m1_min_atr_points: 3.0,
            m1_sl_atr_mult: 1.2,
            m1_tp_rr: 1.2,
            enable_pullback: false,
            enable_smart: false,
            enable_streak: false,
            use_h1_confirm: false,
            atr_period: 10,
            supertrend_multiplier: 2.0,
            confirm_timeframe: Timeframe::M15,
            enable_trailing_sl: true,
            trail_activate_usd: 5.0,
            trail_distance_usd: 8.0,
            ledger_path: PathBuf::from("logs/trades.json"),
            telegram_token: None,
            telegram_chat_id: None,
        }
    }
}

impl Settings {
    /// Load settings with environment overrides
    ///
    /// `path` defaults to `trendbot.toml`. A missing default file is fine,
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

        let settings = Config::builder()
            .add_source(File::from(path).required(explicit))
            .add_source(
                File::new(PENDING_OVERRIDES_PATH, FileFormat::Json).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }

    /// Limits for `symbol`, from the configured table or class defaults
    pub fn symbol_spec(&self, symbol: &str) -> SymbolSpec {
        self.symbol_specs
            .iter()
            .find(|s| s.symbol == symbol)
            .cloned()
            .unwrap_or_else(|| SymbolSpec::for_symbol(symbol))
    }

    pub fn circuit_breakers(&self) -> CircuitBreakers {
        CircuitBreakers {
            max_session_drawdown_usd: self.max_session_drawdown_usd,
            daily_profit_target_usd: self.daily_profit_target_usd,
            max_open_trades: self.max_open_trades,
            max_open_risk_usd: self.max_open_risk_usd,
        }
    }

    pub fn position_sizer(&self) -> PositionSizer {
        PositionSizer {
            small_account_threshold: SMALL_ACCOUNT_BALANCE,
            max_risk_usd: self.max_risk_usd,
        }
    }

    /// Scale risk down for accounts below $100
    ///
    /// Risk per trade shrinks in proportion to balance/500 (floor 0.1%), the
    /// per-trade cap drops to at most $0.50 and open risk to at most $1.50.
    pub fn scaled_for_balance(mut self, balance: f64) -> Self {
        if balance <= 0.0 || balance >= SMALL_ACCOUNT_BALANCE {
            return self;
        }

        self.risk_per_trade = (self.risk_per_trade * balance / 500.0).max(0.001);
        self.max_risk_usd = self.max_risk_usd.min(0.5);
        self.max_open_risk_usd = self.max_open_risk_usd.min(1.5);
        tracing::info!(
            "💰 Small account (${:.2}): risk {:.2}%, max ${:.2}/trade, ${:.2} open",
            balance,
            self.risk_per_trade * 100.0,
            self.max_risk_usd,
            self.max_open_risk_usd
        );
        self
    }

    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.symbols.len(), 11);
        assert_eq!(settings.magic, 777001);
        assert_eq!(settings.confirm_timeframe, Timeframe::M15);
        assert!(settings.telegram_credentials().is_none());
    }

    #[test]
    fn test_symbol_spec_lookup() {
        let settings = Settings::default();

        assert_eq!(settings.symbol_spec("XAUUSD").min_stop_points, 200.0);
        assert_eq!(settings.symbol_spec("GBPJPY").max_lot, 0.4);
        // unknown symbols fall back to their class
        let spec = settings.symbol_spec("ETHUSD");
        assert_eq!(spec.min_lot, 0.001);
        assert_eq!(spec.symbol, "ETHUSD");
    }

    #[test]
    fn test_small_account_scaling() {
        let settings = Settings::default().scaled_for_balance(50.0);

        assert!((settings.risk_per_trade - 0.002).abs() < 1e-12);
        assert_eq!(settings.max_risk_usd, 0.5);
        assert_eq!(settings.max_open_risk_usd, 1.5);
    }

    #[test]
    fn test_scaling_floor_and_large_accounts() {
        let tiny = Settings::default().scaled_for_balance(5.0);
        assert_eq!(tiny.risk_per_trade, 0.001);

        let large = Settings::default().scaled_for_balance(5_000.0);
        assert_eq!(large.risk_per_trade, 0.02);
        assert_eq!(large.max_risk_usd, 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        std::fs::write(
            &path,
            "symbols = [\"EURUSD\", \"XAUUSD\"]\nmax_risk_usd = 2.5\nconfirm_timeframe = \"H1\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.symbols, vec!["EURUSD", "XAUUSD"]);
        assert_eq!(settings.max_risk_usd, 2.5);
        assert_eq!(settings.confirm_timeframe, Timeframe::H1);
        // untouched fields keep their defaults
        assert_eq!(settings.tp_rr, 1.5);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/trendbot.toml"))).is_err());
    }
}
