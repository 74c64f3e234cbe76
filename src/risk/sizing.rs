use crate::config::SymbolSpec;
use crate::models::SymbolInfo;

const DEFAULT_VOLUME_STEP: f64 = 0.01;

/// Broad instrument families with their own volume tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentClass {
    Forex,
    JpyCross,
    Metal,
    Crypto,
}

impl InstrumentClass {
    pub fn of(symbol: &str) -> Self {
        let symbol = symbol.to_ascii_uppercase();
        if symbol.starts_with("XAU") || symbol.starts_with("XAG") {
            InstrumentClass::Metal
        } else if ["BTC", "ETH", "LTC", "XRP"].iter().any(|c| symbol.contains(c)) {
            InstrumentClass::Crypto
        } else if symbol.contains("JPY") {
            InstrumentClass::JpyCross
        } else {
            InstrumentClass::Forex
        }
    }

    /// Fixed volume for accounts below the small-account threshold
    pub fn small_account_volume(self) -> f64 {
        match self {
            InstrumentClass::Forex => 0.09,
            InstrumentClass::JpyCross | InstrumentClass::Metal | InstrumentClass::Crypto => 0.01,
        }
    }
}

/// Volume range after combining engine limits with broker limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl VolumeBounds {
    pub fn new(spec: &SymbolSpec, info: Option<&SymbolInfo>) -> Self {
        let Some(info) = info else {
            return Self {
                min: spec.min_lot,
                max: spec.max_lot.max(spec.min_lot),
                step: DEFAULT_VOLUME_STEP.min(spec.min_lot),
            };
        };

        let step = if info.volume_step > 0.0 {
            info.volume_step
        } else {
            DEFAULT_VOLUME_STEP
        };
        let min = spec.min_lot.max(info.volume_min);
        let max = spec.max_lot.min(info.volume_max);
        if min > max {
            return Self {
                min: info.volume_min,
                max: info.volume_min,
                step,
            };
        }
        Self { min, max, step }
    }

    /// Round to the nearest step and clamp into [min, max]
    pub fn fit(&self, volume: f64) -> f64 {
        let lo = (self.min / self.step - 1e-9).ceil();
        let hi = (self.max / self.step + 1e-9).floor();
        if hi < lo {
            return self.min;
        }
        let steps = if volume.is_finite() {
            (volume / self.step).round().clamp(lo, hi)
        } else {
            lo
        };
        round_volume(steps * self.step)
    }
}

/// Strip float noise such as 0.09000000000000001
fn round_volume(volume: f64) -> f64 {
    (volume * 1e8).round() / 1e8
}

/// Per-trade risk fraction after applying the dollar cap
///
/// Returns `min(risk_fraction, cap_usd / balance)`, or 0 for a non-positive balance.
pub fn effective_risk_fraction(risk_fraction: f64, cap_usd: f64, balance: f64) -> f64 {
    if balance <= 0.0 {
        return 0.0;
    }
    risk_fraction.min(cap_usd / balance).max(0.0)
}

/// Money lost per lot when price moves `distance` against the position
pub fn loss_per_lot(info: &SymbolInfo, distance: f64) -> Option<f64> {
    if info.tick_size <= 0.0 || info.tick_value <= 0.0 || distance <= 0.0 {
        return None;
    }
    Some(distance / info.tick_size * info.tick_value)
}

/// Money at risk for `volume` lots with the stop `distance` away
pub fn risk_usd(info: &SymbolInfo, distance: f64, volume: f64) -> f64 {
    loss_per_lot(info, distance).map_or(0.0, |per_lot| per_lot * volume)
}

/// Converts a risk budget and stop distance into an order volume
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    /// Balances below this get the fixed class tier
    pub small_account_threshold: f64,
    /// Per-trade dollar cap
    pub max_risk_usd: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            small_account_threshold: 100.0,
            max_risk_usd: 1.0,
        }
    }
}

impl PositionSizer {
    pub fn new(max_risk_usd: f64) -> Self {
        Self {
            max_risk_usd,
            ..Self::default()
        }
    }

    pub fn is_small_account(&self, balance: f64) -> bool {
        balance > 0.0 && balance < self.small_account_threshold
    }

    /// Volume for a trade risking `risk_fraction` of `balance` over `stop_distance`
    ///
    /// Always returns a volume inside the effective bounds, on the volume step.
    /// Missing metadata or degenerate inputs fall back to the minimum volume.
    ///
    /// # Arguments
    /// * `spec` - Engine limits for the symbol
    /// * `info` - Broker metadata, if available
    /// * `risk_fraction` - Fraction of balance to risk (e.g. 0.02)
    /// * `stop_distance` - Absolute price distance from entry to stop
    /// * `balance` - Account balance
    pub fn size(
        &self,
        spec: &SymbolSpec,
        info: Option<&SymbolInfo>,
        risk_fraction: f64,
        stop_distance: f64,
        balance: f64,
    ) -> f64 {
        self.size_order(spec, info, risk_fraction, stop_distance, balance).volume
    }

    /// Like [`PositionSizer::size`], also reporting whether the risk budget
    /// bought less than the minimum volume
    pub fn size_order(
        &self,
        spec: &SymbolSpec,
        info: Option<&SymbolInfo>,
        risk_fraction: f64,
        stop_distance: f64,
        balance: f64,
    ) -> SizedVolume {
        let bounds = VolumeBounds::new(spec, info);

        if self.is_small_account(balance) {
            return SizedVolume {
                volume: bounds.fit(InstrumentClass::of(&spec.symbol).small_account_volume()),
                raised_to_min: false,
            };
        }

        let at_min = SizedVolume {
            volume: bounds.fit(bounds.min),
            raised_to_min: true,
        };
        let Some(info) = info else {
            tracing::warn!("{}: no symbol info, using minimum volume", spec.symbol);
            return at_min;
        };
        if balance <= 0.0 || stop_distance <= 0.0 {
            return at_min;
        }
        let Some(per_lot) = loss_per_lot(info, stop_distance) else {
            return at_min;
        };

        let budget = effective_risk_fraction(risk_fraction, self.max_risk_usd, balance) * balance;
        let calculated = budget / per_lot;
        SizedVolume {
            volume: bounds.fit(calculated),
            raised_to_min: calculated < bounds.min - 1e-9,
        }
    }
}

/// A sized order volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedVolume {
    pub volume: f64,
    /// The risk budget alone bought less than the minimum volume
    pub raised_to_min: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd_info() -> SymbolInfo {
        SymbolInfo {
            symbol: "EURUSD".to_string(),
            point: 0.00001,
            tick_size: 0.00001,
            tick_value: 1.0,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            stops_level: 10,
        }
    }

    #[test]
    fn test_instrument_classes() {
        assert_eq!(InstrumentClass::of("EURUSD"), InstrumentClass::Forex);
        assert_eq!(InstrumentClass::of("GBPJPY"), InstrumentClass::JpyCross);
        assert_eq!(InstrumentClass::of("XAUUSD"), InstrumentClass::Metal);
        assert_eq!(InstrumentClass::of("BTCUSD"), InstrumentClass::Crypto);
    }

    #[test]
    fn test_small_account_uses_fixed_tier() {
        let sizer = PositionSizer::default();
        let spec = SymbolSpec::for_symbol("EURUSD");
        let info = eurusd_info();

        for stop in [0.0005, 0.002, 0.05] {
            assert_eq!(sizer.size(&spec, Some(&info), 0.02, stop, 50.0), 0.09);
        }
    }

    #[test]
    fn test_risk_contract_for_larger_accounts() {
        // $10 cap / (0.0010 / 0.00001 * $1) = 0.1 lots
        let sizer = PositionSizer::new(10.0);
        let spec = SymbolSpec::for_symbol("EURUSD");
        let volume = sizer.size(&spec, Some(&eurusd_info()), 0.02, 0.0010, 10_000.0);

        assert!((volume - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_rounding_up_inside_bounds_is_not_raised_to_min() {
        // $10 / $85 per lot = 0.1176, rounded to 0.12
        let sizer = PositionSizer::new(10.0);
        let spec = SymbolSpec::for_symbol("EURUSD");
        let sized = sizer.size_order(&spec, Some(&eurusd_info()), 0.02, 0.00085, 10_000.0);

        assert_eq!(sized.volume, 0.12);
        assert!(!sized.raised_to_min);
    }

    #[test]
    fn test_budget_below_min_lot_is_raised() {
        let sizer = PositionSizer::new(1.0);
        let spec = SymbolSpec::for_symbol("EURUSD");
        let sized = sizer.size_order(&spec, Some(&eurusd_info()), 0.02, 0.0010, 1_000.0);

        assert_eq!(sized.volume, 0.09);
        assert!(sized.raised_to_min);

        let small = sizer.size_order(&spec, Some(&eurusd_info()), 0.02, 0.0010, 50.0);
        assert!(!small.raised_to_min);
    }

    #[test]
    fn test_volume_clamped_to_class_max() {
        let sizer = PositionSizer::new(1_000.0);
        let spec = SymbolSpec::for_symbol("EURUSD");
        let volume = sizer.size(&spec, Some(&eurusd_info()), 0.05, 0.0001, 100_000.0);

        assert_eq!(volume, 0.5);
    }

    #[test]
    fn test_missing_info_gives_minimum() {
        let sizer = PositionSizer::default();
        let spec = SymbolSpec::for_symbol("XAUUSD");

        assert_eq!(sizer.size(&spec, None, 0.02, 1.0, 5_000.0), 0.01);
    }

    #[test]
    fn test_zero_stop_gives_minimum() {
        let sizer = PositionSizer::default();
        let spec = SymbolSpec::for_symbol("EURUSD");

        assert_eq!(sizer.size(&spec, Some(&eurusd_info()), 0.02, 0.0, 5_000.0), 0.09);
    }

    #[test]
    fn test_effective_risk_fraction() {
        assert!((effective_risk_fraction(0.02, 1.0, 1_000.0) - 0.001).abs() < 1e-12);
        assert_eq!(effective_risk_fraction(0.02, 100.0, 1_000.0), 0.02);
        assert_eq!(effective_risk_fraction(0.02, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_bounds_fit_rounds_to_step() {
        let bounds = VolumeBounds { min: 0.09, max: 0.5, step: 0.01 };
        assert_eq!(bounds.fit(0.1234), 0.12);
        assert_eq!(bounds.fit(0.0), 0.09);
        assert_eq!(bounds.fit(f64::NAN), 0.09);
    }

    #[test]
    fn test_risk_usd() {
        let info = eurusd_info();
        assert!((risk_usd(&info, 0.0010, 0.1) - 10.0).abs() < 1e-9);
        assert_eq!(risk_usd(&info, 0.0, 0.1), 0.0);
    }
}
