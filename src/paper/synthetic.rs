use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Bar;

/// Price regimes the generator cycles through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    Uptrend,
    Downtrend,
    Sideways,
}

/// Seeded one-minute bar generator for the paper broker
///
/// Alternates trending and sideways regimes so the SuperTrend flips every
/// few hours of simulated time.
pub struct SyntheticMarket {
    rng: StdRng,
    price: f64,
    mean_price: f64,
    /// Per-bar noise as a fraction of price
    noise_pct: f64,
    scenario: MarketScenario,
    bars_left_in_regime: u32,
}

impl SyntheticMarket {
    /// Create a generator around `base_price`, reproducible for a given seed
    pub fn new(seed: u64, base_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: base_price,
            mean_price: base_price,
            noise_pct: 0.0004,
            scenario: MarketScenario::Sideways,
            bars_left_in_regime: 0,
        }
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn scenario(&self) -> MarketScenario {
        self.scenario
    }

    /// `count` consecutive M1 bars ending at the minute containing `end`
    pub fn history(&mut self, end: DateTime<Utc>, count: usize) -> Vec<Bar> {
        let last = floor_minute(end);
        let start = last - Duration::minutes(count.saturating_sub(1) as i64);
        (0..count)
            .map(|i| self.next_bar(start + Duration::minutes(i as i64)))
            .collect()
    }

    /// Advance the walk by one minute
    pub fn next_bar(&mut self, timestamp: DateTime<Utc>) -> Bar {
        if self.bars_left_in_regime == 0 {
            self.switch_regime();
        }
        self.bars_left_in_regime -= 1;

        let noise = self.price * self.rng.gen_range(-self.noise_pct..self.noise_pct);
        let step = match self.scenario {
            MarketScenario::Uptrend => self.price * self.noise_pct * 0.35,
            MarketScenario::Downtrend => -self.price * self.noise_pct * 0.35,
            // 5% pull back to the mean
            MarketScenario::Sideways => (self.mean_price - self.price) * 0.05,
        };
        self.price = (self.price + step + noise).max(self.mean_price * 0.01);

        self.create_bar(self.price, timestamp)
    }

    fn switch_regime(&mut self) {
        self.scenario = match self.rng.gen_range(0..3) {
            0 => MarketScenario::Uptrend,
            1 => MarketScenario::Downtrend,
            _ => MarketScenario::Sideways,
        };
        self.bars_left_in_regime = self.rng.gen_range(60..240);
        tracing::debug!("Synthetic regime: {:?} for {} bars", self.scenario, self.bars_left_in_regime);
    }

    fn create_bar(&mut self, close: f64, timestamp: DateTime<Utc>) -> Bar {
        let wick = self.noise_pct * 0.5;

        let high = close * (1.0 + self.rng.gen_range(0.0..wick));
        let low = close * (1.0 - self.rng.gen_range(0.0..wick));
        let open = (close * (1.0 + self.rng.gen_range(-wick..wick))).clamp(low, high);

        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: self.rng.gen_range(50.0..150.0),
        }
    }
}

pub(crate) fn floor_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::minutes(1)).unwrap_or(time)
}
