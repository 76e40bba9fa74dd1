use crate::models::PriceTick;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Market scenario types for synthetic tick generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MarketScenario {
    /// Steady climb with noise
    Uptrend,
    /// Steady decline with noise
    Downtrend,
    /// Mean-reverting around the base price
    Sideways,
    /// Large swings in both directions
    Volatile,
}

/// Seeded random-walk price feed
pub struct SyntheticFeed {
    rng: StdRng,
    scenario: MarketScenario,
    base_price: f64,
    current_price: f64,
    next_time: DateTime<Utc>,
    interval: Duration,
}

impl SyntheticFeed {
    /// Create a feed with a seed for reproducibility
    pub fn new(seed: u64, scenario: MarketScenario, start: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            scenario,
            base_price: 150.0,
            current_price: 150.0,
            next_time: start,
            interval,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self.current_price = price;
        self
    }

    fn step(&mut self) -> f64 {
        let price = self.current_price;
        let change = match self.scenario {
            // ±0.05% noise on a 0.02% drift per tick
            MarketScenario::Uptrend => price * (0.0002 + self.rng.gen_range(-0.0005..0.0005)),
            MarketScenario::Downtrend => price * (-0.0002 + self.rng.gen_range(-0.0005..0.0005)),
            MarketScenario::Sideways => {
                // Pull back towards base
                let reversion = (self.base_price - price) * 0.05;
                reversion + price * self.rng.gen_range(-0.001..0.001)
            }
            MarketScenario::Volatile => price * self.rng.gen_range(-0.01..0.01),
        };

        // Never go below 1% of base
        self.current_price = (price + change).max(self.base_price * 0.01);
        self.current_price
    }

    /// Produce the next tick
    pub fn next_tick(&mut self) -> PriceTick {
        let price = self.step();
        let timestamp = self.next_time;
        self.next_time = self.next_time + self.interval;

        let price = Decimal::from_f64_retain(price)
            .unwrap_or(Decimal::ONE)
            .round_dp(4);
        // Confidence band of 0.05% of price
        let confidence = (price * Decimal::new(5, 4)).round_dp(6);

        PriceTick::new(timestamp, price, confidence)
    }

    /// Generate `count` ticks
    pub fn generate(&mut self, count: usize) -> Vec<PriceTick> {
        (0..count).map(|_| self.next_tick()).collect()
    }
}

impl Iterator for SyntheticFeed {
    type Item = PriceTick;

    fn next(&mut self) -> Option<PriceTick> {
        Some(self.next_tick())
    }
}
