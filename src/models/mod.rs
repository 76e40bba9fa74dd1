use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One timestamped price observation from the feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub confidence: Decimal,
    /// Reference-asset prices carried through for display only
    #[serde(default)]
    pub auxiliary: BTreeMap<String, Option<Decimal>>,
}

impl PriceTick {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal, confidence: Decimal) -> Self {
        Self {
            timestamp,
            price,
            confidence,
            auxiliary: BTreeMap::new(),
        }
    }

    /// Attach a reference price (e.g. "BTC") to this tick
    pub fn with_auxiliary(mut self, symbol: impl Into<String>, price: Option<Decimal>) -> Self {
        self.auxiliary.insert(symbol.into(), price);
        self
    }
}

/// Short-term price direction over a trend window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

/// Classification of a single window, for logging and display
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TrendWindow {
    pub window_secs: u64,
    pub classification: Trend,
}
