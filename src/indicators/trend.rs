use chrono::Duration;
use rust_decimal::Decimal;

use crate::models::{PriceTick, Trend, TrendWindow};

/// Percent change between the first and last tick of a slice
///
/// Returns None if the first price is zero
pub fn percent_change(first: Decimal, last: Decimal) -> Option<Decimal> {
    (last - first)
        .checked_div(first)
        .map(|ratio| ratio * Decimal::ONE_HUNDRED)
}

/// Classify the price direction over the trailing `window_secs` of `history`
///
/// The window ends at the newest tick and is inclusive of `newest - window_secs`.
/// Uses a two-point delta between the first and last tick inside the window.
/// Fewer than two ticks in the window is `Sideways`.
pub fn classify(history: &[PriceTick], min_percent_change: Decimal, window_secs: u64) -> Trend {
    if history.is_empty() {
        return Trend::Sideways;
    }

    // Work on a sorted copy, the caller's order is left alone
    let mut sorted: Vec<&PriceTick> = history.iter().collect();
    sorted.sort_by_key(|tick| tick.timestamp);

    let current_time = sorted[sorted.len() - 1].timestamp;
    // A window reaching past chrono's range has no usable start
    let Some(cutoff) = i64::try_from(window_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| current_time.checked_sub_signed(window))
    else {
        return Trend::Sideways;
    };

    let window: Vec<&PriceTick> = sorted
        .into_iter()
        .filter(|tick| tick.timestamp >= cutoff)
        .collect();

    if window.len() < 2 {
        return Trend::Sideways;
    }

    let first = window[0].price;
    let last = window[window.len() - 1].price;

    let Some(change) = percent_change(first, last) else {
        return Trend::Sideways;
    };

    if change.abs() < min_percent_change {
        Trend::Sideways
    } else if change > Decimal::ZERO {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// Classifies a history across several window lengths with one threshold
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    min_percent_change: Decimal,
}

impl TrendAnalyzer {
    pub fn new(min_percent_change: Decimal) -> Self {
        Self { min_percent_change }
    }

    pub fn classify(&self, history: &[PriceTick], window_secs: u64) -> Trend {
        classify(history, self.min_percent_change, window_secs)
    }

    /// Classify every window, in the order given
    pub fn classify_windows(&self, history: &[PriceTick], windows: &[u64]) -> Vec<TrendWindow> {
        windows
            .iter()
            .map(|&window_secs| TrendWindow {
                window_secs,
                classification: self.classify(history, window_secs),
            })
            .collect()
    }

    /// True if every window reads `expected`. An empty window set is vacuously true.
    pub fn all_windows_read(&self, history: &[PriceTick], windows: &[u64], expected: Trend) -> bool {
        windows
            .iter()
            .all(|&window_secs| self.classify(history, window_secs) == expected)
    }
}
