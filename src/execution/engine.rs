use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::execution::position_manager::{OpenPosition, Operation};
use crate::indicators::TrendAnalyzer;
use crate::models::{PriceTick, Trend};

/// Busy flag owned by one engine instance
#[derive(Debug, Clone, Default)]
struct DecisionGuard {
    busy: Arc<AtomicBool>,
}

impl DecisionGuard {
    fn try_acquire(&self) -> Option<BusyToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyToken {
                busy: self.busy.clone(),
            })
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held while a decision is in flight. Dropping it releases the engine.
#[derive(Debug)]
struct BusyToken {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A decision waiting out its confirmation delay
///
/// Keeps the engine busy until it is committed or dropped.
#[derive(Debug)]
pub struct PendingDecision {
    operation: Operation,
    ready_at: DateTime<Utc>,
    _token: BusyToken,
}

impl PendingDecision {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn ready_at(&self) -> DateTime<Utc> {
        self.ready_at
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.ready_at
    }

    /// Consume the decision for commit, releasing the engine
    pub fn into_operation(self) -> Operation {
        self.operation
    }
}

/// Why an evaluation produced no decision
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    Busy,
    NoPriceData,
    TrendNotConfirmed,
    ProfitBelowAmount { profit: Decimal },
    ProfitBelowPercent { profit_pct: Decimal },
    InvalidPrice,
    /// Confirmation delay pushes the commit time past the representable range
    DelayOutOfRange,
}

/// Single-position open/close decision engine
pub struct TradeDecisionEngine {
    config: EngineConfig,
    analyzer: TrendAnalyzer,
    guard: DecisionGuard,
}

impl TradeDecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let analyzer = TrendAnalyzer::new(config.trend.min_percent_change);
        Self {
            config,
            analyzer,
            guard: DecisionGuard::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True while a decision is pending commit
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Evaluate the latest tick of `history` against the current position
    ///
    /// Returns a pending decision, or the reason nothing was decided.
    pub fn evaluate(
        &self,
        history: &[PriceTick],
        position: Option<&OpenPosition>,
    ) -> Result<PendingDecision, Skip> {
        let Some(token) = self.guard.try_acquire() else {
            return Err(Skip::Busy);
        };

        // Any early return drops `token` and frees the engine
        let current = history.last().ok_or(Skip::NoPriceData)?;

        let operation = match position {
            Some(position) => self.evaluate_close(history, current, position)?,
            None => self.evaluate_open(history, current)?,
        };

        let ready_at = i64::try_from(self.config.confirmation_delay_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|delay| current.timestamp.checked_add_signed(delay))
            .ok_or(Skip::DelayOutOfRange)?;

        let windows = match operation {
            Operation::Open { .. } => &self.config.trend.open_windows_secs,
            Operation::Close { .. } => &self.config.trend.close_windows_secs,
        };
        tracing::info!(
            operation = operation.kind(),
            price = %current.price,
            ready_at = %ready_at,
            windows = ?self.analyzer.classify_windows(history, windows),
            "Decision pending confirmation"
        );

        Ok(PendingDecision {
            operation,
            ready_at,
            _token: token,
        })
    }

    fn evaluate_close(
        &self,
        history: &[PriceTick],
        current: &PriceTick,
        position: &OpenPosition,
    ) -> Result<Operation, Skip> {
        let windows = &self.config.trend.close_windows_secs;

        // No close windows: closing is manual only
        if windows.is_empty() || !self.analyzer.all_windows_read(history, windows, Trend::Up) {
            return Err(Skip::TrendNotConfirmed);
        }

        let profit = position.unrealized_profit(current.price);
        if profit < self.config.min_profit_amount_to_close {
            tracing::debug!(profit = %profit, "Close skipped: profit below minimum amount");
            return Err(Skip::ProfitBelowAmount { profit });
        }

        let profit_pct = profit
            .checked_div(position.avg_open_price)
            .map(|ratio| ratio * Decimal::ONE_HUNDRED)
            .ok_or(Skip::InvalidPrice)?;
        if profit_pct < self.config.min_profit_percent_to_close {
            tracing::debug!(profit_pct = %profit_pct, "Close skipped: profit below minimum percent");
            return Err(Skip::ProfitBelowPercent { profit_pct });
        }

        Ok(Operation::Close {
            close_tick: current.clone(),
            close_time: current.timestamp,
        })
    }

    fn evaluate_open(&self, history: &[PriceTick], current: &PriceTick) -> Result<Operation, Skip> {
        let windows = &self.config.trend.open_windows_secs;

        if !self.analyzer.all_windows_read(history, windows, Trend::Down) {
            return Err(Skip::TrendNotConfirmed);
        }

        let quantity = self
            .config
            .investment_amount
            .checked_div(current.price)
            .ok_or(Skip::InvalidPrice)?;
        if quantity <= Decimal::ZERO {
            return Err(Skip::InvalidPrice);
        }

        Ok(Operation::Open {
            open_tick: current.clone(),
            open_time: current.timestamp,
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrendConfig;
    use crate::execution::position_manager::PositionManager;
    use chrono::TimeZone;

    fn tick(secs: i64, price: Decimal) -> PriceTick {
        PriceTick::new(
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            price,
            Decimal::ZERO,
        )
    }

    fn series(points: &[(i64, i64)]) -> Vec<PriceTick> {
        points
            .iter()
            .map(|&(secs, price)| tick(secs, Decimal::from(price)))
            .collect()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            investment_amount: Decimal::from(200),
            min_profit_percent_to_close: Decimal::new(1, 1),
            min_profit_amount_to_close: Decimal::new(50, 2),
            confirmation_delay_secs: 5,
            max_history: 100,
            trend: TrendConfig {
                open_windows_secs: vec![30],
                close_windows_secs: vec![30],
                min_percent_change: Decimal::new(1, 2),
            },
        }
    }

    fn falling() -> Vec<PriceTick> {
        series(&[(0, 104), (10, 102), (20, 100)])
    }

    fn open_position(quantity: i64, avg: Decimal) -> OpenPosition {
        let mut pm = PositionManager::new();
        let open_tick = tick(0, avg);
        pm.apply(
            Operation::Open {
                open_time: open_tick.timestamp,
                open_tick,
                quantity: Decimal::from(quantity),
            },
            &tick(1, avg),
        )
        .unwrap();
        pm.position().cloned().unwrap()
    }

    #[test]
    fn test_open_on_confirmed_downtrend() {
        let engine = TradeDecisionEngine::new(config());
        let pending = engine.evaluate(&falling(), None).unwrap();

        assert!(engine.is_busy());
        assert_eq!(pending.ready_at(), tick(25, Decimal::ZERO).timestamp);
        match pending.operation() {
            Operation::Open { quantity, open_tick, .. } => {
                // 200 / 100
                assert_eq!(*quantity, Decimal::from(2));
                assert_eq!(open_tick.price, Decimal::from(100));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_open_without_downtrend() {
        let engine = TradeDecisionEngine::new(config());
        let rising = series(&[(0, 100), (10, 101), (20, 102)]);

        assert_eq!(engine.evaluate(&rising, None).unwrap_err(), Skip::TrendNotConfirmed);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_all_open_windows_must_agree() {
        let mut cfg = config();
        cfg.trend.open_windows_secs = vec![5, 30];
        let engine = TradeDecisionEngine::new(cfg);

        // 5s window has one tick -> Sideways
        assert_eq!(engine.evaluate(&falling(), None).unwrap_err(), Skip::TrendNotConfirmed);
    }

    #[test]
    fn test_delay_past_time_range_is_skipped() {
        let mut cfg = config();
        cfg.confirmation_delay_secs = 10_000_000_000_000_000;
        let engine = TradeDecisionEngine::new(cfg);

        assert_eq!(engine.evaluate(&falling(), None).unwrap_err(), Skip::DelayOutOfRange);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_empty_history_is_skipped() {
        let engine = TradeDecisionEngine::new(config());
        assert_eq!(engine.evaluate(&[], None).unwrap_err(), Skip::NoPriceData);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_busy_engine_skips() {
        let engine = TradeDecisionEngine::new(config());
        let pending = engine.evaluate(&falling(), None).unwrap();

        for _ in 0..3 {
            assert_eq!(engine.evaluate(&falling(), None).unwrap_err(), Skip::Busy);
        }

        drop(pending);
        assert!(!engine.is_busy());
        assert!(engine.evaluate(&falling(), None).is_ok());
    }

    #[test]
    fn test_into_operation_releases_guard() {
        let engine = TradeDecisionEngine::new(config());
        let pending = engine.evaluate(&falling(), None).unwrap();

        let _operation = pending.into_operation();
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_close_on_uptrend_with_profit() {
        let engine = TradeDecisionEngine::new(config());
        let position = open_position(2, Decimal::from(100));
        let rising = series(&[(0, 100), (10, 101), (20, 102)]);

        let pending = engine.evaluate(&rising, Some(&position)).unwrap();
        assert!(matches!(pending.operation(), Operation::Close { .. }));
    }

    #[test]
    fn test_close_rejected_below_profit_amount() {
        let engine = TradeDecisionEngine::new(config());
        // Profit = (100.15 - 100) * 2 = 0.30 < 0.50
        let position = open_position(2, Decimal::from(100));
        let rising = vec![
            tick(0, Decimal::from(100)),
            tick(20, Decimal::new(10015, 2)),
        ];

        let skip = engine.evaluate(&rising, Some(&position)).unwrap_err();
        assert_eq!(
            skip,
            Skip::ProfitBelowAmount {
                profit: Decimal::new(30, 2)
            }
        );
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_close_rejected_below_profit_percent() {
        let mut cfg = config();
        cfg.min_profit_amount_to_close = Decimal::ZERO;
        cfg.min_profit_percent_to_close = Decimal::from(5);
        let engine = TradeDecisionEngine::new(cfg);

        // Profit = 2 * 2 = 4, 4 / 100 * 100 = 4% < 5%
        let position = open_position(2, Decimal::from(100));
        let rising = series(&[(0, 100), (20, 102)]);

        assert!(matches!(
            engine.evaluate(&rising, Some(&position)).unwrap_err(),
            Skip::ProfitBelowPercent { .. }
        ));
    }

    #[test]
    fn test_close_requires_uptrend() {
        let engine = TradeDecisionEngine::new(config());
        let position = open_position(2, Decimal::from(90));

        // Profitable but falling
        assert_eq!(
            engine.evaluate(&falling(), Some(&position)).unwrap_err(),
            Skip::TrendNotConfirmed
        );
    }

    #[test]
    fn test_empty_close_windows_never_close() {
        let mut cfg = config();
        cfg.trend.close_windows_secs = vec![];
        let engine = TradeDecisionEngine::new(cfg);
        let position = open_position(2, Decimal::from(50));
        let rising = series(&[(0, 100), (10, 101), (20, 102)]);

        assert_eq!(
            engine.evaluate(&rising, Some(&position)).unwrap_err(),
            Skip::TrendNotConfirmed
        );
    }

    #[test]
    fn test_independent_engines_do_not_share_guard() {
        let first = TradeDecisionEngine::new(config());
        let second = TradeDecisionEngine::new(config());

        let _pending = first.evaluate(&falling(), None).unwrap();
        assert!(first.is_busy());
        assert!(!second.is_busy());
        assert!(second.evaluate(&falling(), None).is_ok());
    }
}
