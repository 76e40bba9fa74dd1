use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TraderError};
use crate::execution::engine::{PendingDecision, Skip, TradeDecisionEngine};
use crate::execution::ledger::{ClosedTradeRecord, TradeLedger};
use crate::execution::position_manager::{Committed, OpenPosition, PositionManager};
use crate::execution::price_buffer::PriceHistoryBuffer;
use crate::models::PriceTick;

/// What a single tick caused
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Operation committed on this tick, if a pending decision came due
    pub committed: Option<Committed>,
    /// Why no new decision was started, if none was
    pub skipped: Option<Skip>,
    /// True if a decision is waiting for confirmation after this tick
    pub pending: bool,
}

/// Everything the persistence and display collaborators need
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub taken_at: DateTime<Utc>,
    pub position: Option<OpenPosition>,
    pub history: Vec<PriceTick>,
    pub ledger: TradeLedger,
    pub total_profit: Decimal,
}

/// One engine instance wired to its price history, position and ledger
pub struct TradingSession {
    buffer: PriceHistoryBuffer,
    engine: TradeDecisionEngine,
    positions: PositionManager,
    pending: Option<PendingDecision>,
}

impl TradingSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            buffer: PriceHistoryBuffer::new(config.max_history),
            engine: TradeDecisionEngine::new(config),
            positions: PositionManager::new(),
            pending: None,
        }
    }

    /// Rebuild a session from a saved snapshot. Nothing is pending afterwards.
    pub fn restore(config: EngineConfig, snapshot: SessionSnapshot) -> Self {
        let buffer = PriceHistoryBuffer::new(config.max_history);
        for tick in snapshot.history {
            buffer.append(tick);
        }

        Self {
            buffer,
            engine: TradeDecisionEngine::new(config),
            positions: PositionManager::with_state(snapshot.position, snapshot.ledger),
            pending: None,
        }
    }

    /// Feed one price observation through the session
    pub fn on_tick(&mut self, tick: PriceTick) -> TickOutcome {
        let now = tick.timestamp;
        let price = tick.price;

        self.buffer.append(tick);
        self.positions.mark_price(price);

        let committed = match self.commit_due(now) {
            Ok(committed) => committed,
            Err(e) => {
                tracing::error!(error = %e, "Pending decision rejected at commit");
                None
            }
        };

        let history = self.buffer.snapshot();
        let skipped = match self.engine.evaluate(&history, self.positions.position()) {
            Ok(pending) => {
                self.pending = Some(pending);
                None
            }
            Err(skip) => {
                if skip != Skip::Busy {
                    tracing::debug!(?skip, price = %price, "No decision");
                }
                Some(skip)
            }
        };

        TickOutcome {
            committed,
            skipped,
            pending: self.pending.is_some(),
        }
    }

    /// Commit the pending decision if its delay has elapsed
    ///
    /// The commit waits for a tick newer than the decision tick so the
    /// average price always spans two ticks.
    pub fn commit_due(&mut self, now: DateTime<Utc>) -> Result<Option<Committed>> {
        let Some(pending) = self.pending.as_ref() else {
            return Ok(None);
        };
        if !pending.is_due(now) {
            return Ok(None);
        }
        let Some(latest) = self.buffer.latest() else {
            return Ok(None);
        };
        if latest.timestamp <= pending.operation().decision_tick().timestamp {
            return Ok(None);
        }

        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let operation = pending.into_operation();

        self.positions.apply(operation, &latest).map(Some)
    }

    /// Close the open position now at the latest price, bypassing trend and
    /// profit checks. Any pending decision is dropped.
    pub fn on_force_close(&mut self) -> Result<ClosedTradeRecord> {
        let latest = self.buffer.latest().ok_or(TraderError::NoPriceData)?;
        if !self.positions.has_open_position() {
            return Err(TraderError::NotPositioned);
        }

        if let Some(pending) = self.pending.take() {
            tracing::warn!(
                operation = pending.operation().kind(),
                "Dropping pending decision for forced close"
            );
        }

        tracing::warn!(price = %latest.price, "Forced close requested");

        let close_time = latest.timestamp;
        self.positions.close(latest.clone(), close_time, &latest)
    }

    /// Empty the ledger. An open position is force-closed first and any
    /// pending decision is dropped. Returns the number of records removed.
    pub fn on_force_clear(&mut self) -> Result<usize> {
        if self.positions.has_open_position() {
            self.on_force_close()?;
        }
        self.pending = None;

        let removed = self.positions.clear_ledger();
        tracing::warn!(removed, "Ledger cleared");

        Ok(removed)
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        self.positions.position()
    }

    pub fn history(&self) -> Vec<PriceTick> {
        self.buffer.snapshot()
    }

    pub fn latest(&self) -> Option<PriceTick> {
        self.buffer.latest()
    }

    pub fn ledger(&self) -> &TradeLedger {
        self.positions.ledger()
    }

    pub fn pending(&self) -> Option<&PendingDecision> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let ledger = self.positions.ledger().clone();
        SessionSnapshot {
            taken_at: Utc::now(),
            position: self.positions.position().cloned(),
            history: self.buffer.snapshot(),
            total_profit: ledger.total_profit(),
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrendConfig;
    use chrono::TimeZone;

    fn tick(secs: i64, price: Decimal) -> PriceTick {
        PriceTick::new(
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            price,
            Decimal::ZERO,
        )
    }

    fn at(secs: i64, price: i64) -> PriceTick {
        tick(secs, Decimal::from(price))
    }

    fn config(delay: u64) -> EngineConfig {
        EngineConfig {
            investment_amount: Decimal::from(200),
            min_profit_percent_to_close: Decimal::new(1, 1),
            min_profit_amount_to_close: Decimal::new(50, 2),
            confirmation_delay_secs: delay,
            max_history: 100,
            trend: TrendConfig {
                open_windows_secs: vec![30],
                close_windows_secs: vec![30],
                min_percent_change: Decimal::new(1, 2),
            },
        }
    }

    /// Flat then a drop: the open decision is made on the t=20 tick at 100
    fn session_with_pending_open(delay: u64) -> TradingSession {
        let mut session = TradingSession::new(config(delay));
        session.on_tick(at(0, 104));
        session.on_tick(at(10, 104));
        let outcome = session.on_tick(at(20, 100));
        assert!(outcome.pending);
        session
    }

    #[test]
    fn test_single_tick_makes_no_decision() {
        let mut session = TradingSession::new(config(5));
        let outcome = session.on_tick(at(0, 100));

        assert_eq!(outcome.committed, None);
        assert_eq!(outcome.skipped, Some(Skip::TrendNotConfirmed));
        assert!(!outcome.pending);
    }

    #[test]
    fn test_open_commits_after_delay_with_average() {
        let mut session = session_with_pending_open(5);

        // Before the delay elapses the engine is busy
        let outcome = session.on_tick(at(22, 99));
        assert_eq!(outcome.committed, None);
        assert_eq!(outcome.skipped, Some(Skip::Busy));
        assert!(session.position().is_none());

        let outcome = session.on_tick(at(26, 101));
        assert_eq!(
            outcome.committed,
            Some(Committed::Opened {
                avg_open_price: Decimal::new(1005, 1)
            })
        );

        let position = session.position().unwrap();
        assert_eq!(position.quantity, Decimal::from(2));
        assert_eq!(position.best_price, Decimal::from(100));
    }

    #[test]
    fn test_busy_ticks_do_not_touch_state() {
        let mut session = session_with_pending_open(60);

        for secs in 21..30 {
            let outcome = session.on_tick(at(secs, 95));
            assert_eq!(outcome.skipped, Some(Skip::Busy));
            assert!(outcome.committed.is_none());
            assert!(session.position().is_none());
            assert!(session.ledger().is_empty());
        }
    }

    #[test]
    fn test_zero_delay_waits_for_next_tick() {
        let mut session = session_with_pending_open(0);
        assert!(session.position().is_none());

        // Same instant, no newer tick yet
        let now = session.latest().unwrap().timestamp;
        assert_eq!(session.commit_due(now).unwrap(), None);

        let outcome = session.on_tick(at(21, 98));
        assert_eq!(
            outcome.committed,
            Some(Committed::Opened {
                avg_open_price: Decimal::from(99)
            })
        );
    }

    #[test]
    fn test_commit_due_driven_by_clock() {
        let mut session = session_with_pending_open(5);
        session.buffer.append(at(21, 100));

        let early = at(24, 0).timestamp;
        assert_eq!(session.commit_due(early).unwrap(), None);
        assert!(session.is_busy());

        let due = at(25, 0).timestamp;
        assert!(matches!(
            session.commit_due(due).unwrap(),
            Some(Committed::Opened { .. })
        ));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_best_and_worst_tracked_while_open() {
        let mut session = session_with_pending_open(0);
        session.on_tick(at(21, 100));
        assert!(session.position().is_some());

        // Keep falling so no close is triggered
        session.on_tick(at(22, 97));
        session.on_tick(at(23, 99));

        let position = session.position().unwrap();
        assert_eq!(position.best_price, Decimal::from(100));
        assert_eq!(position.worst_price, Decimal::from(97));
    }

    #[test]
    fn test_force_close_uses_latest_tick() {
        let mut session = session_with_pending_open(0);
        session.on_tick(at(21, 100)); // opened at avg 100
        session.on_tick(at(22, 99));

        let record = session.on_force_close().unwrap();
        assert_eq!(record.avg_close_price, Decimal::from(99));
        assert!(session.position().is_none());
        assert_eq!(session.ledger().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_force_close_when_flat_fails() {
        let mut session = TradingSession::new(config(5));
        assert!(matches!(
            session.on_force_close(),
            Err(TraderError::NoPriceData)
        ));

        session.on_tick(at(0, 100));
        assert!(matches!(
            session.on_force_close(),
            Err(TraderError::NotPositioned)
        ));
    }

    #[test]
    fn test_force_clear_closes_then_clears() {
        let mut session = session_with_pending_open(0);
        session.on_tick(at(21, 100));
        assert!(session.position().is_some());

        let removed = session.on_force_clear().unwrap();
        assert_eq!(removed, 1);
        assert!(session.position().is_none());
        assert!(session.ledger().is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_force_clear_drops_pending_decision() {
        let mut session = session_with_pending_open(60);
        assert!(session.is_busy());

        assert_eq!(session.on_force_clear().unwrap(), 0);
        assert!(session.pending().is_none());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut session = session_with_pending_open(0);
        session.on_tick(at(21, 100));
        session.on_force_close().unwrap();
        session.on_tick(at(22, 99));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.history.len(), 5);
        assert_eq!(snapshot.ledger.len(), 1);
        assert_eq!(snapshot.total_profit, session.ledger().total_profit());

        let restored = TradingSession::restore(config(0), snapshot);
        assert_eq!(restored.history().len(), 5);
        assert_eq!(restored.ledger().len(), 1);
        assert!(restored.pending().is_none());
        assert!(!restored.is_busy());
    }

    #[test]
    fn test_restore_respects_max_history() {
        let mut session = TradingSession::new(config(5));
        for secs in 0..20 {
            session.on_tick(at(secs, 100));
        }

        let mut small = config(5);
        small.max_history = 8;
        let restored = TradingSession::restore(small, session.snapshot());

        let history = restored.history();
        assert_eq!(history.len(), 8);
        assert_eq!(history[0].timestamp, at(12, 0).timestamp);
    }

    #[test]
    fn test_oversized_delay_never_panics() {
        let mut session = TradingSession::new(EngineConfig {
            confirmation_delay_secs: 10_000_000_000_000_000,
            ..config(0)
        });

        session.on_tick(at(0, 104));
        session.on_tick(at(10, 104));
        let outcome = session.on_tick(at(20, 100));

        assert_eq!(outcome.skipped, Some(Skip::DelayOutOfRange));
        assert!(!outcome.pending);
        assert!(!session.is_busy());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_skips_log_at_debug() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut session = TradingSession::new(config(5));
            session.on_tick(at(0, 100));
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("DEBUG"), "{}", output);
        assert!(output.contains("No decision"), "{}", output);
        assert!(output.contains("TrendNotConfirmed"), "{}", output);
    }
}
