use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TraderError};
use crate::execution::ledger::{ClosedTradeRecord, TradeLedger};
use crate::models::PriceTick;

/// A decided action, waiting to be committed
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Open {
        open_tick: PriceTick,
        open_time: DateTime<Utc>,
        quantity: Decimal,
    },
    Close {
        close_tick: PriceTick,
        close_time: DateTime<Utc>,
    },
}

impl Operation {
    /// The tick the decision was made on
    pub fn decision_tick(&self) -> &PriceTick {
        match self {
            Operation::Open { open_tick, .. } => open_tick,
            Operation::Close { close_tick, .. } => close_tick,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Open { .. } => "open",
            Operation::Close { .. } => "close",
        }
    }
}

/// The single live position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPosition {
    pub id: Uuid,
    pub open_tick: PriceTick,
    pub after_open_tick: PriceTick,
    /// Mean of the decision tick and the tick seen at commit
    pub avg_open_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub best_price: Decimal,
    pub worst_price: Decimal,
}

impl OpenPosition {
    /// Profit if closed at `price` right now
    pub fn unrealized_profit(&self, price: Decimal) -> Decimal {
        (price - self.avg_open_price) * self.quantity
    }

    /// Seconds the position has been open as of `now`
    pub fn duration(&self, now: DateTime<Utc>) -> i64 {
        (now - self.open_time).num_seconds()
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    Opened { avg_open_price: Decimal },
    Closed(ClosedTradeRecord),
}

fn mean(a: Decimal, b: Decimal) -> Decimal {
    (a + b) / Decimal::TWO
}

/// Owns the live position and the ledger of closed trades
#[derive(Debug, Clone, Default)]
pub struct PositionManager {
    position: Option<OpenPosition>,
    ledger: TradeLedger,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a saved position and ledger
    pub fn with_state(position: Option<OpenPosition>, ledger: TradeLedger) -> Self {
        tracing::info!(
            open = position.is_some(),
            trades = ledger.len(),
            total_profit = %ledger.total_profit(),
            "Restored position state"
        );
        Self { position, ledger }
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        self.position.as_ref()
    }

    pub fn has_open_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Track running extrema of the open position. No-op when flat.
    pub fn mark_price(&mut self, price: Decimal) {
        if let Some(position) = self.position.as_mut() {
            position.best_price = position.best_price.max(price);
            position.worst_price = position.worst_price.min(price);
        }
    }

    /// Commit an operation against the latest tick in history
    ///
    /// Open requires no position and Close requires one. A violation leaves
    /// state untouched and returns an error.
    pub fn apply(&mut self, operation: Operation, latest: &PriceTick) -> Result<Committed> {
        match operation {
            Operation::Open {
                open_tick,
                open_time,
                quantity,
            } => self
                .open(open_tick, open_time, quantity, latest)
                .map(|avg_open_price| Committed::Opened { avg_open_price }),
            Operation::Close {
                close_tick,
                close_time,
            } => self
                .close(close_tick, close_time, latest)
                .map(Committed::Closed),
        }
    }

    fn open(
        &mut self,
        open_tick: PriceTick,
        open_time: DateTime<Utc>,
        quantity: Decimal,
        latest: &PriceTick,
    ) -> Result<Decimal> {
        if self.position.is_some() {
            return Err(TraderError::AlreadyPositioned);
        }

        let avg_open_price = mean(open_tick.price, latest.price);
        let position = OpenPosition {
            id: Uuid::new_v4(),
            best_price: open_tick.price,
            worst_price: open_tick.price,
            after_open_tick: latest.clone(),
            open_tick,
            avg_open_price,
            open_time,
            quantity,
        };

        tracing::info!(
            id = %position.id,
            avg_open_price = %avg_open_price,
            quantity = %quantity,
            "Position opened"
        );

        self.position = Some(position);
        Ok(avg_open_price)
    }

    /// Close the live position and append it to the ledger
    pub fn close(
        &mut self,
        close_tick: PriceTick,
        close_time: DateTime<Utc>,
        latest: &PriceTick,
    ) -> Result<ClosedTradeRecord> {
        let position = self.position.take().ok_or(TraderError::NotPositioned)?;

        let avg_close_price = mean(close_tick.price, latest.price);
        let record = ClosedTradeRecord {
            id: position.id,
            quantity: position.quantity,
            avg_open_price: position.avg_open_price,
            avg_close_price,
            open_time: position.open_time,
            close_time,
        };

        tracing::info!(
            id = %record.id,
            avg_close_price = %avg_close_price,
            best_price = %position.best_price,
            worst_price = %position.worst_price,
            "Position closed"
        );

        self.ledger.record(record.clone());
        Ok(record)
    }

    /// Empty the ledger, returning how many records were dropped
    pub fn clear_ledger(&mut self) -> usize {
        self.ledger.clear()
    }
}
