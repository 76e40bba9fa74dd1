use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of a finished trade. Profit and duration are derived on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedTradeRecord {
    pub id: Uuid,
    pub quantity: Decimal,
    pub avg_open_price: Decimal,
    pub avg_close_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

/// (avg_close_price - avg_open_price) * quantity
pub fn record_profit(record: &ClosedTradeRecord) -> Decimal {
    (record.avg_close_price - record.avg_open_price) * record.quantity
}

/// Seconds between open and close
pub fn record_duration(record: &ClosedTradeRecord) -> i64 {
    (record.close_time - record.open_time).num_seconds()
}

/// Sum of `record_profit` over every record
pub fn total_profit(records: &[ClosedTradeRecord]) -> Decimal {
    records.iter().map(record_profit).sum()
}

/// Aggregate statistics over the ledger
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LedgerSummary {
    pub trades: usize,
    pub winners: usize,
    pub losers: usize,
    pub total_profit: Decimal,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
    pub average_duration_secs: Option<i64>,
}

impl LedgerSummary {
    pub fn win_rate_pct(&self) -> Option<Decimal> {
        if self.trades == 0 {
            return None;
        }
        Some(Decimal::from(self.winners) * Decimal::ONE_HUNDRED / Decimal::from(self.trades))
    }
}

/// Append-only history of closed trades
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeLedger {
    records: Vec<ClosedTradeRecord>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ClosedTradeRecord) {
        tracing::info!(
            id = %record.id,
            profit = %record_profit(&record),
            duration_secs = record_duration(&record),
            "Trade recorded"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[ClosedTradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn total_profit(&self) -> Decimal {
        total_profit(&self.records)
    }

    pub fn summary(&self) -> LedgerSummary {
        let profits: Vec<Decimal> = self.records.iter().map(record_profit).collect();

        let average_duration_secs = if self.records.is_empty() {
            None
        } else {
            let total: i64 = self.records.iter().map(record_duration).sum();
            Some(total / self.records.len() as i64)
        };

        LedgerSummary {
            trades: self.records.len(),
            winners: profits.iter().filter(|p| **p > Decimal::ZERO).count(),
            losers: profits.iter().filter(|p| **p < Decimal::ZERO).count(),
            total_profit: profits.iter().copied().sum(),
            best_trade: profits.iter().copied().max(),
            worst_trade: profits.iter().copied().min(),
            average_duration_secs,
        }
    }
}
