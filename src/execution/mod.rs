// Decision engine, position bookkeeping and the session that wires them
pub mod engine;
pub mod ledger;
pub mod position_manager;
pub mod price_buffer;
pub mod runner;
pub mod session;

pub use engine::{PendingDecision, Skip, TradeDecisionEngine};
pub use ledger::{
    record_duration, record_profit, total_profit, ClosedTradeRecord, LedgerSummary, TradeLedger,
};
pub use position_manager::{Committed, OpenPosition, Operation, PositionManager};
pub use price_buffer::PriceHistoryBuffer;
pub use runner::{handle_event, run_session, FeedEvent, SharedSession};
pub use session::{SessionSnapshot, TickOutcome, TradingSession};
