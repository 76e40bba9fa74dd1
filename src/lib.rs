// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod persistence;

// Re-export commonly used types
pub use crate::config::{EngineConfig, Settings, TrendConfig};
pub use crate::error::{Result, TraderError};
pub use crate::execution::{FeedEvent, SessionSnapshot, TradingSession};
pub use crate::models::*;
