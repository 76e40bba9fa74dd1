use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Result, TraderError};

/// Longest accepted trend window (30 days)
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest accepted confirmation delay (1 day)
pub const MAX_CONFIRMATION_DELAY_SECS: u64 = 24 * 60 * 60;

/// Trend windows that gate opening and closing
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendConfig {
    /// Every window must read `Down` before a position is opened
    pub open_windows_secs: Vec<u64>,
    /// Every window must read `Up` before a position is closed.
    /// Empty means positions are only closed by an operator.
    pub close_windows_secs: Vec<u64>,
    /// Minimum absolute percent change for a window to count as trending
    pub min_percent_change: Decimal,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            open_windows_secs: vec![30, 60, 300],
            close_windows_secs: vec![30, 60],
            min_percent_change: Decimal::new(1, 2), // 0.01%
        }
    }
}

/// Decision engine parameters, fixed at startup
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub investment_amount: Decimal,
    pub min_profit_percent_to_close: Decimal,
    pub min_profit_amount_to_close: Decimal,
    pub confirmation_delay_secs: u64,
    pub max_history: usize,
    pub trend: TrendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            investment_amount: Decimal::from(1000),
            min_profit_percent_to_close: Decimal::new(1, 1), // 0.1%
            min_profit_amount_to_close: Decimal::new(50, 2), // $0.50
            confirmation_delay_secs: 10,
            max_history: 1000,
            trend: TrendConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.investment_amount <= Decimal::ZERO {
            return Err(TraderError::InvalidConfig(
                "investment_amount must be positive".to_string(),
            ));
        }
        if self.max_history == 0 {
            return Err(TraderError::InvalidConfig(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.trend.open_windows_secs.is_empty() {
            return Err(TraderError::InvalidConfig(
                "at least one open trend window is required".to_string(),
            ));
        }
        let all_windows = self
            .trend
            .open_windows_secs
            .iter()
            .chain(self.trend.close_windows_secs.iter());
        for &window in all_windows {
            if window == 0 {
                return Err(TraderError::InvalidConfig(
                    "trend windows must be longer than 0 seconds".to_string(),
                ));
            }
            if window > MAX_WINDOW_SECS {
                return Err(TraderError::InvalidConfig(format!(
                    "trend window {}s exceeds the maximum of {}s",
                    window, MAX_WINDOW_SECS
                )));
            }
        }
        if self.confirmation_delay_secs > MAX_CONFIRMATION_DELAY_SECS {
            return Err(TraderError::InvalidConfig(format!(
                "confirmation_delay_secs {} exceeds the maximum of {}",
                self.confirmation_delay_secs, MAX_CONFIRMATION_DELAY_SECS
            )));
        }
        Ok(())
    }
}

/// Top-level application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub log_level: String,
    pub snapshot_path: PathBuf,
    pub snapshot_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log_level: "trendbot=info".to_string(),
            snapshot_path: PathBuf::from("data/session.json"),
            snapshot_interval_secs: 1,
        }
    }
}

impl Settings {
    /// Load settings in layers:
    /// 1. Built-in defaults
    /// 2. Optional TOML file at `path`
    /// 3. Environment variables (e.g. `TRENDBOT__ENGINE__INVESTMENT_AMOUNT=500`)
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("TRENDBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.engine.validate()?;

        tracing::debug!(?settings, "Loaded settings");

        Ok(settings)
    }
}
