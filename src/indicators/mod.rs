// Trend classification over sliding time windows
pub mod trend;

pub use trend::{classify, percent_change, TrendAnalyzer};
