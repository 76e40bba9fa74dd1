use crate::models::PriceTick;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe bounded history of price ticks
///
/// Ticks are kept in arrival order. Once `max_ticks` is exceeded the oldest
/// tick is evicted.
#[derive(Clone)]
pub struct PriceHistoryBuffer {
    data: Arc<RwLock<VecDeque<PriceTick>>>,
    max_ticks: usize,
}

impl PriceHistoryBuffer {
    /// Create a new buffer
    ///
    /// # Arguments
    /// * `max_ticks` - Maximum number of ticks to keep
    pub fn new(max_ticks: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(VecDeque::with_capacity(max_ticks.min(4096)))),
            max_ticks,
        }
    }

    // A poisoned lock still holds a consistent deque: every mutation below
    // is a single push/pop, so recover the guard instead of failing.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<PriceTick>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<PriceTick>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a tick at the tail, evicting from the head when full
    pub fn append(&self, tick: PriceTick) {
        let mut data = self.write();

        if let Some(last) = data.back() {
            if tick.timestamp < last.timestamp {
                tracing::warn!(
                    tick_time = %tick.timestamp,
                    last_time = %last.timestamp,
                    "Out-of-order tick appended"
                );
            }
        }

        data.push_back(tick);

        while data.len() > self.max_ticks {
            data.pop_front();
        }
    }

    /// Most recent tick, if any
    pub fn latest(&self) -> Option<PriceTick> {
        self.read().back().cloned()
    }

    /// Owned copy of the whole history, oldest first
    pub fn snapshot(&self) -> Vec<PriceTick> {
        self.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
