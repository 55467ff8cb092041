use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Latest known quote for one symbol. Snapshots replace every field; ticks
/// move only `price`, `change`, `change_percent` and `timestamp`, so the
/// session fields stay as stale as the last snapshot and no staler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub prev_close: f64,
    pub timestamp: i64,
}

/// Shared quote table keyed by symbol, arbitrated per symbol by timestamp
/// monotonicity: an update older than the stored quote is never applied.
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: HashMap<String, Quote>,
}

impl QuoteCache {
    pub fn new() -> QuoteCache {
        QuoteCache {
            quotes: HashMap::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.quotes.contains_key(symbol)
    }

    /// Full replacement from a REST snapshot. Rejected when an existing
    /// entry carries a newer timestamp.
    pub fn apply_snapshot(&mut self, quote: Quote) -> bool {
        if let Some(stored) = self.quotes.get(&quote.symbol) {
            if quote.timestamp < stored.timestamp {
                return false;
            }
        }
        self.quotes.insert(quote.symbol.clone(), quote);
        true
    }

    /// Streaming trade update. Dropped when the symbol has no snapshot yet
    /// (the snapshot supplies `prev_close`, the baseline for the derived
    /// fields) or when the tick is older than the stored quote.
    pub fn apply_tick(&mut self, symbol: &str, price: f64, timestamp: i64) -> bool {
        let Some(stored) = self.quotes.get_mut(symbol) else {
            return false;
        };
        if timestamp < stored.timestamp {
            return false;
        }
        stored.price = price;
        stored.change = price - stored.prev_close;
        stored.change_percent = if stored.prev_close.abs() > f64::EPSILON {
            stored.change / stored.prev_close * 100.0
        } else {
            0.0
        };
        stored.timestamp = timestamp;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(symbol: &str, price: f64, prev_close: f64, timestamp: i64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            change: price - prev_close,
            change_percent: (price - prev_close) / prev_close * 100.0,
            high: price,
            low: prev_close,
            open: prev_close,
            prev_close,
            timestamp,
        }
    }

    #[test]
    fn tick_without_snapshot_is_dropped() {
        let mut cache = QuoteCache::new();
        assert!(!cache.apply_tick("AAPL", 101.0, 1000));
        assert!(cache.get("AAPL").is_none());
    }

    #[test]
    fn tick_recomputes_change_from_prev_close() {
        let mut cache = QuoteCache::new();
        cache.apply_snapshot(snapshot("AAPL", 102.0, 100.0, 1000));
        assert!(cache.apply_tick("AAPL", 110.0, 1500));
        let quote = cache.get("AAPL").expect("should hold AAPL");
        assert!((quote.price - 110.0).abs() < 1e-9);
        assert!((quote.change - 10.0).abs() < 1e-9);
        assert!((quote.change_percent - 10.0).abs() < 1e-9);
        assert_eq!(quote.timestamp, 1500);
    }

    #[test]
    fn out_of_order_tick_is_rejected() {
        let mut cache = QuoteCache::new();
        cache.apply_snapshot(snapshot("AAPL", 102.0, 100.0, 1000));
        assert!(cache.apply_tick("AAPL", 110.0, 1500));
        assert!(!cache.apply_tick("AAPL", 90.0, 1200));
        let quote = cache.get("AAPL").expect("should hold AAPL");
        assert!((quote.price - 110.0).abs() < 1e-9);
        assert_eq!(quote.timestamp, 1500);
    }

    #[test]
    fn tick_leaves_session_fields_untouched() {
        let mut cache = QuoteCache::new();
        cache.apply_snapshot(snapshot("MSFT", 300.0, 295.0, 1000));
        cache.apply_tick("MSFT", 310.0, 2000);
        let quote = cache.get("MSFT").expect("should hold MSFT");
        assert!((quote.high - 300.0).abs() < 1e-9);
        assert!((quote.low - 295.0).abs() < 1e-9);
        assert!((quote.open - 295.0).abs() < 1e-9);
        assert!((quote.prev_close - 295.0).abs() < 1e-9);
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let mut cache = QuoteCache::new();
        cache.apply_snapshot(snapshot("NVDA", 500.0, 490.0, 2000));
        assert!(!cache.apply_snapshot(snapshot("NVDA", 480.0, 490.0, 1500)));
        let quote = cache.get("NVDA").expect("should hold NVDA");
        assert!((quote.price - 500.0).abs() < 1e-9);

        // Equal timestamps re-apply; the rule is non-decreasing, not strict.
        assert!(cache.apply_snapshot(snapshot("NVDA", 505.0, 490.0, 2000)));
    }
}
