use serde::Serialize;
use std::sync::Arc;

use crate::events::Event;
use crate::store::BoundedStore;

/// Statistical snapshot of the trailing window of stored events.
/// Rebuilt for every detection pass; never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyContext {
    /// Events inside the window, oldest first.
    #[serde(skip)]
    pub recent_events: Arc<Vec<Event>>,
    pub transaction_volume: usize,
    pub average_fees: f64,
    /// Failed transactions over all transactions in the window, in [0, 1].
    pub error_rate: f64,
    pub timestamp: i64,
    pub window_ms: i64,
}

impl AnomalyContext {
    /// Transactions sent by `sender` with a timestamp in `[since_ms, until_ms]`.
    pub fn transactions_from(&self, sender: &str, since_ms: i64, until_ms: i64) -> usize {
        self.recent_events
            .iter()
            .filter(|e| e.is_transaction())
            .filter(|e| (since_ms..=until_ms).contains(&e.timestamp))
            .filter(|e| e.sender() == Some(sender))
            .count()
    }
}

/// Build the context from the store's current contents.
pub fn build(store: &BoundedStore<Event>, now_ms: i64, window_ms: i64) -> AnomalyContext {
    summarize(store.snapshot(), now_ms, window_ms)
}

/// Pure summary of an oldest-to-newest event sequence. Only events with
/// `timestamp > now_ms - window_ms` are considered.
pub fn summarize(events: Vec<Event>, now_ms: i64, window_ms: i64) -> AnomalyContext {
    let cutoff = now_ms.saturating_sub(window_ms);
    let recent: Vec<Event> = events.into_iter().filter(|e| e.timestamp > cutoff).collect();

    let mut transactions = 0usize;
    let mut failed = 0usize;
    let mut fee_total = 0.0f64;
    let mut fee_count = 0usize;

    for event in recent.iter().filter(|e| e.is_transaction()) {
        transactions += 1;
        if event.is_failed() {
            failed += 1;
        }
        if let Some(fee) = event.fee().filter(|f| *f > 0.0) {
            fee_total += fee;
            fee_count += 1;
        }
    }

    let error_rate = if transactions > 0 {
        failed as f64 / transactions as f64
    } else {
        0.0
    };
    let average_fees = if fee_count > 0 {
        fee_total / fee_count as f64
    } else {
        0.0
    };

    AnomalyContext {
        recent_events: Arc::new(recent),
        transaction_volume: transactions,
        average_fees,
        error_rate,
        timestamp: now_ms,
        window_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;
    const WINDOW: i64 = 300_000;

    fn tx(ts: i64, data: serde_json::Value) -> Event {
        Event::transaction(ts, data)
    }

    #[test]
    fn test_empty_store() {
        let store = BoundedStore::new(10);
        let ctx = build(&store, NOW, WINDOW);
        assert_eq!(ctx.transaction_volume, 0);
        assert_eq!(ctx.average_fees, 0.0);
        assert_eq!(ctx.error_rate, 0.0);
        assert!(ctx.recent_events.is_empty());
    }

    #[test]
    fn test_window_filtering_and_stats() {
        let store = BoundedStore::new(10);
        // Outside the window: exactly at the cutoff is excluded.
        store.push(tx(NOW - WINDOW, json!({"fee": 1000, "status": "failed"})));
        store.push(tx(NOW - 1000, json!({"fee": 10})));
        store.push(tx(NOW - 500, json!({"fee": 30, "status": "failed"})));
        store.push(tx(NOW - 400, json!({"fee": 0})));
        store.push(tx(NOW - 300, json!({})));
        store.push(Event::new(EventKind::Block, NOW - 200, json!({"fee": 999})));

        let ctx = build(&store, NOW, WINDOW);
        assert_eq!(ctx.recent_events.len(), 5);
        assert_eq!(ctx.transaction_volume, 4);
        assert_eq!(ctx.error_rate, 0.25);
        // Only positive transaction fees contribute.
        assert_eq!(ctx.average_fees, 20.0);
        assert_eq!(ctx.timestamp, NOW);
        assert_eq!(ctx.window_ms, WINDOW);
    }

    #[test]
    fn test_no_fees_never_divides_by_zero() {
        let store = BoundedStore::new(4);
        store.push(tx(NOW, json!({"fee": -5})));
        store.push(tx(NOW, json!({"fee": "abc"})));
        let ctx = build(&store, NOW, WINDOW);
        assert_eq!(ctx.average_fees, 0.0);
        assert_eq!(ctx.transaction_volume, 2);
    }

    #[test]
    fn test_build_is_pure() {
        let store = BoundedStore::new(8);
        for i in 0..6 {
            store.push(tx(NOW - i * 1000, json!({"fee": 3 + i, "success": i % 2 == 0})));
        }
        let a = build(&store, NOW, WINDOW);
        let b = build(&store, NOW, WINDOW);
        assert_eq!(a, b);
        assert_eq!(a.average_fees.to_bits(), b.average_fees.to_bits());
        assert_eq!(a.error_rate.to_bits(), b.error_rate.to_bits());
    }

    #[test]
    fn test_transactions_from() {
        let store = BoundedStore::new(8);
        store.push(tx(NOW - 70_000, json!({"from": "a"})));
        store.push(tx(NOW - 30_000, json!({"from": "a"})));
        store.push(tx(NOW - 10_000, json!({"from": "b"})));
        store.push(tx(NOW, json!({"from": "a"})));
        let ctx = build(&store, NOW, WINDOW);
        assert_eq!(ctx.transactions_from("a", NOW - 60_000, NOW), 2);
        assert_eq!(ctx.transactions_from("b", NOW - 60_000, NOW), 1);
    }
}
