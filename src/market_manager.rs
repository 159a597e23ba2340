//! Market manager: the per-market `OrderBook` registry (§4.2 "Market
//! Manager").
//!
//! Grounded on `original_source/backend/internal/engine/orderbook.go`'s
//! `MarketManager` (lazy get-or-create over a map of books) and the
//! teacher's use of `dashmap::DashMap` for its service-level registries
//! (e.g. `PriceOracle`'s market state map).

use crate::orderbook::OrderBook;
use crate::types::MarketId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Holds one `OrderBook` per market, created lazily on first reference.
/// Books are never evicted: a settled market's book simply stops
/// receiving new orders (the orchestrator checks registry status first).
#[derive(Default)]
pub struct MarketManager {
    books: DashMap<MarketId, Arc<Mutex<OrderBook>>>,
}

impl MarketManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the book for `market_id`, creating an empty one if this is
    /// the first reference.
    pub fn get_or_create(&self, market_id: &str) -> Arc<Mutex<OrderBook>> {
        self.books
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())))
            .clone()
    }

    /// Return the book for `market_id` if one has already been created.
    pub fn get(&self, market_id: &str) -> Option<Arc<Mutex<OrderBook>>> {
        self.books.get(market_id).map(|entry| entry.clone())
    }

    pub fn market_count(&self) -> usize {
        self.books.len()
    }
}
