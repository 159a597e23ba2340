//! Per-market dual-outcome order book (§4.2).
//!
//! Grounded on the teacher's `services/matching/orderbook.rs`: each side is a
//! `BTreeMap<price, VecDeque<Order>>` for O(log n) best-price lookup and
//! FIFO queueing at a level, matching the teacher's
//! `BTreeMap<PriceLevel, VecDeque<OrderEntry>>` shape. The crossing rules
//! themselves — traditional same-outcome crossing plus the complementary
//! YES+NO≥100 rule — are grounded on
//! `original_source/backend/internal/engine/orderbook.go`, including its
//! choice of which side of the complementary book to probe (see inline
//! notes below).

use crate::types::{Match, Order, Outcome, Side};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};

type Ladder = BTreeMap<u8, VecDeque<Order>>;

/// A single market's YES/NO order book.
///
/// Stateless across markets: all cross-market coordination lives in
/// `MarketManager`. The caller (orchestrator/heartbeat) is responsible for
/// serializing access to a given book — `MarketManager` hands out one
/// `Arc<parking_lot::Mutex<OrderBook>>` per market, matching §5's "each
/// Order Book owns a single mutex" discipline.
#[derive(Debug, Default)]
pub struct OrderBook {
    yes_bids: Ladder,
    yes_asks: Ladder,
    no_bids: Ladder,
    no_asks: Ladder,
    /// §4.2 "Suspension state": when set, `process_order` produces no
    /// matches and does not rest the order.
    suspended: bool,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// §4.2 `ProcessOrder`: match `incoming` against the book, resting any
    /// unfilled remainder, and return the matches produced in generation
    /// order.
    pub fn process_order(&mut self, mut incoming: Order) -> Vec<Match> {
        if self.suspended {
            return Vec::new();
        }
        debug_assert!(incoming.quantity > 0, "zero/negative quantity must be rejected upstream");

        let mut matches = Vec::new();
        let now = Utc::now();
        let incoming_price = incoming.price;

        // Traditional side: cross against the opposite side of the same outcome.
        // Complementary side: cross against the same side of the opposite outcome,
        // valid when the two prices sum to at least 100 (YES+NO=100 parity).
        //
        // The choice of which complementary ladder to probe, and in which
        // direction, follows the Go source exactly: it is always the
        // *natural* best of that ladder (bids descending, asks ascending),
        // so a single failed check safely terminates the complementary
        // loop for the Buy-vs-Buy and Sell-vs-Sell cases the source
        // implements.
        match (incoming.outcome, incoming.side) {
            (Outcome::Yes, Side::Buy) => {
                Self::match_against(
                    &mut self.yes_asks,
                    true,
                    &mut incoming,
                    |level| incoming_price >= level,
                    |level, _| level,
                    now,
                    &mut matches,
                );
                Self::match_against(
                    &mut self.no_bids,
                    false,
                    &mut incoming,
                    |level| incoming_price as u16 + level as u16 >= 100,
                    |_, taker| taker,
                    now,
                    &mut matches,
                );
            }
            (Outcome::Yes, Side::Sell) => {
                Self::match_against(
                    &mut self.yes_bids,
                    false,
                    &mut incoming,
                    |level| incoming_price <= level,
                    |level, _| level,
                    now,
                    &mut matches,
                );
                Self::match_against(
                    &mut self.no_asks,
                    true,
                    &mut incoming,
                    |level| incoming_price as u16 + level as u16 >= 100,
                    |_, taker| taker,
                    now,
                    &mut matches,
                );
            }
            (Outcome::No, Side::Buy) => {
                Self::match_against(
                    &mut self.no_asks,
                    true,
                    &mut incoming,
                    |level| incoming_price >= level,
                    |level, _| level,
                    now,
                    &mut matches,
                );
                Self::match_against(
                    &mut self.yes_bids,
                    false,
                    &mut incoming,
                    |level| incoming_price as u16 + level as u16 >= 100,
                    |_, taker| taker,
                    now,
                    &mut matches,
                );
            }
            (Outcome::No, Side::Sell) => {
                Self::match_against(
                    &mut self.no_bids,
                    false,
                    &mut incoming,
                    |level| incoming_price <= level,
                    |level, _| level,
                    now,
                    &mut matches,
                );
                Self::match_against(
                    &mut self.yes_asks,
                    true,
                    &mut incoming,
                    |level| incoming_price as u16 + level as u16 >= 100,
                    |_, taker| taker,
                    now,
                    &mut matches,
                );
            }
        }

        if incoming.quantity > 0 {
            self.rest(incoming);
        }

        matches
    }

    /// Drain matches from a single ladder while `price_ok` holds for the
    /// ladder's current best level, at the execution price `exec_price`
    /// computes from (maker level, taker price).
    fn match_against(
        levels: &mut Ladder,
        ascending: bool,
        incoming: &mut Order,
        price_ok: impl Fn(u8) -> bool,
        exec_price: impl Fn(u8, u8) -> u8,
        now: chrono::DateTime<Utc>,
        matches: &mut Vec<Match>,
    ) {
        loop {
            if incoming.quantity <= 0 {
                break;
            }
            let best_key = if ascending {
                levels.keys().next().copied()
            } else {
                levels.keys().next_back().copied()
            };
            let Some(key) = best_key else { break };
            if !price_ok(key) {
                break;
            }

            let queue = levels.get_mut(&key).expect("key came from this map");
            let maker_qty_before;
            let maker_id;
            {
                let maker = queue.front_mut().expect("non-empty level");
                let qty = incoming.quantity.min(maker.quantity);
                let price = exec_price(key, incoming.price);

                matches.push(Match {
                    maker_order_id: maker.id,
                    taker_order_id: incoming.id,
                    price,
                    quantity: qty,
                    timestamp: now,
                });

                incoming.quantity -= qty;
                maker.quantity -= qty;
                maker_qty_before = maker.quantity;
                maker_id = maker.id;
            }
            let _ = maker_id;
            if maker_qty_before == 0 {
                queue.pop_front();
            }
            if queue.is_empty() {
                levels.remove(&key);
            }
        }
    }

    /// Insert a residual order as a resting order on its natural side
    /// (Buy rests as a bid, Sell rests as an ask, in its own outcome's
    /// ladder).
    fn rest(&mut self, order: Order) {
        let ladder = match (order.outcome, order.side) {
            (Outcome::Yes, Side::Buy) => &mut self.yes_bids,
            (Outcome::Yes, Side::Sell) => &mut self.yes_asks,
            (Outcome::No, Side::Buy) => &mut self.no_bids,
            (Outcome::No, Side::Sell) => &mut self.no_asks,
        };
        ladder.entry(order.price).or_default().push_back(order);
    }

    /// Best price currently on a given ladder, for diagnostics/snapshots.
    pub fn best_price(&self, outcome: Outcome, side: Side) -> Option<u8> {
        match (outcome, side) {
            (Outcome::Yes, Side::Buy) => self.yes_bids.keys().next_back().copied(),
            (Outcome::Yes, Side::Sell) => self.yes_asks.keys().next().copied(),
            (Outcome::No, Side::Buy) => self.no_bids.keys().next_back().copied(),
            (Outcome::No, Side::Sell) => self.no_asks.keys().next().copied(),
        }
    }

    /// Total resting quantity across a ladder, for tests/diagnostics.
    pub fn depth(&self, outcome: Outcome, side: Side) -> i64 {
        let ladder = match (outcome, side) {
            (Outcome::Yes, Side::Buy) => &self.yes_bids,
            (Outcome::Yes, Side::Sell) => &self.yes_asks,
            (Outcome::No, Side::Buy) => &self.no_bids,
            (Outcome::No, Side::Sell) => &self.no_asks,
        };
        ladder.values().flat_map(|q| q.iter()).map(|o| o.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order(id: u64, user: &str, side: Side, outcome: Outcome, price: u8, qty: i64) -> Order {
        Order {
            id,
            user_id: user.into(),
            market_id: "m1".into(),
            side,
            outcome,
            price,
            quantity: qty,
            accept_time: Utc::now(),
        }
    }

    #[test]
    fn s1_same_outcome_cross() {
        // user A Sell YES @ 60 qty 10; user B Buy YES @ 65 qty 4.
        let mut book = OrderBook::new();
        let a = order(1, "A", Side::Sell, Outcome::Yes, 60, 10);
        assert!(book.process_order(a).is_empty());

        let b = order(2, "B", Side::Buy, Outcome::Yes, 65, 4);
        let matches = book.process_order(b);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].maker_order_id, 1);
        assert_eq!(matches[0].taker_order_id, 2);
        assert_eq!(matches[0].price, 60);
        assert_eq!(matches[0].quantity, 4);

        assert_eq!(book.depth(Outcome::Yes, Side::Sell), 6);
    }

    #[test]
    fn s2_complementary_cross() {
        // A Buy YES @ 70 qty 5; B Buy NO @ 35 qty 5. 70+35=105 >= 100.
        let mut book = OrderBook::new();
        let a = order(1, "A", Side::Buy, Outcome::Yes, 70, 5);
        assert!(book.process_order(a).is_empty());

        let b = order(2, "B", Side::Buy, Outcome::No, 35, 5);
        let matches = book.process_order(b);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].maker_order_id, 1);
        assert_eq!(matches[0].taker_order_id, 2);
        // taker (B) fixes the price.
        assert_eq!(matches[0].price, 35);
        assert_eq!(matches[0].quantity, 5);
    }

    #[test]
    fn complementary_cross_below_threshold_does_not_match() {
        let mut book = OrderBook::new();
        let a = order(1, "A", Side::Buy, Outcome::Yes, 40, 5);
        book.process_order(a);

        let b = order(2, "B", Side::Buy, Outcome::No, 50, 5);
        let matches = book.process_order(b);
        // 40 + 50 = 90 < 100, no cross.
        assert!(matches.is_empty());
        assert_eq!(book.depth(Outcome::Yes, Side::Buy), 5);
        assert_eq!(book.depth(Outcome::No, Side::Buy), 5);
    }

    #[test]
    fn suspended_book_produces_no_matches_and_does_not_rest() {
        let mut book = OrderBook::new();
        book.set_suspended(true);
        let a = order(1, "A", Side::Buy, Outcome::Yes, 50, 5);
        let matches = book.process_order(a);
        assert!(matches.is_empty());
        assert_eq!(book.depth(Outcome::Yes, Side::Buy), 0);
    }

    #[test]
    fn partial_fill_leaves_remnant_resting() {
        let mut book = OrderBook::new();
        let ask = order(1, "A", Side::Sell, Outcome::Yes, 50, 3);
        book.process_order(ask);

        let buy = order(2, "B", Side::Buy, Outcome::Yes, 50, 10);
        let matches = book.process_order(buy);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].quantity, 3);
        // 7 remaining from B now rest as a bid.
        assert_eq!(book.depth(Outcome::Yes, Side::Buy), 7);
        assert_eq!(book.depth(Outcome::Yes, Side::Sell), 0);
    }

    #[test]
    fn price_time_priority_within_a_level() {
        let mut book = OrderBook::new();
        book.process_order(order(1, "A", Side::Sell, Outcome::Yes, 50, 2));
        book.process_order(order(2, "B", Side::Sell, Outcome::Yes, 50, 2));

        let matches = book.process_order(order(3, "C", Side::Buy, Outcome::Yes, 50, 3));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].maker_order_id, 1);
        assert_eq!(matches[0].quantity, 2);
        assert_eq!(matches[1].maker_order_id, 2);
        assert_eq!(matches[1].quantity, 1);
    }

    #[test]
    fn best_ask_price_chosen_over_worse_ask() {
        let mut book = OrderBook::new();
        book.process_order(order(1, "A", Side::Sell, Outcome::Yes, 55, 5));
        book.process_order(order(2, "B", Side::Sell, Outcome::Yes, 50, 5));

        let matches = book.process_order(order(3, "C", Side::Buy, Outcome::Yes, 60, 5));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].maker_order_id, 2);
        assert_eq!(matches[0].price, 50);
    }
}
