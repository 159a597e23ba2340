//! Accounts and positions (§4.4 "Ledger").
//!
//! Grounded on `original_source/backend/internal/engine/ledger.go`: a single
//! mutex guards both the account table and the per-user position table, the
//! same single-lock-per-component discipline `original_source`'s
//! `Ledger.mu` and §5 both call for. Over-debit on `move_reserved_to_spent`
//! / `release_reserved` clamps to the available reserved amount rather than
//! panicking, logging the clamp as a diagnostic (§7 error handling: "the
//! core degrades observably rather than crashing on an accounting
//! impossibility").

use crate::types::{MarketId, MinorUnits, Outcome, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub available: MinorUnits,
    pub reserved: MinorUnits,
    pub spent: MinorUnits,
    pub realized_pnl: MinorUnits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketPosition {
    pub market_id: MarketId,
    pub yes_shares: i64,
    pub no_shares: i64,
    pub yes_cost: MinorUnits,
    pub no_cost: MinorUnits,
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub user_id: UserId,
    pub market_id: MarketId,
    pub winner: Outcome,
    pub payout: MinorUnits,
    pub total_cost: MinorUnits,
    pub realized_pnl: MinorUnits,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    positions_by_user: HashMap<UserId, HashMap<MarketId, MarketPosition>>,
}

/// Single-lock ledger of accounts and per-market positions.
pub struct Ledger {
    inner: Mutex<Inner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create `user_id`'s account with `initial_balance` available if it
    /// does not already exist. A no-op on repeat calls.
    pub fn ensure_user(&self, user_id: &str, initial_balance: MinorUnits) {
        let mut inner = self.inner.lock();
        inner.accounts.entry(user_id.to_string()).or_insert_with(|| Account {
            user_id: user_id.to_string(),
            available: initial_balance,
            ..Default::default()
        });
    }

    /// Move `amount` from available to reserved. Fails (returns `false`)
    /// for a non-positive amount, an unknown user, or insufficient
    /// available balance; does not clamp, since under-reservation would
    /// silently admit an order the user cannot afford.
    pub fn reserve(&self, user_id: &str, amount: MinorUnits) -> bool {
        if amount <= 0 {
            return false;
        }
        let mut inner = self.inner.lock();
        let Some(acc) = inner.accounts.get_mut(user_id) else {
            return false;
        };
        if acc.available < amount {
            return false;
        }
        acc.available -= amount;
        acc.reserved += amount;
        true
    }

    /// Move `amount` from reserved to spent, clamping to the reserved
    /// balance and logging if a clamp occurred.
    pub fn move_reserved_to_spent(&self, user_id: &str, amount: MinorUnits) {
        if amount <= 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let Some(acc) = inner.accounts.get_mut(user_id) else {
            return;
        };
        let amount = clamp_to_reserved(user_id, "move_reserved_to_spent", amount, acc.reserved);
        acc.reserved -= amount;
        acc.spent += amount;
    }

    /// Release `amount` from reserved back to available, clamping to the
    /// reserved balance and logging if a clamp occurred.
    pub fn release_reserved(&self, user_id: &str, amount: MinorUnits) {
        if amount <= 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let Some(acc) = inner.accounts.get_mut(user_id) else {
            return;
        };
        let amount = clamp_to_reserved(user_id, "release_reserved", amount, acc.reserved);
        acc.reserved -= amount;
        acc.available += amount;
    }

    /// Record a fill: `quantity` shares of `outcome` acquired for `cost`
    /// minor units, added to the user's position in `market_id`.
    pub fn add_fill(&self, user_id: &str, market_id: &str, outcome: Outcome, quantity: i64, cost: MinorUnits) {
        if quantity <= 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let position = inner
            .positions_by_user
            .entry(user_id.to_string())
            .or_default()
            .entry(market_id.to_string())
            .or_insert_with(|| MarketPosition {
                market_id: market_id.to_string(),
                ..Default::default()
            });

        match outcome {
            Outcome::Yes => {
                position.yes_shares += quantity;
                position.yes_cost += cost;
            }
            Outcome::No => {
                position.no_shares += quantity;
                position.no_cost += cost;
            }
        }
    }

    pub fn get_account(&self, user_id: &str) -> Option<Account> {
        self.inner.lock().accounts.get(user_id).cloned()
    }

    pub fn get_positions(&self, user_id: &str) -> Vec<MarketPosition> {
        self.inner
            .lock()
            .positions_by_user
            .get(user_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Pay out every unsettled position in `market_id` according to
    /// `winner`: the winning side's shares pay 100 minor units each, the
    /// losing side's pay nothing. Idempotent per user/market: a position
    /// already marked settled is skipped on a repeat call.
    pub fn settle_market(&self, market_id: &str, winner: Outcome) -> Vec<SettlementResult> {
        let mut inner = self.inner.lock();
        let mut results = Vec::new();

        let user_ids: Vec<UserId> = inner.positions_by_user.keys().cloned().collect();
        for user_id in user_ids {
            let Some(user_positions) = inner.positions_by_user.get_mut(&user_id) else {
                continue;
            };
            let Some(position) = user_positions.get_mut(market_id) else {
                continue;
            };
            if position.settled {
                continue;
            }

            let total_cost = position.yes_cost + position.no_cost;
            let winning_shares = match winner {
                Outcome::Yes => position.yes_shares,
                Outcome::No => position.no_shares,
            };
            let payout = winning_shares * 100;
            let realized = payout - total_cost;

            if let Some(acc) = inner.accounts.get_mut(&user_id) {
                acc.available += payout;
                let spent_reduction = total_cost.min(acc.spent);
                acc.spent -= spent_reduction;
                acc.realized_pnl += realized;
            }

            position.settled = true;
            results.push(SettlementResult {
                user_id: user_id.clone(),
                market_id: market_id.to_string(),
                winner,
                payout,
                total_cost,
                realized_pnl: realized,
            });
        }

        results
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_to_reserved(user_id: &str, op: &str, amount: MinorUnits, reserved: MinorUnits) -> MinorUnits {
    if amount > reserved {
        tracing::warn!(user_id, op, requested = amount, reserved, "clamping over-debit of reserved funds");
        reserved
    } else {
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_user_is_idempotent() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 1000);
        ledger.ensure_user("alice", 5000);
        assert_eq!(ledger.get_account("alice").unwrap().available, 1000);
    }

    #[test]
    fn reserve_moves_available_to_reserved() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 1000);
        assert!(ledger.reserve("alice", 400));
        let acc = ledger.get_account("alice").unwrap();
        assert_eq!(acc.available, 600);
        assert_eq!(acc.reserved, 400);
    }

    #[test]
    fn reserve_fails_on_insufficient_balance() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 100);
        assert!(!ledger.reserve("alice", 200));
        let acc = ledger.get_account("alice").unwrap();
        assert_eq!(acc.available, 100);
        assert_eq!(acc.reserved, 0);
    }

    #[test]
    fn reserve_fails_for_unknown_user() {
        let ledger = Ledger::new();
        assert!(!ledger.reserve("ghost", 100));
    }

    #[test]
    fn move_reserved_to_spent_clamps_over_debit() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 1000);
        ledger.reserve("alice", 100);
        ledger.move_reserved_to_spent("alice", 500);
        let acc = ledger.get_account("alice").unwrap();
        assert_eq!(acc.reserved, 0);
        assert_eq!(acc.spent, 100);
    }

    #[test]
    fn release_reserved_returns_funds_to_available() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 1000);
        ledger.reserve("alice", 400);
        ledger.release_reserved("alice", 400);
        let acc = ledger.get_account("alice").unwrap();
        assert_eq!(acc.available, 1000);
        assert_eq!(acc.reserved, 0);
    }

    #[test]
    fn settle_market_pays_winning_side_and_marks_settled() {
        let ledger = Ledger::new();
        ledger.ensure_user("alice", 1000);
        ledger.reserve("alice", 600);
        ledger.add_fill("alice", "m1", Outcome::Yes, 10, 600);
        ledger.move_reserved_to_spent("alice", 600);

        let results = ledger.settle_market("m1", Outcome::Yes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payout, 1000);
        assert_eq!(results[0].realized_pnl, 400);

        let acc = ledger.get_account("alice").unwrap();
        assert_eq!(acc.available, 400 + 1000);
        assert_eq!(acc.spent, 0);
        assert_eq!(acc.realized_pnl, 400);

        // Idempotent: settling again yields no further results or payout.
        let again = ledger.settle_market("m1", Outcome::Yes);
        assert!(again.is_empty());
    }

    #[test]
    fn settle_market_pays_zero_to_losing_side() {
        let ledger = Ledger::new();
        ledger.ensure_user("bob", 1000);
        ledger.reserve("bob", 300);
        ledger.add_fill("bob", "m1", Outcome::No, 10, 300);
        ledger.move_reserved_to_spent("bob", 300);

        let results = ledger.settle_market("m1", Outcome::Yes);
        assert_eq!(results[0].payout, 0);
        assert_eq!(results[0].realized_pnl, -300);
    }
}
