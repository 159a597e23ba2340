//! Order lifecycle orchestration (§4.6).
//!
//! Owns the wiring between the fairness buffer, market manager, ledger,
//! registry, and audit chain. Grounded on the teacher's
//! `services/matching/orchestrator.rs` `OrderFlowOrchestrator`
//! (validate → reserve → hand off → process match → settle), stripped of
//! its sqlx persistence and referral-commission concerns, and on
//! `original_source/backend/internal/engine/orderbook.go` /
//! `ledger.go` for the reserve/settlement arithmetic itself.

use crate::audit::AuditChain;
use crate::config::EngineConfig;
use crate::errors::{RegistryError, RejectReason};
use crate::ledger::{Account, Ledger, MarketPosition};
use crate::market_manager::MarketManager;
use crate::messages::{
    GameEventPayload, MarketSettledPayload, MatchOccurredPayload, OrderRejectedPayload, OutboundMessage,
};
use crate::registry::{GameState, MarketMetadata, MarketRegistry, MarketStatus, TelemetryOutcome};
use crate::types::{Match, MinorUnits, Order, Outcome, Side};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Bookkeeping kept per accepted order so a later match can be resolved
/// back to its reserve and effective outcome (§4.6 step 2).
#[derive(Debug, Clone)]
struct OpenOrder {
    user_id: String,
    market_id: String,
    side: Side,
    outcome: Outcome,
    reserved_remaining: MinorUnits,
}

/// Central coordinator: the only component that calls into more than one
/// of the others. Individual components never call each other directly.
pub struct Orchestrator {
    config: EngineConfig,
    ledger: Arc<Ledger>,
    market_manager: Arc<MarketManager>,
    registry: Arc<MarketRegistry>,
    audit: Arc<AuditChain>,
    next_order_id: AtomicU64,
    open_orders: Mutex<HashMap<u64, OpenOrder>>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<Ledger>,
        market_manager: Arc<MarketManager>,
        registry: Arc<MarketRegistry>,
        audit: Arc<AuditChain>,
    ) -> Self {
        let (outbound, _) = broadcast::channel(1024);
        Self {
            config,
            ledger,
            market_manager,
            registry,
            audit,
            next_order_id: AtomicU64::new(1),
            open_orders: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }

    /// Handle to the underlying market manager, for read-only queries
    /// (§6.2) and tests.
    pub fn market_manager(&self) -> Arc<MarketManager> {
        self.market_manager.clone()
    }

    pub fn registry(&self) -> Arc<MarketRegistry> {
        self.registry.clone()
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// §6.2 "list markets".
    pub fn list_markets(&self) -> Vec<MarketMetadata> {
        self.registry.list_markets()
    }

    /// §6.2 "get market by id".
    pub fn get_market(&self, market_id: &str) -> Result<MarketMetadata, RegistryError> {
        self.registry
            .get_market(market_id)
            .ok_or_else(|| RegistryError::MarketNotFound(market_id.to_string()))
    }

    /// Anomaly-tracking snapshot for a market (§3 "Market Health").
    pub fn get_market_health(&self, market_id: &str) -> Option<crate::registry::MarketHealth> {
        self.registry.get_health(market_id)
    }

    /// §6.2 "get user account".
    pub fn get_account(&self, user_id: &str) -> Option<Account> {
        self.ledger.get_account(user_id)
    }

    /// §6.2 "get user positions".
    pub fn get_positions(&self, user_id: &str) -> Vec<MarketPosition> {
        self.ledger.get_positions(user_id)
    }

    /// §6.3 audit surface: append an opaque event and return its digest.
    pub fn append_audit_event(&self, event_data: &str) -> String {
        self.audit.append_event(event_data)
    }

    /// §6.3 audit surface: the current Merkle root over all entries.
    pub fn audit_merkle_root(&self) -> String {
        self.audit.merkle_root()
    }

    fn publish(&self, message: OutboundMessage) {
        // A lagging/absent subscriber is a no-op per §7 ("the core treats
        // a dropped client as a no-op").
        let _ = self.outbound.send(message);
    }

    /// §4.6 "Accepting an order". Returns the assigned order id on
    /// success, or publishes an `order_rejected` event and returns the
    /// reason on failure.
    pub fn accept_order(
        &self,
        market_id: &str,
        side: Side,
        outcome: Outcome,
        price: u8,
        quantity: i64,
        user_id: Option<String>,
        id: Option<u64>,
    ) -> Result<u64, RejectReason> {
        if !(1..=99).contains(&price) || quantity <= 0 {
            self.reject(market_id, RejectReason::InvalidOrderPayload);
            return Err(RejectReason::InvalidOrderPayload);
        }

        if self.registry.is_settled(market_id) {
            self.reject(market_id, RejectReason::MarketSettled);
            return Err(RejectReason::MarketSettled);
        }
        let book = self.market_manager.get_or_create(market_id);
        if self.registry.is_suspended(market_id) || book.lock().is_suspended() {
            self.reject(market_id, RejectReason::TradingSuspended);
            return Err(RejectReason::TradingSuspended);
        }

        let user_id = user_id.unwrap_or_else(|| self.config.default_user.clone());
        let reserve_amount: MinorUnits = match side {
            Side::Buy => price as MinorUnits * quantity,
            Side::Sell => (100 - price as MinorUnits) * quantity,
        };

        self.ledger.ensure_user(&user_id, self.config.initial_balance);
        if !self.ledger.reserve(&user_id, reserve_amount) {
            self.reject(market_id, RejectReason::InsufficientBalance);
            return Err(RejectReason::InsufficientBalance);
        }

        let order_id = id.unwrap_or_else(|| self.next_order_id.fetch_add(1, Ordering::Relaxed));
        self.open_orders.lock().insert(
            order_id,
            OpenOrder {
                user_id: user_id.clone(),
                market_id: market_id.to_string(),
                side,
                outcome,
                reserved_remaining: reserve_amount,
            },
        );

        self.audit.append_event(&format!(
            "order_accepted:{order_id}:{market_id}:{side}:{outcome}:{price}:{quantity}:{user_id}"
        ));

        Ok(order_id)
    }

    fn reject(&self, market_id: &str, reason: RejectReason) {
        self.publish(OutboundMessage::OrderRejected(OrderRejectedPayload {
            market_id: market_id.to_string(),
            reason,
        }));
    }

    /// Build the `Order` record for a just-accepted order id, for the
    /// fairness buffer. Panics if called for an id `accept_order` did not
    /// return Ok for — a programming error at the call site.
    pub fn build_order(&self, order_id: u64, price: u8, quantity: i64, accept_time: chrono::DateTime<chrono::Utc>) -> Order {
        let open_orders = self.open_orders.lock();
        let open = open_orders.get(&order_id).expect("accept_order must precede build_order");
        Order {
            id: order_id,
            user_id: open.user_id.clone(),
            market_id: open.market_id.clone(),
            side: open.side,
            outcome: open.outcome,
            price,
            quantity,
            accept_time,
        }
    }

    /// Route one fairness-buffer-released order into its market's book
    /// and process the resulting matches (§4.6 "Processing a match").
    pub fn route_to_book(&self, order: Order) {
        let market_id = order.market_id.clone();
        let book = self.market_manager.get_or_create(&market_id);
        let matches = book.lock().process_order(order);
        for m in matches {
            self.process_match(&market_id, &m);
        }
    }

    fn process_match(&self, market_id: &str, m: &Match) {
        self.settle_one_side(m.maker_order_id, m.price, m.quantity);
        self.settle_one_side(m.taker_order_id, m.price, m.quantity);

        self.audit.append_event(&format!(
            "match:{market_id}:{}:{}:{}:{}",
            m.maker_order_id, m.taker_order_id, m.price, m.quantity
        ));

        self.publish(OutboundMessage::MatchOccurred(MatchOccurredPayload {
            market_id: market_id.to_string(),
            maker_order_id: m.maker_order_id,
            taker_order_id: m.taker_order_id,
            price: m.price,
            quantity: m.quantity,
            timestamp: m.timestamp,
        }));
    }

    /// §4.6 step: compute the effective outcome/cost for one side of a
    /// match and apply it to the ledger.
    fn settle_one_side(&self, order_id: u64, execution_price: u8, matched_qty: i64) {
        let mut open_orders = self.open_orders.lock();
        let Some(open) = open_orders.get_mut(&order_id) else {
            return;
        };

        let (effective_outcome, cost) = match open.side {
            Side::Buy => (open.outcome, execution_price as MinorUnits * matched_qty),
            Side::Sell => (
                open.outcome.opposite(),
                (100 - execution_price as MinorUnits) * matched_qty,
            ),
        };
        let cost = cost.min(open.reserved_remaining);
        open.reserved_remaining -= cost;

        let user_id = open.user_id.clone();
        let market_id = open.market_id.clone();
        drop(open_orders);

        self.ledger.move_reserved_to_spent(&user_id, cost);
        self.ledger.add_fill(&user_id, &market_id, effective_outcome, matched_qty, cost);
    }

    /// §6.1 `market_created`: register a new market.
    pub fn create_market(
        &self,
        market_id: &str,
        series_id: &str,
        title: &str,
        tournament: &str,
        teams: Vec<String>,
        start_time: Option<String>,
    ) {
        self.registry.upsert_market(MarketMetadata {
            market_id: market_id.to_string(),
            series_id: series_id.to_string(),
            title: title.to_string(),
            tournament: tournament.to_string(),
            teams,
            start_time,
            status: MarketStatus::Active,
            game_state: None,
        });
        self.market_manager.get_or_create(market_id);
        self.audit.append_event(&format!("market_created:{market_id}:{series_id}"));
    }

    /// §6.1 `series_state`: resolve the series to its market, feed the
    /// telemetry update through the anomaly detector, reflect
    /// suspension on the book, and trigger settlement on a terminal
    /// update. A series with no known market is malformed telemetry and
    /// is logged and dropped (§7).
    pub fn apply_telemetry(&self, series_id: &str, state: GameState) {
        let Some(market_id) = self.registry.market_id_for_series(series_id) else {
            tracing::warn!(series_id, "series_state for unknown series, dropping");
            return;
        };
        let market_id = market_id.as_str();

        let last_action = state.last_action.clone();
        let Some(outcome) = self.registry.apply_telemetry(market_id, state.clone()) else {
            return;
        };

        if let Some(book) = self.market_manager.get(market_id) {
            match outcome {
                TelemetryOutcome::Anomalous => book.lock().set_suspended(true),
                TelemetryOutcome::AutoResumed => book.lock().set_suspended(false),
                _ => {}
            }
        }

        self.publish(OutboundMessage::GameEvent(GameEventPayload {
            series_id: series_id.to_string(),
            market_id: market_id.to_string(),
            game_state: state.clone(),
            last_action,
        }));

        if outcome == TelemetryOutcome::Terminal {
            self.settle_market(market_id, &state);
        }
    }

    /// §6.1 `circuit_breaker`: explicit suspend/resume, independent of
    /// the anomaly detector's automatic resume path.
    pub fn circuit_breaker(&self, market_id: &str, suspend: bool) {
        let status = if suspend { MarketStatus::Suspended } else { MarketStatus::Active };
        if self.registry.set_status_explicit(market_id, status) {
            if let Some(book) = self.market_manager.get(market_id) {
                book.lock().set_suspended(suspend);
            }
            self.audit.append_event(&format!(
                "circuit_breaker:{market_id}:{}",
                if suspend { "suspend" } else { "resume" }
            ));
        }
    }

    /// §4.6 "Settlement": winner is Yes if terrorist_score > ct_score,
    /// else No. Refunds all open reserves in the market, settles the
    /// ledger, and publishes `market_settled`.
    fn settle_market(&self, market_id: &str, final_state: &GameState) {
        let winner = if final_state.terrorist_score > final_state.ct_score {
            Outcome::Yes
        } else {
            Outcome::No
        };

        let mut open_orders = self.open_orders.lock();
        for open in open_orders.values_mut() {
            if open.market_id != market_id || open.reserved_remaining == 0 {
                continue;
            }
            self.ledger.release_reserved(&open.user_id, open.reserved_remaining);
            open.reserved_remaining = 0;
        }
        drop(open_orders);

        let payouts = self.ledger.settle_market(market_id, winner);

        self.audit.append_event(&format!("market_settled:{market_id}:{winner}"));

        self.publish(OutboundMessage::MarketSettled(MarketSettledPayload {
            market_id: market_id.to_string(),
            winner,
            final_score: format!("{}-{}", final_state.terrorist_score, final_state.ct_score),
            settled_at: chrono::Utc::now(),
            payouts,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_orchestrator() -> Orchestrator {
        Orchestrator::new(
            EngineConfig {
                fairness_delay_ms: 0,
                ..EngineConfig::default()
            },
            Arc::new(Ledger::new()),
            Arc::new(MarketManager::new()),
            Arc::new(MarketRegistry::new(3)),
            Arc::new(AuditChain::new()),
        )
    }

    fn game_state(round: i64, t: i64, ct: i64, phase: &str) -> GameState {
        GameState {
            map: "de_dust2".into(),
            round,
            terrorist_score: t,
            ct_score: ct,
            bomb_planted: false,
            phase: phase.into(),
            last_action: String::new(),
        }
    }

    #[test]
    fn rejects_out_of_range_price() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);
        let mut sub = orch.subscribe();
        let result = orch.accept_order("m1", Side::Buy, Outcome::Yes, 0, 5, Some("u1".into()), None);
        assert_eq!(result, Err(RejectReason::InvalidOrderPayload));
        let msg = sub.try_recv().unwrap();
        matches!(msg, OutboundMessage::OrderRejected(_));
    }

    #[test]
    fn rejects_insufficient_balance() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);
        let result = orch.accept_order("m1", Side::Buy, Outcome::Yes, 99, 100_000, Some("poor".into()), None);
        assert_eq!(result, Err(RejectReason::InsufficientBalance));
    }

    #[test]
    fn s1_same_outcome_cross_settles_both_sides() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);

        let a_id = orch
            .accept_order("m1", Side::Sell, Outcome::Yes, 60, 10, Some("A".into()), None)
            .unwrap();
        let a_order = orch.build_order(a_id, 60, 10, chrono::Utc::now());
        orch.route_to_book(a_order);

        let b_id = orch
            .accept_order("m1", Side::Buy, Outcome::Yes, 65, 4, Some("B".into()), None)
            .unwrap();
        let b_order = orch.build_order(b_id, 65, 4, chrono::Utc::now());
        orch.route_to_book(b_order);

        // A sold YES @ 60, effective outcome NO, cost (100-60)*4 = 160.
        let a_positions = orch.ledger.get_positions("A");
        assert_eq!(a_positions[0].no_shares, 4);
        assert_eq!(a_positions[0].no_cost, 160);

        // B bought YES @ 60 (maker price), cost 60*4 = 240.
        let b_positions = orch.ledger.get_positions("B");
        assert_eq!(b_positions[0].yes_shares, 4);
        assert_eq!(b_positions[0].yes_cost, 240);
    }

    #[test]
    fn s2_complementary_cross_uses_taker_price() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);

        let a_id = orch
            .accept_order("m1", Side::Buy, Outcome::Yes, 70, 5, Some("A".into()), None)
            .unwrap();
        orch.route_to_book(orch.build_order(a_id, 70, 5, chrono::Utc::now()));

        let b_id = orch
            .accept_order("m1", Side::Buy, Outcome::No, 35, 5, Some("B".into()), None)
            .unwrap();
        orch.route_to_book(orch.build_order(b_id, 35, 5, chrono::Utc::now()));

        let a_positions = orch.ledger.get_positions("A");
        assert_eq!(a_positions[0].yes_shares, 5);
        assert_eq!(a_positions[0].yes_cost, 350);

        let b_positions = orch.ledger.get_positions("B");
        assert_eq!(b_positions[0].no_shares, 5);
        assert_eq!(b_positions[0].no_cost, 175);
    }

    #[test]
    fn terminal_telemetry_settles_market_and_refunds_open_reserve() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);

        // A rests an unfilled order; its reserve should be refunded on settlement.
        let a_id = orch
            .accept_order("m1", Side::Buy, Outcome::Yes, 50, 10, Some("A".into()), None)
            .unwrap();
        orch.route_to_book(orch.build_order(a_id, 50, 10, chrono::Utc::now()));

        let acc_before = orch.ledger.get_account("A").unwrap();
        assert_eq!(acc_before.reserved, 500);

        orch.apply_telemetry("s1", game_state(1, 1, 0, "live"));
        orch.apply_telemetry("s1", game_state(16, 16, 5, "ended"));

        let acc_after = orch.ledger.get_account("A").unwrap();
        assert_eq!(acc_after.reserved, 0);
        assert_eq!(acc_after.available, acc_before.available + 500);
        assert!(orch.registry.is_settled("m1"));
    }

    #[test]
    fn suspended_market_rejects_new_orders() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec![], None);
        orch.circuit_breaker("m1", true);

        let result = orch.accept_order("m1", Side::Buy, Outcome::Yes, 50, 5, Some("u1".into()), None);
        assert_eq!(result, Err(RejectReason::TradingSuspended));
    }

    #[test]
    fn read_only_surface_reflects_state() {
        let orch = new_orchestrator();
        orch.create_market("m1", "s1", "t", "tour", vec!["A".into(), "B".into()], None);

        assert_eq!(orch.list_markets().len(), 1);
        assert!(orch.get_market("m1").is_ok());
        assert!(matches!(orch.get_market("nope"), Err(RegistryError::MarketNotFound(_))));

        orch.accept_order("m1", Side::Buy, Outcome::Yes, 50, 5, Some("u1".into()), None)
            .unwrap();
        let account = orch.get_account("u1").unwrap();
        assert_eq!(account.reserved, 250);
        assert!(orch.get_positions("u1").is_empty());
    }

    #[test]
    fn audit_surface_is_exposed_through_the_orchestrator() {
        let orch = new_orchestrator();
        let digest = orch.append_audit_event("hello");
        assert_eq!(orch.audit_merkle_root(), digest);
    }
}
