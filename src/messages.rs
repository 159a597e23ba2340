//! Wire message protocol (§6.1).
//!
//! Tagged JSON envelopes, `{"type": ..., "payload": ...}`, mirroring the
//! teacher's websocket channel message enums. Inbound and outbound
//! messages are modeled as separate enums since the core never echoes an
//! inbound variant back out unchanged.

use crate::ledger::SettlementResult;
use crate::registry::GameState;
use crate::types::{MarketId, Outcome, Side, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderPayload {
    pub market_id: MarketId,
    pub side: Side,
    pub outcome: Outcome,
    pub price: u8,
    pub quantity: i64,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCreatedPayload {
    pub series_id: String,
    pub market_id: MarketId,
    pub title: String,
    pub tournament: String,
    pub teams: Vec<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesStatePayload {
    pub series_id: String,
    pub timestamp: String,
    pub game_state: GameState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerAction {
    Suspend,
    Resume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerPayload {
    pub series_id: String,
    pub market_id: MarketId,
    pub reason: String,
    pub action: CircuitBreakerAction,
}

/// Messages the core accepts from upstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    PlaceOrder(PlaceOrderPayload),
    MarketCreated(MarketCreatedPayload),
    SeriesState(SeriesStatePayload),
    CircuitBreaker(CircuitBreakerPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedPayload {
    pub market_id: MarketId,
    pub reason: crate::errors::RejectReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOccurredPayload {
    pub market_id: MarketId,
    pub maker_order_id: u64,
    pub taker_order_id: u64,
    pub price: u8,
    pub quantity: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettledPayload {
    pub market_id: MarketId,
    pub winner: Outcome,
    /// Formatted "T-CT", e.g. "16-12".
    pub final_score: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub settled_at: chrono::DateTime<chrono::Utc>,
    pub payouts: Vec<SettlementResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEventPayload {
    pub series_id: String,
    pub market_id: MarketId,
    pub game_state: GameState,
    pub last_action: String,
}

/// Messages the core emits to the external broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    OrderRejected(OrderRejectedPayload),
    MatchOccurred(MatchOccurredPayload),
    MarketSettled(MarketSettledPayload),
    GameEvent(GameEventPayload),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_order_round_trips_through_json() {
        let raw = r#"{"type":"place_order","payload":{"market_id":"m1","side":"BUY","outcome":"YES","price":60,"quantity":4}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        match msg {
            InboundMessage::PlaceOrder(p) => {
                assert_eq!(p.market_id, "m1");
                assert_eq!(p.price, 60);
                assert!(p.user_id.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn order_rejected_serializes_with_snake_case_reason() {
        let msg = OutboundMessage::OrderRejected(OrderRejectedPayload {
            market_id: "m1".into(),
            reason: crate::errors::RejectReason::InsufficientBalance,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"order_rejected\""));
        assert!(json.contains("\"reason\":\"insufficient_balance\""));
    }
}
