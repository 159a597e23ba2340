//! Structured error types at each component boundary.
//!
//! Mirrors the teacher's per-service `thiserror` enums (`MatchingError`,
//! `SettlementError`, `OracleError`): every rejection the core can produce
//! has a machine-readable variant, never a bare string.

use crate::types::MarketId;
use serde::{Deserialize, Serialize};

/// Reasons an order may be rejected before it ever reaches a book.
///
/// Matches the `order_rejected.reason` enum of the wire protocol (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidOrderPayload,
    TradingSuspended,
    MarketSettled,
    InsufficientBalance,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::InvalidOrderPayload => "invalid_order_payload",
            RejectReason::TradingSuspended => "trading_suspended",
            RejectReason::MarketSettled => "market_settled",
            RejectReason::InsufficientBalance => "insufficient_balance",
        };
        write!(f, "{s}")
    }
}

/// Errors surfaced by the market registry / lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("market not found: {0}")]
    MarketNotFound(MarketId),

    #[error("market {0} already settled")]
    AlreadySettled(MarketId),
}

/// Errors surfaced by order acceptance; distinct from `RejectReason` in that
/// these indicate the orchestrator itself is misused (unreachable in normal
/// operation), not a client-facing rejection.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown order id: {0}")]
    UnknownOrder(u64),

    #[error("market not found: {0}")]
    MarketNotFound(MarketId),
}
