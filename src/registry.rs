//! Market registry and anomaly detector (§4.5).
//!
//! `MarketMetadata`/`MarketGameState` are grounded on
//! `original_source/backend/internal/engine/market_registry.go`'s
//! `MarketRegistry` (an `RwLock`-guarded map, here `parking_lot::RwLock`
//! per §5's single-mutex-per-component discipline). The anomaly predicate
//! and automatic-resume state machine have no counterpart in the Go
//! source; they are carried over from the round_delta/score_delta rule
//! and implemented directly against the spec's per-market "Market Health"
//! record, using the same map-of-struct shape as the rest of this module.

use crate::types::MarketId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Active,
    Suspended,
    Settled,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketStatus::Active => "active",
            MarketStatus::Suspended => "suspended",
            MarketStatus::Settled => "settled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MarketStatus::Active),
            "suspended" => Ok(MarketStatus::Suspended),
            "settled" => Ok(MarketStatus::Settled),
            other => Err(format!("unknown market status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    pub map: String,
    pub round: i64,
    pub terrorist_score: i64,
    pub ct_score: i64,
    pub bomb_planted: bool,
    pub phase: String,
    pub last_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub market_id: MarketId,
    pub series_id: String,
    pub title: String,
    pub tournament: String,
    pub teams: Vec<String>,
    pub start_time: Option<String>,
    pub status: MarketStatus,
    pub game_state: Option<GameState>,
}

/// Why a market was last suspended, tracked so automatic resume can tell
/// an anomaly-induced suspension apart from an explicit circuit-breaker
/// suspend (only the former auto-resumes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuspendReason {
    ScoreAnomaly,
    CircuitBreaker,
}

/// Per-market anomaly-tracking state, kept alongside but separate from
/// `MarketMetadata` (the spec's "Market Health" entity).
#[derive(Default)]
struct Health {
    last_state: Option<GameState>,
    consecutive_healthy: u32,
    suspend_reason: Option<SuspendReason>,
}

struct Inner {
    markets: HashMap<MarketId, MarketMetadata>,
    health: HashMap<MarketId, Health>,
}

/// Public snapshot of a market's anomaly-tracking state (§3 "Market
/// Health"), distinct from `MarketMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHealth {
    pub market_id: MarketId,
    pub last_game_state: Option<GameState>,
    pub consecutive_healthy_updates: u32,
    pub suspended_for_anomaly: bool,
}

/// Outcome of feeding a telemetry update through the anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryOutcome {
    /// Update accepted, market remains (or becomes) active.
    Healthy,
    /// Update accepted but judged anomalous; market is now suspended.
    Anomalous,
    /// Update accepted and brought the market back from an
    /// anomaly-induced suspension.
    AutoResumed,
    /// `phase = "ended"`: this is the settlement trigger.
    Terminal,
}

pub struct MarketRegistry {
    inner: RwLock<Inner>,
    healthy_streak_for_resume: u32,
}

impl MarketRegistry {
    pub fn new(healthy_streak_for_resume: u32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                markets: HashMap::new(),
                health: HashMap::new(),
            }),
            healthy_streak_for_resume,
        }
    }

    pub fn upsert_market(&self, meta: MarketMetadata) {
        let mut inner = self.inner.write();
        inner.health.entry(meta.market_id.clone()).or_default();
        inner.markets.insert(meta.market_id.clone(), meta);
    }

    pub fn get_market(&self, market_id: &str) -> Option<MarketMetadata> {
        self.inner.read().markets.get(market_id).cloned()
    }

    pub fn list_markets(&self) -> Vec<MarketMetadata> {
        self.inner.read().markets.values().cloned().collect()
    }

    /// Resolve a `series_id` to its market. `series_state` telemetry
    /// (§6.1) addresses a series rather than a market directly; this
    /// assumes the common case of one active market per series.
    pub fn market_id_for_series(&self, series_id: &str) -> Option<MarketId> {
        self.inner
            .read()
            .markets
            .values()
            .find(|m| m.series_id == series_id)
            .map(|m| m.market_id.clone())
    }

    /// Snapshot of a market's anomaly-tracking state, for diagnostics and
    /// the read-only query surface.
    pub fn get_health(&self, market_id: &str) -> Option<MarketHealth> {
        let inner = self.inner.read();
        let health = inner.health.get(market_id)?;
        Some(MarketHealth {
            market_id: market_id.to_string(),
            last_game_state: health.last_state.clone(),
            consecutive_healthy_updates: health.consecutive_healthy,
            suspended_for_anomaly: health.suspend_reason == Some(SuspendReason::ScoreAnomaly),
        })
    }

    pub fn is_settled(&self, market_id: &str) -> bool {
        matches!(
            self.inner.read().markets.get(market_id).map(|m| m.status),
            Some(MarketStatus::Settled)
        )
    }

    pub fn is_suspended(&self, market_id: &str) -> bool {
        matches!(
            self.inner.read().markets.get(market_id).map(|m| m.status),
            Some(MarketStatus::Suspended)
        )
    }

    /// Explicit circuit-breaker suspend or resume (§6.1 `circuit_breaker`).
    /// A circuit-breaker suspension does not auto-resume on healthy
    /// telemetry; only explicit resume or the anomaly detector's own
    /// resume path clears it.
    pub fn set_status_explicit(&self, market_id: &str, status: MarketStatus) -> bool {
        let mut inner = self.inner.write();
        let Some(meta) = inner.markets.get_mut(market_id) else {
            return false;
        };
        if meta.status == MarketStatus::Settled {
            return false;
        }
        meta.status = status;
        if status == MarketStatus::Suspended {
            if let Some(health) = inner.health.get_mut(market_id) {
                health.suspend_reason = Some(SuspendReason::CircuitBreaker);
                health.consecutive_healthy = 0;
            }
        } else if status == MarketStatus::Active {
            if let Some(health) = inner.health.get_mut(market_id) {
                health.suspend_reason = None;
            }
        }
        true
    }

    /// Feed one telemetry update through the anomaly detector (§4.5) and
    /// apply any resulting status transition. Returns `None` if
    /// `market_id` is unknown.
    pub fn apply_telemetry(&self, market_id: &str, state: GameState) -> Option<TelemetryOutcome> {
        let terminal = state.phase == "ended";
        let mut inner = self.inner.write();

        if !inner.markets.contains_key(market_id) {
            return None;
        }

        if terminal {
            if let Some(meta) = inner.markets.get_mut(market_id) {
                meta.game_state = Some(state);
                meta.status = MarketStatus::Settled;
            }
            return Some(TelemetryOutcome::Terminal);
        }

        if inner.markets.get(market_id).map(|m| m.status) == Some(MarketStatus::Settled) {
            // Settled is terminal; ignore further telemetry.
            return Some(TelemetryOutcome::Terminal);
        }

        let health = inner.health.entry(market_id.to_string()).or_default();
        let anomalous = match &health.last_state {
            None => false,
            Some(prev) => is_anomalous(prev, &state),
        };

        let outcome = if anomalous {
            health.consecutive_healthy = 0;
            health.suspend_reason = Some(SuspendReason::ScoreAnomaly);
            TelemetryOutcome::Anomalous
        } else {
            health.consecutive_healthy += 1;
            let was_score_suspended = health.suspend_reason == Some(SuspendReason::ScoreAnomaly);
            if was_score_suspended && health.consecutive_healthy >= self.healthy_streak_for_resume {
                health.suspend_reason = None;
                health.consecutive_healthy = 0;
                TelemetryOutcome::AutoResumed
            } else {
                TelemetryOutcome::Healthy
            }
        };
        health.last_state = Some(state.clone());

        if let Some(meta) = inner.markets.get_mut(market_id) {
            meta.game_state = Some(state);
            match outcome {
                TelemetryOutcome::Anomalous => meta.status = MarketStatus::Suspended,
                TelemetryOutcome::AutoResumed => meta.status = MarketStatus::Active,
                _ => {}
            }
        }

        Some(outcome)
    }
}

/// §4.5 anomaly predicate.
fn is_anomalous(prev: &GameState, next: &GameState) -> bool {
    let round_delta = next.round - prev.round;
    let t_delta = (next.terrorist_score - prev.terrorist_score).abs();
    let ct_delta = (next.ct_score - prev.ct_score).abs();
    let score_delta = t_delta + ct_delta;

    round_delta < 0 || (round_delta == 0 && score_delta > 0) || (round_delta > 0 && score_delta > round_delta)
}
