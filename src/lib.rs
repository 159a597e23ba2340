//! Matching and settlement core for a binary-outcome prediction market
//! driven by live game-state telemetry.
//!
//! This crate implements the five cooperating components described in
//! the design: the fairness buffer, per-market order book, ledger,
//! market registry with anomaly detection, and audit chain, wired
//! together by [`orchestrator::Orchestrator`]. Transport (HTTP/WS),
//! persistence, and authentication are external collaborators,
//! specified only by the messages in [`messages`].

pub mod audit;
pub mod config;
pub mod errors;
pub mod fairness;
pub mod heartbeat;
pub mod ledger;
pub mod market_manager;
pub mod messages;
pub mod orchestrator;
pub mod orderbook;
pub mod registry;
pub mod types;

use std::sync::Arc;

use audit::AuditChain;
use config::EngineConfig;
use fairness::FairnessBuffer;
use ledger::Ledger;
use market_manager::MarketManager;
use orchestrator::Orchestrator;
use registry::MarketRegistry;

/// Aggregates the core's components behind the handles their callers
/// need: the orchestrator for mutating operations, the fairness buffer
/// for the heartbeat to drain. Mirrors the teacher's `AppState` pattern,
/// minus everything that belongs to transport/persistence.
pub struct Engine {
    pub config: EngineConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub fairness_buffer: Arc<FairnessBuffer>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let ledger = Arc::new(Ledger::new());
        let market_manager = Arc::new(MarketManager::new());
        let registry = Arc::new(MarketRegistry::new(config.healthy_streak_for_resume));
        let audit = Arc::new(AuditChain::new());
        let fairness_buffer = Arc::new(FairnessBuffer::new(config.fairness_delay()));

        let orchestrator = Arc::new(Orchestrator::new(config.clone(), ledger, market_manager, registry, audit));

        Self {
            config,
            orchestrator,
            fairness_buffer,
        }
    }

    /// Spawn the heartbeat worker that drains the fairness buffer into
    /// each market's book. Returns the `tokio` task handle.
    pub fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let buffer = self.fairness_buffer.clone();
        let orchestrator = self.orchestrator.clone();
        let tick = self.config.heartbeat_tick();
        tokio::spawn(heartbeat::run(buffer, orchestrator, tick))
    }
}
