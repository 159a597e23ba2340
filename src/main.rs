//! Local smoke-testing entry point.
//!
//! Reads newline-delimited [`messages::InboundMessage`] JSON from stdin,
//! feeds each into the engine, and logs whatever the engine emits on its
//! outbound broadcast channel. A real deployment wires the same
//! `Engine`/`Orchestrator` handles to a transport front end (HTTP/WS)
//! that is outside this crate's scope; this binary exists so the core
//! can be exercised without one, the way the teacher's `main.rs` wires
//! its services before handing them to `axum`.

use fairlines_core::config::EngineConfig;
use fairlines_core::messages::InboundMessage;
use fairlines_core::Engine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fairlines_core=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env();
    tracing::info!(?config, "starting matching core");

    let engine = Engine::new(config);
    engine.spawn_heartbeat();

    let mut outbound = engine.orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = outbound.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => tracing::info!(%json, "outbound event"),
                Err(err) => tracing::error!(%err, "failed to serialize outbound event"),
            }
        }
    });

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundMessage>(&line) {
            Ok(message) => handle_inbound(&engine, message),
            Err(err) => tracing::warn!(%err, raw = %line, "dropping malformed inbound message"),
        }
    }

    Ok(())
}

fn handle_inbound(engine: &Engine, message: InboundMessage) {
    match message {
        InboundMessage::PlaceOrder(payload) => {
            let result = engine.orchestrator.accept_order(
                &payload.market_id,
                payload.side,
                payload.outcome,
                payload.price,
                payload.quantity,
                payload.user_id,
                payload.id,
            );
            if let Ok(order_id) = result {
                let order = engine
                    .orchestrator
                    .build_order(order_id, payload.price, payload.quantity, chrono::Utc::now());
                engine.fairness_buffer.add(order);
            }
        }
        InboundMessage::MarketCreated(payload) => {
            engine.orchestrator.create_market(
                &payload.market_id,
                &payload.series_id,
                &payload.title,
                &payload.tournament,
                payload.teams,
                payload.start_time,
            );
        }
        InboundMessage::SeriesState(payload) => {
            engine.orchestrator.apply_telemetry(&payload.series_id, payload.game_state);
        }
        InboundMessage::CircuitBreaker(payload) => {
            let suspend = matches!(payload.action, fairlines_core::messages::CircuitBreakerAction::Suspend);
            engine.orchestrator.circuit_breaker(&payload.market_id, suspend);
        }
    }
}
