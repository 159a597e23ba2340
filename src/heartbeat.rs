//! Heartbeat worker (§5 "Scheduling model").
//!
//! A single periodic task drains the fairness buffer and routes each
//! ready order into its market's book through the orchestrator. Grounded
//! on `original_source/backend/cmd/server/main.go`'s `processBuffer`
//! ticker loop, reexpressed with `tokio::time::interval` the way the
//! teacher structures its background `tokio::spawn` workers in `main.rs`.

use crate::fairness::FairnessBuffer;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;

/// Runs until the process exits; intended to be spawned once as a
/// background `tokio` task.
pub async fn run(buffer: Arc<FairnessBuffer>, orchestrator: Arc<Orchestrator>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        for order in buffer.drain_ready() {
            orchestrator.route_to_book(order);
        }
    }
}
