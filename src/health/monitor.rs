//! Backend liveness monitor.
//!
//! # Responsibilities
//! - Periodically dial the configured backend
//! - Write Active/Inactive into the shared health field
//! - Stop once a newer configuration supersedes it

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::health::state::HealthStatus;
use crate::net::probe_tcp;
use crate::observability::metrics;
use crate::state::SharedState;

pub struct LivenessMonitor {
    state: Arc<SharedState>,
    host: String,
    port: u16,
    interval: Duration,
    probe_timeout: Duration,
    generation: u64,
}

impl LivenessMonitor {
    /// Start monitoring `host:port`, replacing whatever monitor ran before.
    /// Returns the new generation.
    pub fn spawn(
        state: Arc<SharedState>,
        host: &str,
        port: u16,
        interval: Duration,
        probe_timeout: Duration,
    ) -> u64 {
        let generation = state.health.begin_generation();
        let monitor = Self {
            state: state.clone(),
            host: host.to_string(),
            port,
            interval,
            probe_timeout,
            generation,
        };

        let task = tokio::spawn(monitor.run());
        state.health.attach_monitor(generation, task);
        generation
    }

    pub async fn run(self) {
        tracing::info!(
            port = self.port,
            interval = ?self.interval,
            generation = self.generation,
            "Liveness monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let status = match probe_tcp(&self.host, self.port, self.probe_timeout).await {
                Ok(()) => HealthStatus::Active,
                Err(e) => {
                    tracing::debug!(port = self.port, error = %e, "Liveness probe failed");
                    HealthStatus::Inactive
                }
            };

            if !self.state.health.record(self.generation, status) {
                tracing::debug!(generation = self.generation, "Liveness monitor superseded");
                break;
            }
            metrics::record_backend_health(self.port, status == HealthStatus::Active);
        }
    }
}
