//! Backend health state.
//!
//! # States
//! - NotConfigured: no backend installed yet
//! - Active: last probe connected
//! - Inactive: last probe failed
//!
//! # Design Decisions
//! - Each configuration starts a new monitor generation; writes from an older
//!   generation are rejected, so a stale monitor can never overwrite the
//!   status of the current backend
//! - The running monitor task lives next to the status it writes and is
//!   aborted when its generation is superseded

use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use serde::Serialize;

/// Backend liveness as reported by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    #[serde(rename = "Not configured")]
    NotConfigured,
    Active,
    Inactive,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::NotConfigured => "Not configured",
            HealthStatus::Active => "Active",
            HealthStatus::Inactive => "Inactive",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct HealthSlot {
    generation: u64,
    status: HealthStatus,
    monitor: Option<JoinHandle<()>>,
}

/// Health field group of the shared state.
pub struct HealthCell {
    inner: Mutex<HealthSlot>,
}

impl HealthCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HealthSlot {
                generation: 0,
                status: HealthStatus::NotConfigured,
                monitor: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthSlot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> HealthStatus {
        self.lock().status
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a new generation for a freshly probed backend.
    ///
    /// Aborts the previous monitor and marks the backend `Active`, since the
    /// configure probe just connected.
    pub fn begin_generation(&self) -> u64 {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.status = HealthStatus::Active;
        if let Some(old) = slot.monitor.take() {
            old.abort();
        }
        slot.generation
    }

    /// Hand the monitor task for `generation` to the cell. A task for a
    /// generation that is already stale is aborted.
    pub fn attach_monitor(&self, generation: u64, task: JoinHandle<()>) {
        let mut slot = self.lock();
        if slot.generation == generation {
            if let Some(old) = slot.monitor.replace(task) {
                old.abort();
            }
        } else {
            task.abort();
        }
    }

    /// Record a probe result. Returns `false` when `generation` has been
    /// superseded and the caller should stop.
    pub fn record(&self, generation: u64, status: HealthStatus) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        if slot.status != status {
            tracing::info!(generation, status = %status, "Backend status changed");
        }
        slot.status = status;
        true
    }

    /// Abort the running monitor, if any.
    pub fn stop(&self) {
        if let Some(task) = self.lock().monitor.take() {
            task.abort();
        }
    }
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}
