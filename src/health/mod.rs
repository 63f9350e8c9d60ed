//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Liveness monitor (monitor.rs):
//!     Periodic timer
//!     → TCP dial to the configured backend
//!     → Update state.rs
//!
//! State (state.rs):
//!     NotConfigured → Active ←→ Inactive
//!     One generation per configuration
//! ```
//!
//! # Design Decisions
//! - Probes are connect-only; no request reaches the backend's handlers
//! - A reconfiguration supersedes the running monitor instead of stacking a second one

pub mod monitor;
pub mod state;

pub use monitor::LivenessMonitor;
pub use state::{HealthCell, HealthStatus};
