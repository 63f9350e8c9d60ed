//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config loaded → Metrics → Bind → Build server → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Tunnel shutdown → Trigger graceful shutdown
//!     second signal  → Immediate exit
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Close observers → Stop tunnel → Exit
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
