//! Network primitives.
//!
//! # Responsibilities
//! - Connect-only reachability probes against the backend
//! - Observer connection lifecycle and membership

pub mod connection;
pub mod probe;

pub use connection::{FrameSink, ObserverConnection, ObserverId, ObserverPhase, ObserverRegistry};
pub use probe::probe_tcp;
