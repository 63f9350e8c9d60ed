//! Traffic capture subsystem.
//!
//! # Data Flow
//! ```text
//! proxied request
//!     → transport.rs (snapshot request, call backend, snapshot response)
//!     → exchange.rs (CapturedExchange, correlated by UUID)
//!     → queue.rs (bounded, drop-oldest or blocking)
//!     → broadcast.rs (single consumer, sequential fan-out)
//!     → observer websockets
//! ```
//!
//! # Design Decisions
//! - Captures are not persisted; once fanned out they are gone
//! - Late observers only see captures dequeued after they connect

pub mod broadcast;
pub mod exchange;
pub mod queue;
pub mod transport;

pub use broadcast::CaptureBroadcaster;
pub use exchange::{CapturedExchange, RequestRecord, ResponseRecord};
pub use queue::{capture_queue, CaptureQueue, CaptureStream};
pub use transport::{CaptureError, CaptureTransport};
