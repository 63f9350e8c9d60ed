//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, limits)
//!     → /configure, /status        → handlers.rs
//!     → /ws                        → websocket.rs (observer gateway)
//!     → /inspector/*, /static/*    → middleware/ (localhost guard) → asset files
//!     → anything else              → handlers.rs proxy → backend
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;
pub mod websocket;

pub use handlers::StatusResponse;
pub use server::{AppState, HttpServer};
