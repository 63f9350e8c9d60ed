//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! POST /configure
//!     → configurator.rs (validate port, dial backend)
//!     → ProxyConfiguration installed into shared state
//!
//! any other path
//!     → forward.rs (rewrite URI/headers)
//!     → capture transport → backend
//! ```

pub mod configurator;
pub mod forward;

pub use configurator::{parse_port, ConfigureError, ProxyConfiguration, ProxyConfigurator, BACKEND_HOST};
pub use forward::ReverseProxy;
