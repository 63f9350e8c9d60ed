//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → loader.rs (optional TOML file, API_INTERCEPTOR_PORT, -p flag)
//!     → validation.rs (semantic checks)
//!     → InterceptorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend target is runtime state,
//!   not configuration, and changes through `POST /configure`
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CaptureConfig, HealthConfig, InterceptorConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ObserverConfig, OverflowPolicy, TimeoutConfig, TunnelConfig, UiConfig,
};
