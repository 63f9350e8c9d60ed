//! API interceptor library.

// Core subsystems
pub mod capture;
pub mod config;
pub mod http;
pub mod net;
pub mod proxy;
pub mod state;

// Background work
pub mod health;
pub mod tunnel;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::InterceptorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use state::SharedState;
