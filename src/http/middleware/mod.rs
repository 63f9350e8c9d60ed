//! Request middleware.

pub mod inspector_guard;

pub use inspector_guard::{is_loopback_host, localhost_only};
