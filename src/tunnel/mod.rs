//! Public tunnel subsystem.
//!
//! # Data Flow
//! ```text
//! POST /configure (tunnel mode)
//!     → command.rs (reserve token, optional)
//!     → supervisor.rs (kill previous process, spawn share)
//!         → stdout/stderr forwarders → URL scanner → TunnelStatus
//!         → exit watcher → ProcessState::Exited
//!
//! SIGINT/SIGTERM
//!     → supervisor.rs shutdown (kill process, release owned token)
//! ```
//!
//! # Design Decisions
//! - The tunnel tool is a black box driven through its text output
//! - Every failure lands in `TunnelStatus`; nothing here fails a request
//! - Tokens the operator typed in are never released by the interceptor

pub mod command;
pub mod session;
pub mod supervisor;

use std::io;

use thiserror::Error;

pub use session::{ProcessHandle, ProcessState, TunnelCell, TunnelStatus};
pub use supervisor::TunnelSupervisor;

/// Errors from driving the tunnel tool.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel tool not found: {0}")]
    ToolMissing(#[source] which::Error),

    #[error("failed to parse reservation output")]
    ParseError,

    #[error("failed to start tunnel tool: {0}")]
    ProcessSpawn(#[source] io::Error),

    #[error("tunnel tool failed: {output}")]
    CommandFailed { output: String },

    #[error("invalid share domain pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Who obtained a reserved token, and therefore who must release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    /// Reserved by the interceptor; released when superseded or on shutdown.
    Reserved,
    /// Supplied by the operator; never released here.
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedToken {
    pub token: String,
    /// Port the token was reserved against.
    pub port: u16,
    pub origin: TokenOrigin,
}

impl ReservedToken {
    pub fn is_owned(&self) -> bool {
        self.origin == TokenOrigin::Reserved
    }
}

/// Tunnel mode chosen at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TunnelMode {
    /// Ad-hoc share with a fresh URL each session.
    #[default]
    Public,
    /// Reserve (or reuse) a token for the listen port.
    Reserved,
    /// Operator-supplied token and the port it was reserved for.
    Custom { token: String, port: u16 },
}

impl TunnelMode {
    /// Interpret the `zrok_option`, `zrok_token` and `zrok_port` form fields.
    pub fn from_form(
        option: Option<&str>,
        token: Option<&str>,
        port: Option<&str>,
    ) -> Result<Self, String> {
        match option.map(str::trim).unwrap_or_default() {
            "" | "public" => Ok(TunnelMode::Public),
            "reserved" => Ok(TunnelMode::Reserved),
            "custom" => {
                let token = token.map(str::trim).unwrap_or_default();
                if token.is_empty() {
                    return Err("Zrok token is required for a custom tunnel".to_string());
                }
                let port = port
                    .map(str::trim)
                    .and_then(|p| p.parse::<u16>().ok())
                    .filter(|p| *p != 0)
                    .ok_or_else(|| "Invalid zrok port".to_string())?;
                Ok(TunnelMode::Custom {
                    token: token.to_string(),
                    port,
                })
            }
            other => Err(format!("Unknown zrok option: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_modes() {
        assert_eq!(TunnelMode::from_form(None, None, None), Ok(TunnelMode::Public));
        assert_eq!(
            TunnelMode::from_form(Some("reserved"), None, None),
            Ok(TunnelMode::Reserved)
        );
        assert_eq!(
            TunnelMode::from_form(Some("custom"), Some("abc123"), Some("4040")),
            Ok(TunnelMode::Custom {
                token: "abc123".to_string(),
                port: 4040
            })
        );
    }

    #[test]
    fn custom_mode_needs_token_and_port() {
        assert!(TunnelMode::from_form(Some("custom"), Some(""), Some("4040")).is_err());
        assert!(TunnelMode::from_form(Some("custom"), Some("abc"), Some("nope")).is_err());
        assert!(TunnelMode::from_form(Some("sideways"), None, None).is_err());
    }

    #[test]
    fn only_reserved_tokens_are_owned() {
        let mut token = ReservedToken {
            token: "t".to_string(),
            port: 4040,
            origin: TokenOrigin::Reserved,
        };
        assert!(token.is_owned());
        token.origin = TokenOrigin::Operator;
        assert!(!token.is_owned());
    }
}
