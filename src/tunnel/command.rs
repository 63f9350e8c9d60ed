//! One-shot invocations of the tunnel tool.
//!
//! # Responsibilities
//! - Locate the binary on the search path
//! - Reserve a share token and parse the announced endpoint
//! - Release a reserved token
//! - Build argument lists for share sessions

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use crate::tunnel::TunnelError;

// Patterns are compile-time literals, so construction cannot fail.
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"your reserved share token is '([^']+)'").expect("valid regex")
});

static ENDPOINT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reserved frontend endpoint: (https://[^\s]+)").expect("valid regex")
});

/// Result of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub token: String,
    pub frontend_url: String,
}

pub fn locate(binary: &str) -> Result<PathBuf, TunnelError> {
    which::which(binary).map_err(TunnelError::ToolMissing)
}

/// Extract token and endpoint from reservation output. Both must be present.
pub fn parse_reservation(output: &str) -> Result<Reservation, TunnelError> {
    let token = TOKEN_PATTERN
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let frontend_url = ENDPOINT_PATTERN
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    match (token, frontend_url) {
        (Some(token), Some(frontend_url)) => Ok(Reservation {
            token,
            frontend_url,
        }),
        _ => Err(TunnelError::ParseError),
    }
}

/// Reserve a public share token for `port`.
pub async fn reserve_token(binary: &str, port: u16) -> Result<Reservation, TunnelError> {
    let path = locate(binary)?;
    let port = port.to_string();
    let output = run(path, &["reserve", "public", "--backend-mode", "proxy", &port]).await?;

    let combined = combined_output(&output);
    if !output.status.success() {
        return Err(TunnelError::CommandFailed { output: combined });
    }
    parse_reservation(&combined)
}

/// Release `token`. An empty token is a no-op.
pub async fn release_token(binary: &str, token: &str) -> Result<(), TunnelError> {
    if token.is_empty() {
        return Ok(());
    }
    let path = locate(binary)?;
    let output = run(path, &["release", token]).await?;

    if !output.status.success() {
        return Err(TunnelError::CommandFailed {
            output: combined_output(&output),
        });
    }
    Ok(())
}

/// Arguments for a share session: reserved when a token is given, ad-hoc otherwise.
pub fn share_args(port: u16, token: Option<&str>) -> Vec<String> {
    match token {
        Some(token) => vec!["share".into(), "reserved".into(), token.into()],
        None => vec![
            "share".into(),
            "public".into(),
            "--backend-mode".into(),
            "proxy".into(),
            port.to_string(),
        ],
    }
}

async fn run(path: PathBuf, args: &[&str]) -> Result<Output, TunnelError> {
    tracing::debug!(binary = %path.display(), ?args, "Running tunnel tool");
    Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(TunnelError::ProcessSpawn)
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_endpoint() {
        let output = "[   0.412]  INFO your reserved share token is 'x7k2m9q'\n\
                      [   0.413]  INFO reserved frontend endpoint: https://x7k2m9q.share.zrok.io\n";
        let reservation = parse_reservation(output).unwrap();
        assert_eq!(reservation.token, "x7k2m9q");
        assert_eq!(reservation.frontend_url, "https://x7k2m9q.share.zrok.io");
    }

    #[test]
    fn missing_either_line_is_a_parse_error() {
        let token_only = "your reserved share token is 'x7k2m9q'";
        let endpoint_only = "reserved frontend endpoint: https://x7k2m9q.share.zrok.io";

        assert!(matches!(parse_reservation(token_only), Err(TunnelError::ParseError)));
        assert!(matches!(parse_reservation(endpoint_only), Err(TunnelError::ParseError)));
        assert!(matches!(parse_reservation(""), Err(TunnelError::ParseError)));
    }

    #[test]
    fn share_arguments() {
        assert_eq!(
            share_args(4040, None),
            ["share", "public", "--backend-mode", "proxy", "4040"]
        );
        assert_eq!(share_args(4040, Some("abc")), ["share", "reserved", "abc"]);
    }

    #[tokio::test]
    async fn releasing_empty_token_skips_the_tool() {
        release_token("definitely-not-a-real-tunnel-binary", "")
            .await
            .unwrap();
    }

    #[test]
    fn missing_binary_is_distinguishable() {
        assert!(matches!(
            locate("definitely-not-a-real-tunnel-binary"),
            Err(TunnelError::ToolMissing(_))
        ));
    }
}
