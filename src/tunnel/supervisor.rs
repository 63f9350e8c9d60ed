//! Tunnel process supervisor.
//!
//! # Responsibilities
//! - Replace the running share process on every (re)configuration
//! - Scrape the public URL out of the process output
//! - Enforce the URL deadline
//! - Kill the process and release owned tokens on shutdown
//!
//! # Design Decisions
//! - The previous process is killed and reaped before the next one spawns,
//!   so one supervisor never runs two share processes at once
//! - A timed-out process is left running; its URL may still show up in the logs
//! - Output forwarders keep draining after the URL is found so the tool never
//!   blocks on a full pipe

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::config::TunnelConfig;
use crate::observability::metrics;
use crate::state::SharedState;
use crate::tunnel::command::{self, Reservation};
use crate::tunnel::session::{ProcessHandle, ProcessState, TunnelStatus};
use crate::tunnel::{ReservedToken, TokenOrigin, TunnelError};

/// Grace period for the share process to die during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long shutdown waits for an in-flight reconfiguration to finish.
const RECONFIGURE_WAIT: Duration = Duration::from_secs(15);

/// Buffered output lines between the forwarders and the URL scanner.
const LINE_BUFFER: usize = 64;

pub struct TunnelSupervisor {
    config: TunnelConfig,
    url_pattern: Regex,
    state: Arc<SharedState>,
    shut_down: AtomicBool,
}

impl TunnelSupervisor {
    pub fn new(config: TunnelConfig, state: Arc<SharedState>) -> Result<Self, TunnelError> {
        let url_pattern = Regex::new(&format!(
            r"https://[a-zA-Z0-9\-]+\.share\.{}",
            regex::escape(&config.share_domain)
        ))?;
        Ok(Self {
            config,
            url_pattern,
            state,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Reserve a token for `port` through the tunnel tool.
    pub async fn reserve(&self, port: u16) -> Result<(ReservedToken, String), TunnelError> {
        let Reservation {
            token,
            frontend_url,
        } = command::reserve_token(&self.config.binary, port).await?;
        tracing::info!(token = %token, endpoint = %frontend_url, "Reserved tunnel token");
        Ok((
            ReservedToken {
                token,
                port,
                origin: TokenOrigin::Reserved,
            },
            frontend_url,
        ))
    }

    /// Release `token` if the interceptor reserved it.
    pub async fn release(&self, token: &ReservedToken) {
        if !token.is_owned() {
            return;
        }
        match command::release_token(&self.config.binary, &token.token).await {
            Ok(()) => tracing::info!(token = %token.token, "Released tunnel token"),
            Err(e) => tracing::warn!(token = %token.token, error = %e, "Failed to release tunnel token"),
        }
    }

    /// Start a share session for `port`, replacing any running one.
    ///
    /// Returns once the process is spawned; URL discovery continues in the
    /// background and lands in the shared tunnel status.
    pub async fn start_session(&self, port: u16, token: Option<&ReservedToken>) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let (session, previous) = self.state.tunnel.begin_session();
        if let ProcessState::Running(handle) = previous {
            tracing::info!(pid = ?handle.pid(), "Stopping previous tunnel process");
            let code = handle.terminate().await;
            tracing::debug!(?code, "Previous tunnel process reaped");
        }

        let binary = match command::locate(&self.config.binary) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Tunnel tool not found, public URL will not be available");
                self.state.tunnel.resolve(session, TunnelStatus::NotInstalled);
                metrics::record_tunnel_session("not_installed");
                return;
            }
        };

        let token = match token {
            Some(t) if t.port == port => Some(t.token.as_str()),
            Some(t) => {
                tracing::warn!(
                    token = %t.token,
                    token_port = t.port,
                    port,
                    "Token was reserved for a different port, using an ad-hoc share"
                );
                None
            }
            None => None,
        };

        if let Err(e) = self.spawn_share(session, port, binary, token) {
            tracing::error!(session, error = %e, "Failed to start tunnel");
            self.state
                .tunnel
                .resolve(session, TunnelStatus::spawn_failed(&e));
            metrics::record_tunnel_session("spawn_failed");
        }
    }

    fn spawn_share(
        &self,
        session: u64,
        port: u16,
        binary: PathBuf,
        token: Option<&str>,
    ) -> io::Result<()> {
        let args = command::share_args(port, token);
        tracing::info!(session, binary = %binary.display(), ?args, "Starting tunnel process");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone(), session, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx, session, "stderr"));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let pid = child.id();
        tokio::spawn(watch_exit(child, kill_rx, exit_tx, session, self.state.clone()));

        if let Err(stale) = self
            .state
            .tunnel
            .attach_process(session, ProcessHandle::new(pid, kill_tx, exit_rx))
        {
            tracing::debug!(session, "Tunnel session superseded during spawn");
            drop(stale);
            return Ok(());
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.url_timeout_secs);
        tokio::spawn(scan_for_url(
            self.state.clone(),
            session,
            line_rx,
            self.url_pattern.clone(),
            deadline,
            port,
        ));
        Ok(())
    }

    /// Kill the share process and release the owned token. Runs once.
    ///
    /// New sessions are refused from the first call on. The token is read
    /// under the reconfiguration lock, so a configure that is still reserving
    /// one finishes first and its token is the one released.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down tunnel");

        let _guard = match time::timeout(RECONFIGURE_WAIT, self.state.begin_reconfigure()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("Reconfiguration still running, shutting the tunnel down anyway");
                None
            }
        };

        if let ProcessState::Running(handle) = self.state.tunnel.close() {
            match time::timeout(SHUTDOWN_GRACE, handle.terminate()).await {
                Ok(code) => tracing::info!(?code, "Tunnel process stopped"),
                Err(_) => tracing::warn!("Tunnel process did not exit within grace period"),
            }
        }

        let token = self
            .state
            .current()
            .and_then(|config| config.tunnel_token.clone());
        if let Some(token) = token {
            self.release(&token).await;
        }
    }
}

async fn forward_lines<R>(reader: R, lines: mpsc::Sender<String>, session: u64, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(session, stream, line = %line, "tunnel output");
                // The scanner stops listening once it has an outcome.
                let _ = lines.send(line).await;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(session, stream, error = %e, "Tunnel output read failed");
                break;
            }
        }
    }
}

async fn watch_exit(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exited: watch::Sender<Option<Option<i32>>>,
    session: u64,
    state: Arc<SharedState>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => {
            if status.success() {
                tracing::info!(session, "Tunnel process exited normally");
            } else {
                tracing::warn!(session, %status, "Tunnel process exited with error");
            }
            status.code()
        }
        Err(e) => {
            tracing::warn!(session, error = %e, "Failed to wait on tunnel process");
            None
        }
    };

    state.tunnel.record_exit(session, code);
    let _ = exited.send(Some(code));
}

async fn scan_for_url(
    state: Arc<SharedState>,
    session: u64,
    mut lines: mpsc::Receiver<String>,
    pattern: Regex,
    deadline: Instant,
    port: u16,
) {
    loop {
        match time::timeout_at(deadline, lines.recv()).await {
            Err(_) => {
                if state.tunnel.resolve(session, TunnelStatus::TimedOut) {
                    tracing::warn!(session, "No public URL before deadline, leaving tunnel running");
                    metrics::record_tunnel_session("timed_out");
                }
                return;
            }
            Ok(None) => {
                if state.tunnel.resolve(session, TunnelStatus::no_url()) {
                    tracing::warn!(session, "Tunnel output ended without a public URL");
                    metrics::record_tunnel_session("no_url");
                }
                return;
            }
            Ok(Some(line)) => {
                let Some(found) = pattern.find(&line) else {
                    continue;
                };
                let url = found.as_str().to_string();
                if state.tunnel.resolve(session, TunnelStatus::Active(url.clone())) {
                    tracing::info!(
                        local_url = %format!("http://localhost:{}/inspector/dashboard", port),
                        public_url = %url,
                        "Tunnel ready"
                    );
                    metrics::record_tunnel_session("active");
                }
                return;
            }
        }
    }
}
