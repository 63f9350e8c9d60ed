//! Tunnel session state.
//!
//! # States
//! ```text
//! Unavailable ─▶ Initializing ─┬─▶ Active(url)
//!                              ├─▶ Failed(reason)
//!                              ├─▶ TimedOut
//!                              └─▶ NotInstalled
//! ```
//!
//! # Design Decisions
//! - Every (re)start opens a new session id; results from an older session are ignored
//! - A session result only replaces `Initializing`, so the first outcome wins
//! - The process handle is a sum type, so an exited process is never killed

use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

/// Public URL field of `/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelStatus {
    /// No tunnel has been started.
    Unavailable,
    Initializing,
    Active(String),
    Failed(String),
    NotInstalled,
    TimedOut,
}

impl TunnelStatus {
    pub fn spawn_failed(cause: &impl std::fmt::Display) -> Self {
        TunnelStatus::Failed(format!("Failed to start zrok: {}", cause))
    }

    pub fn no_url() -> Self {
        TunnelStatus::Failed("No zrok URL found in output".to_string())
    }
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelStatus::Unavailable => f.write_str("Public URL not available"),
            TunnelStatus::Initializing => f.write_str("Initializing Zrok tunnel..."),
            TunnelStatus::Active(url) => f.write_str(url),
            TunnelStatus::Failed(reason) => f.write_str(reason),
            TunnelStatus::NotInstalled => f.write_str("Zrok not installed"),
            TunnelStatus::TimedOut => f.write_str("Zrok URL not found (timeout)"),
        }
    }
}

/// Handle to a running tunnel process.
///
/// The child itself is owned by its exit watcher; the handle can only ask
/// it to kill the process and observe the exit.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<Option<Option<i32>>>,
}

impl ProcessHandle {
    pub fn new(
        pid: Option<u32>,
        kill: oneshot::Sender<()>,
        exited: watch::Receiver<Option<Option<i32>>>,
    ) -> Self {
        Self {
            pid,
            kill: Some(kill),
            exited,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code once the process has exited (`Some(None)` for a signal exit).
    pub fn exit_status(&self) -> Option<Option<i32>> {
        *self.exited.borrow()
    }

    /// Ask the watcher to kill the process without waiting.
    pub fn start_kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    /// Kill the process and wait until the watcher has reaped it.
    pub async fn terminate(mut self) -> Option<i32> {
        self.start_kill();
        match self.exited.wait_for(Option::is_some).await {
            Ok(status) => (*status).flatten(),
            Err(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub enum ProcessState {
    #[default]
    NotStarted,
    Running(ProcessHandle),
    Exited(Option<i32>),
}

struct TunnelSlot {
    session: u64,
    status: TunnelStatus,
    process: ProcessState,
}

/// Tunnel field group of the shared state.
pub struct TunnelCell {
    inner: Mutex<TunnelSlot>,
}

impl TunnelCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TunnelSlot {
                session: 0,
                status: TunnelStatus::Unavailable,
                process: ProcessState::NotStarted,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TunnelSlot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> TunnelStatus {
        self.lock().status.clone()
    }

    /// Open a new session in `Initializing` and hand back the previous process.
    pub fn begin_session(&self) -> (u64, ProcessState) {
        let mut slot = self.lock();
        slot.session += 1;
        slot.status = TunnelStatus::Initializing;
        let previous = std::mem::take(&mut slot.process);
        (slot.session, previous)
    }

    /// Record the outcome of `session`. Returns `false` when the session is
    /// stale or an outcome was already recorded.
    pub fn resolve(&self, session: u64, status: TunnelStatus) -> bool {
        let mut slot = self.lock();
        if slot.session != session || slot.status != TunnelStatus::Initializing {
            return false;
        }
        slot.status = status;
        true
    }

    /// Store the process for `session`. A stale session gets its handle back.
    pub fn attach_process(&self, session: u64, handle: ProcessHandle) -> Result<(), ProcessHandle> {
        let mut slot = self.lock();
        if slot.session != session {
            return Err(handle);
        }
        slot.process = match handle.exit_status() {
            Some(code) => ProcessState::Exited(code),
            None => ProcessState::Running(handle),
        };
        Ok(())
    }

    /// Mark the process of `session` as exited.
    pub fn record_exit(&self, session: u64, code: Option<i32>) {
        let mut slot = self.lock();
        if slot.session == session && matches!(slot.process, ProcessState::Running(_)) {
            slot.process = ProcessState::Exited(code);
        }
    }

    /// Close the current session and take its process, for shutdown.
    pub fn close(&self) -> ProcessState {
        let mut slot = self.lock();
        slot.session += 1;
        std::mem::take(&mut slot.process)
    }
}

impl Default for TunnelCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ProcessHandle, oneshot::Receiver<()>, watch::Sender<Option<Option<i32>>>) {
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        (ProcessHandle::new(Some(42), kill_tx, exit_rx), kill_rx, exit_tx)
    }

    #[test]
    fn status_sentinels() {
        assert_eq!(TunnelStatus::Unavailable.to_string(), "Public URL not available");
        assert_eq!(TunnelStatus::Initializing.to_string(), "Initializing Zrok tunnel...");
        assert_eq!(TunnelStatus::NotInstalled.to_string(), "Zrok not installed");
        assert_eq!(TunnelStatus::TimedOut.to_string(), "Zrok URL not found (timeout)");
        assert_eq!(TunnelStatus::no_url().to_string(), "No zrok URL found in output");
        assert_eq!(
            TunnelStatus::spawn_failed(&"permission denied").to_string(),
            "Failed to start zrok: permission denied"
        );
    }

    #[test]
    fn first_outcome_wins_and_stale_sessions_are_ignored() {
        let cell = TunnelCell::new();
        let (old, _) = cell.begin_session();
        let (current, _) = cell.begin_session();

        assert!(!cell.resolve(old, TunnelStatus::TimedOut));
        assert_eq!(cell.status(), TunnelStatus::Initializing);

        assert!(cell.resolve(current, TunnelStatus::Active("https://a.share.zrok.io".into())));
        assert!(!cell.resolve(current, TunnelStatus::TimedOut));
        assert_eq!(
            cell.status(),
            TunnelStatus::Active("https://a.share.zrok.io".to_string())
        );
    }

    #[tokio::test]
    async fn terminate_signals_watcher_and_waits_for_exit() {
        let (handle, kill_rx, exit_tx) = handle();
        let watcher = tokio::spawn(async move {
            kill_rx.await.unwrap();
            exit_tx.send(Some(Some(137))).unwrap();
        });

        assert_eq!(handle.terminate().await, Some(137));
        watcher.await.unwrap();
    }

    #[test]
    fn begin_session_hands_back_running_process() {
        let cell = TunnelCell::new();
        let (session, _) = cell.begin_session();
        let (handle, _kill_rx, _exit_tx) = handle();
        cell.attach_process(session, handle).unwrap();

        let (_, previous) = cell.begin_session();
        assert!(matches!(previous, ProcessState::Running(ref h) if h.pid() == Some(42)));
        assert!(matches!(cell.begin_session().1, ProcessState::NotStarted));
    }

    #[test]
    fn exit_after_supersede_does_not_clobber_new_session() {
        let cell = TunnelCell::new();
        let (first, _) = cell.begin_session();
        let (second, _) = cell.begin_session();
        let (handle, _kill_rx, _exit_tx) = handle();
        cell.attach_process(second, handle).unwrap();

        cell.record_exit(first, Some(1));
        cell.record_exit(second, Some(0));
        assert!(matches!(cell.close(), ProcessState::Exited(Some(0))));
    }
}
