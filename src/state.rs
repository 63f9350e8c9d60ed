//! Shared application state.
//!
//! # Field Groups
//! - active configuration: `ArcSwapOption`, lock-free reads on the request path
//! - reconfiguration: async mutex serializing writers of the configuration
//! - health: its own mutex (`HealthCell`)
//! - tunnel: its own mutex (`TunnelCell`)
//! - observers: concurrent map (`ObserverRegistry`)
//!
//! # Design Decisions
//! - One state object built by the entry point and passed to every component
//! - No method takes two of these locks at once; callers copy what they need
//!   out of one group before touching another

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, MutexGuard};

use crate::health::HealthCell;
use crate::net::ObserverRegistry;
use crate::proxy::ProxyConfiguration;
use crate::tunnel::TunnelCell;

pub struct SharedState {
    active: ArcSwapOption<ProxyConfiguration>,
    reconfigure: Mutex<()>,
    pub health: HealthCell,
    pub tunnel: TunnelCell,
    pub observers: Arc<ObserverRegistry>,
    listen_port: u16,
}

impl SharedState {
    /// `observer_write_timeout` bounds each frame written to an observer.
    pub fn new(listen_port: u16, observer_write_timeout: Duration) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            reconfigure: Mutex::new(()),
            health: HealthCell::new(),
            tunnel: TunnelCell::new(),
            observers: Arc::new(ObserverRegistry::new(observer_write_timeout)),
            listen_port,
        }
    }

    /// Port the interceptor itself listens on.
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> Option<Arc<ProxyConfiguration>> {
        self.active.load_full()
    }

    /// Replace the active configuration wholesale and return the one it replaced.
    ///
    /// Requests already holding the previous snapshot finish against it.
    pub fn install(&self, config: ProxyConfiguration) -> Option<Arc<ProxyConfiguration>> {
        self.active.swap(Some(Arc::new(config)))
    }

    /// Serialize a reconfiguration, including the token work around it.
    pub async fn begin_reconfigure(&self) -> MutexGuard<'_, ()> {
        self.reconfigure.lock().await
    }
}
