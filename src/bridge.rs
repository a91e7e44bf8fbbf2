//! Server-side bridge: relay and facade sharing one session store.
//!
//! # Lifecycle
//!
//! 1. [`BridgeServer::bind`] validates the config, binds the enabled
//!    listeners and starts the eviction sweep
//! 2. [`BridgeServer::run`] serves until SIGINT, SIGTERM or
//!    [`BridgeServer::shutdown`]
//! 3. Shutdown closes relay connections and drains the facade

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::session::SessionStore;
use crate::transport::{FacadeState, RelayServer, router};

// ============================================================================
// BridgeServer
// ============================================================================

/// Running bridge listeners.
pub struct BridgeServer {
    store: Arc<SessionStore>,
    relay: Option<Arc<RelayServer>>,
    http_addr: Option<SocketAddr>,
    facade_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl BridgeServer {
    /// Validates `config`, binds every enabled listener and starts serving.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if validation fails
    /// - [`Error::Io`](crate::Error::Io) if a listener cannot bind
    pub async fn bind(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let store = Arc::new(SessionStore::new(config.session_ttl()));
        let (shutdown_tx, _) = watch::channel(false);

        tokio::spawn(eviction_task(
            Arc::clone(&store),
            config.eviction_interval(),
            shutdown_tx.subscribe(),
        ));

        let relay = match config.socket_addr {
            Some(addr) => {
                Some(RelayServer::bind(addr, Arc::clone(&config), Arc::clone(&store)).await?)
            }
            None => {
                info!("Relay socket disabled");
                None
            }
        };

        let (http_addr, facade_task) = match config.http_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                let local_addr = listener.local_addr()?;
                let app = router(FacadeState::new(Arc::clone(&config), Arc::clone(&store)));

                let mut shutdown_rx = shutdown_tx.subscribe();
                let task = tokio::spawn(async move {
                    let served = axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.wait_for(|stop| *stop).await;
                        })
                        .await;
                    if let Err(e) = served {
                        error!(error = %e, "HTTP facade stopped");
                    }
                });

                info!(%local_addr, "HTTP facade listening");
                (Some(local_addr), Some(task))
            }
            None => {
                info!("HTTP facade disabled");
                (None, None)
            }
        };

        Ok(Self {
            store,
            relay,
            http_addr,
            facade_task,
            shutdown_tx,
        })
    }

    /// Returns the facade address, if enabled.
    #[inline]
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Returns the relay WebSocket URL, if enabled.
    #[must_use]
    pub fn relay_url(&self) -> Option<String> {
        self.relay.as_ref().map(|relay| relay.ws_url())
    }

    /// Returns the shared session store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Stops every listener.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(relay) = &self.relay {
            relay.shutdown();
        }
    }

    /// Serves until a termination signal or [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; the `Result` leaves room for
    /// listener failures surfacing here.
    pub async fn run(mut self) -> Result<()> {
        shutdown_signal(self.shutdown_tx.subscribe()).await;
        self.shutdown();

        if let Some(task) = self.facade_task.take() {
            let _ = task.await;
        }

        info!("Bridge stopped");
        Ok(())
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Purges expired sessions every `interval` until shutdown.
async fn eviction_task(
    store: Arc<SessionStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = store.purge_expired();
                if removed > 0 {
                    info!(removed, remaining = store.len(), "Evicted expired sessions");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Eviction task stopped");
}

/// Resolves on SIGINT, SIGTERM, or a shutdown request.
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate()).ok()
    };

    tokio::select! {
        () = async {
            #[cfg(unix)]
            {
                match sigterm.as_mut() {
                    Some(sigterm) => {
                        sigterm.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, starting graceful shutdown");
        }
        _ = shutdown.wait_for(|stop| *stop) => {
            info!("Shutdown requested");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
