//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Run the accept loop until shutdown, spawning one task per connection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::http::{Origin, Scheme};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::connection::{serve_connection, ConnectionInfo, ConnectionService, ConnectionTracker};

/// Pause after a failed `accept` (e.g. EMFILE) before trying again.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limit semaphore was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener that limits concurrent connections.
///
/// When the limit is reached, accepting waits until a slot is released.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured host and port.
    ///
    /// Host names are resolved and each address is tried in turn.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            local_addr,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Accept connections until `shutdown` fires, then drop the socket.
    ///
    /// Connections already accepted keep running; they receive the same
    /// signal and close after their in-flight exchange.
    pub async fn run(
        self,
        acceptor: Option<RustlsAcceptor>,
        service: Arc<dyn ConnectionService>,
        tracker: ConnectionTracker,
        mut shutdown: ShutdownSignal,
    ) {
        let origin = Origin {
            scheme: if acceptor.is_some() { Scheme::Https } else { Scheme::Http },
            authority: self.local_addr.to_string(),
        };

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.accept() => accepted,
            };

            let (stream, peer_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(address = %self.local_addr, error = %e, "Accept failed");
                    if back_off(&mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };

            let guard = tracker.track();
            let info = ConnectionInfo {
                id: guard.id(),
                peer_addr,
                local_addr: self.local_addr,
                origin: origin.clone(),
            };
            let acceptor = acceptor.clone();
            let service = Arc::clone(&service);
            let signal = shutdown.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                match acceptor {
                    None => serve_connection(stream, info, service, signal).await,
                    Some(acceptor) => match acceptor.accept(stream, ()).await {
                        Ok((tls_stream, ())) => serve_connection(tls_stream, info, service, signal).await,
                        Err(e) => tracing::debug!(
                            connection_id = %info.id,
                            peer_addr = %info.peer_addr,
                            error = %e,
                            "TLS handshake failed"
                        ),
                    },
                }
            });
        }

        tracing::info!(address = %self.local_addr, "Listener closed");
    }
}

/// Wait out [`ACCEPT_RETRY_DELAY`]. Returns `false` if shutdown fired first.
async fn back_off(shutdown: &mut ShutdownSignal) -> bool {
    tokio::select! {
        _ = shutdown.recv() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// A permit representing a connection slot.
///
/// Dropping it releases the slot, even if the connection task panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
