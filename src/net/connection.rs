//! Per-connection driver and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections (and mirror the count in metrics)
//! - Drive one HTTP/1.1 connection, upgrades included, until it closes
//! - Ask the connection to finish its in-flight exchange on listener stop
//!
//! # Data Flow
//! ```text
//! accepted socket (plain or TLS)
//!     → serve_connection()
//!     → hyper http1 (keep-alive, upgrades)
//!     → ConnectionService::call() per request
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::http::Origin;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the service knows about the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub origin: Origin,
}

/// Turns transport requests into transport responses for one listener.
pub trait ConnectionService: Send + Sync + 'static {
    fn call(
        &self,
        request: hyper::Request<Incoming>,
        info: &ConnectionInfo,
    ) -> BoxFuture<'static, axum::http::Response<Body>>;
}

/// Counts open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Serve HTTP/1.1 on `io` until the peer goes away or the connection is
/// asked to wind down.
///
/// A triggered `shutdown` lets the in-flight exchange finish, then closes.
/// Upgraded sockets are detached from the connection and outlive it.
pub async fn serve_connection<I>(
    io: I,
    info: ConnectionInfo,
    service: Arc<dyn ConnectionService>,
    mut shutdown: ShutdownSignal,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = info.id;
    let peer_addr = info.peer_addr;
    let local_addr = info.local_addr;

    tracing::debug!(
        connection_id = %connection_id,
        peer_addr = %peer_addr,
        local_addr = %local_addr,
        "Serving connection"
    );

    let svc = service_fn(move |request: hyper::Request<Incoming>| {
        let response = service.call(request, &info);
        async move { Ok::<_, Infallible>(response.await) }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(io), svc)
        .with_upgrades();
    let mut conn = std::pin::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %connection_id,
            peer_addr = %peer_addr,
            local_addr = %local_addr,
            error = %e,
            "Connection ended with error"
        );
    }
}
