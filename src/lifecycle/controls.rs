//! Server context: route table, interceptors, bus and listener registry.
//!
//! # Responsibilities
//! - Collect registrations (routes, interceptors, fallback) at setup time
//! - Start listeners and keep them at stable indices
//! - Hand plain requests to the dispatch pipeline and upgrades to the bus
//! - Stop listeners and report lifecycle on the bus
//!
//! # Listener Registry
//! ```text
//! start() → [Some(h0)]
//! start() → [Some(h0), Some(h1)]
//! stop(0) → [None,     Some(h1)]   slot cleared, never compacted
//! start() → [None,     Some(h1), Some(h2)]
//! ```
//!
//! # Design Decisions
//! - Registration happens on the builder; a built `Controls` is immutable
//!   apart from its registry, so dispatch needs no locking
//! - `stop` halts the accept loop only; in-flight connections finish

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::http::Method;
use axum_server::tls_rustls::RustlsAcceptor;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use tokio::task::JoinHandle;

use super::error::StartError;
use super::shutdown::Shutdown;
use crate::config::{DispatchConfig, ListenerConfig};
use crate::dispatch::{DispatchError, Handler, Interceptor, InterceptorChain, Pipeline, RequestHandler};
use crate::events::{Event, EventBus};
use crate::http::{body, websocket, Request, Response, WebSocketChannel};
use crate::net::{load_tls_config, ConnectionInfo, ConnectionService, ConnectionTracker, Listener};
use crate::routing::{PathPattern, Router};

/// Collects setup-time registrations for a [`Controls`].
pub struct ControlsBuilder {
    interceptors: InterceptorChain,
    router: Router,
    fallback: Option<Arc<dyn RequestHandler>>,
    bus: EventBus,
    dispatch: DispatchConfig,
}

impl ControlsBuilder {
    fn new() -> Self {
        Self {
            interceptors: InterceptorChain::new(),
            router: Router::new(),
            fallback: None,
            bus: EventBus::new(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Register a route. The first registered match wins.
    pub fn route<H: Handler>(mut self, method: Method, pattern: impl Into<PathPattern>, handler: H) -> Self {
        self.router.register(method, pattern, handler);
        self
    }

    /// Append an interceptor; interceptors run in registration order.
    pub fn intercept<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.interceptors.register(interceptor);
        self
    }

    /// Set the typed fallback. While set, the `fetch` topic is not used.
    pub fn fallback<H: RequestHandler>(mut self, handler: H) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Share an existing bus instead of creating a fresh one.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    pub fn build(self) -> Controls {
        let timeout = self.dispatch.fallback_timeout_ms.map(Duration::from_millis);
        let pipeline = Pipeline::new(self.interceptors, self.router, self.fallback, self.bus, timeout);
        Controls {
            inner: Arc::new(Inner {
                pipeline: Arc::new(pipeline),
                max_body_bytes: self.dispatch.max_body_bytes,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Running server context. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Controls {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
    listeners: Mutex<Vec<Option<ListenerHandle>>>,
}

struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    task: JoinHandle<()>,
}

impl Controls {
    pub fn builder() -> ControlsBuilder {
        ControlsBuilder::new()
    }

    pub fn bus(&self) -> &EventBus {
        self.inner.pipeline.bus()
    }

    /// Run the pipeline in-process, without a socket.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.inner.pipeline.dispatch(request).await
    }

    /// Bind a listener and start accepting.
    ///
    /// Returns the registry index; `start` is published with the bound port.
    pub async fn start(&self, config: &ListenerConfig) -> Result<usize, StartError> {
        let (listener, acceptor) = bind(config).await?;
        let local_addr = listener.local_addr();

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let service: Arc<dyn ConnectionService> = Arc::new(PipelineService {
            pipeline: Arc::clone(&self.inner.pipeline),
            max_body_bytes: self.inner.max_body_bytes,
        });
        let task = tokio::spawn(listener.run(acceptor, service, tracker.clone(), shutdown.subscribe()));

        let index = {
            let mut listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.push(Some(ListenerHandle {
                local_addr,
                shutdown,
                tracker,
                task,
            }));
            listeners.len() - 1
        };

        tracing::info!(index, address = %local_addr, tls = config.tls.is_some(), "Listener started");
        self.bus().publish(&Event::Start {
            index,
            port: local_addr.port(),
        });
        Ok(index)
    }

    /// Stop the listener at `index` and wait for its socket to close.
    ///
    /// Unknown or already stopped indices are ignored.
    pub async fn stop(&self, index: usize) {
        let handle = {
            let mut listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.get_mut(index).and_then(Option::take)
        };
        let Some(handle) = handle else {
            tracing::debug!(index, "Stop ignored; listener not active");
            return;
        };

        handle.shutdown.trigger();
        if let Err(e) = handle.task.await {
            tracing::error!(index, error = %e, "Accept loop terminated abnormally");
        }

        tracing::info!(
            index,
            address = %handle.local_addr,
            open_connections = handle.tracker.active_count(),
            "Listener stopped"
        );
        self.bus().publish(&Event::Stop { index });
    }

    /// Stop every active listener, lowest index first.
    pub async fn stop_all(&self) {
        let indices: Vec<usize> = {
            let listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
                .collect()
        };
        for index in indices {
            self.stop(index).await;
        }
    }

    /// Bound address of an active listener.
    pub fn local_addr(&self, index: usize) -> Option<SocketAddr> {
        let listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(index)?.as_ref().map(|h| h.local_addr)
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.local_addr(index).is_some()
    }

    /// Open connections on an active listener.
    pub fn active_connections(&self, index: usize) -> Option<u64> {
        let listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(index)?.as_ref().map(|h| h.tracker.active_count())
    }
}

impl std::fmt::Debug for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let active: Vec<SocketAddr> = listeners.iter().flatten().map(|h| h.local_addr).collect();
        f.debug_struct("Controls")
            .field("pipeline", &self.inner.pipeline)
            .field("listeners", &listeners.len())
            .field("active", &active)
            .finish()
    }
}

/// Resolve TLS material, then bind.
pub(super) async fn bind(config: &ListenerConfig) -> Result<(Listener, Option<RustlsAcceptor>), StartError> {
    let acceptor = match &config.tls {
        Some(tls) => Some(RustlsAcceptor::new(load_tls_config(tls)?)),
        None => None,
    };
    let listener = Listener::bind(config).await.map_err(|source| StartError::Bind {
        host: config.host.clone(),
        port: config.port,
        source,
    })?;
    Ok((listener, acceptor))
}

/// Connection service backed by the dispatch pipeline.
struct PipelineService {
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
}

impl ConnectionService for PipelineService {
    fn call(
        &self,
        request: hyper::Request<Incoming>,
        info: &ConnectionInfo,
    ) -> BoxFuture<'static, axum::http::Response<Body>> {
        if websocket::is_upgrade_request(&request) {
            if let Some(reply) = websocket::switching_protocols(&request) {
                hand_off_upgrade(request, info, self.pipeline.bus().clone());
                return Box::pin(async move { reply });
            }
        }

        let pipeline = Arc::clone(&self.pipeline);
        let origin = info.origin.clone();
        let max_body_bytes = self.max_body_bytes;
        Box::pin(async move {
            let (parts, incoming) = request.into_parts();
            match Request::from_transport(parts, Body::new(incoming), &origin, max_body_bytes) {
                Ok(request) => pipeline.dispatch_to_transport(request).await,
                Err(e) => body::into_transport(pipeline.fail(DispatchError::InvalidUrl(e)), None),
            }
        })
    }
}

/// Wait for hyper to release the socket, then publish the channel.
fn hand_off_upgrade(mut request: hyper::Request<Incoming>, info: &ConnectionInfo, bus: EventBus) {
    let connection_id = info.id;
    let peer_addr = info.peer_addr;
    tokio::spawn(async move {
        match hyper::upgrade::on(&mut request).await {
            Ok(upgraded) => {
                let channel = WebSocketChannel::from_upgraded(upgraded, connection_id, peer_addr).await;
                let delivery = bus.publish(&Event::WebSocket(channel));
                tracing::debug!(
                    connection_id = %connection_id,
                    subscribers = delivery.delivered,
                    "WebSocket handed off"
                );
            }
            Err(e) => tracing::warn!(
                connection_id = %connection_id,
                peer_addr = %peer_addr,
                error = %e,
                "WebSocket upgrade failed"
            ),
        }
    });
}
