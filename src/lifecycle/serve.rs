//! Direct-handler serving: one handler for every request, no routing.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::body::Incoming;
use tokio::task::JoinHandle;

use super::controls::bind;
use super::error::StartError;
use super::shutdown::Shutdown;
use crate::config::{ListenerConfig, TlsConfig};
use crate::dispatch::RequestHandler;
use crate::events::bus::panic_message;
use crate::http::request::DEFAULT_MAX_BODY_BYTES;
use crate::http::{body, Request, Response};
use crate::net::{ConnectionInfo, ConnectionService, ConnectionTracker};
use crate::observability::metrics;

/// Passed to `on_listen` once the socket is accepting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenInfo {
    /// `http[s]://hostname:port/`
    pub url: String,
    pub port: u16,
    pub local_addr: SocketAddr,
}

type OnListen = Box<dyn FnOnce(&ListenInfo) + Send>;

/// Options for [`serve`].
pub struct ServeOptions {
    pub port: u16,
    pub hostname: String,
    pub tls: Option<TlsConfig>,
    pub max_connections: usize,
    pub max_body_bytes: usize,
    pub on_listen: Option<OnListen>,
    /// Closes the listener when triggered; a fresh one is created if unset.
    pub shutdown: Option<Shutdown>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        let listener = ListenerConfig::default();
        Self {
            port: listener.port,
            hostname: listener.host,
            tls: None,
            max_connections: listener.max_connections,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            on_listen: None,
            shutdown: None,
        }
    }
}

impl ServeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn on_listen<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&ListenInfo) + Send + 'static,
    {
        self.on_listen = Some(Box::new(callback));
        self
    }

    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            port: self.port,
            host: self.hostname.clone(),
            tls: self.tls.clone(),
            max_connections: self.max_connections,
        }
    }
}

/// A running [`serve`] listener.
#[derive(Debug)]
pub struct ServeHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl ServeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Open connections finish their in-flight exchange.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Resolves once the listener has closed.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            tracing::error!(address = %self.local_addr, error = %e, "Accept loop terminated abnormally");
        }
    }
}

/// Serve every request with `handler`.
///
/// A handler error or panic is logged and answered with
/// `500 Internal Server Error`.
pub async fn serve<H: RequestHandler>(options: ServeOptions, handler: H) -> Result<ServeHandle, StartError> {
    let config = options.listener_config();
    let (listener, acceptor) = bind(&config).await?;
    let local_addr = listener.local_addr();

    let shutdown = options.shutdown.unwrap_or_default();
    let service: Arc<dyn ConnectionService> = Arc::new(DirectService {
        handler: Arc::new(handler),
        max_body_bytes: options.max_body_bytes,
    });
    let scheme = if acceptor.is_some() { "https" } else { "http" };
    let task = tokio::spawn(listener.run(acceptor, service, ConnectionTracker::new(), shutdown.subscribe()));

    let info = ListenInfo {
        url: format!("{}://{}:{}/", scheme, url_host(&config.host), local_addr.port()),
        port: local_addr.port(),
        local_addr,
    };
    tracing::info!(url = %info.url, "Serving");
    if let Some(on_listen) = options.on_listen {
        on_listen(&info);
    }

    Ok(ServeHandle {
        local_addr,
        shutdown,
        task,
    })
}

fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

struct DirectService {
    handler: Arc<dyn RequestHandler>,
    max_body_bytes: usize,
}

impl ConnectionService for DirectService {
    fn call(
        &self,
        request: hyper::Request<Incoming>,
        info: &ConnectionInfo,
    ) -> BoxFuture<'static, axum::http::Response<Body>> {
        let handler = Arc::clone(&self.handler);
        let origin = info.origin.clone();
        let max_body_bytes = self.max_body_bytes;

        Box::pin(async move {
            let started = Instant::now();
            let (parts, incoming) = request.into_parts();
            let method = parts.method.clone();

            let response = match Request::from_transport(parts, Body::new(incoming), &origin, max_body_bytes) {
                Ok(request) => run_handler(handler, request).await,
                Err(e) => {
                    tracing::error!(error = %e, "Could not build request URL");
                    Response::internal_error()
                }
            };

            metrics::record_request(method.as_str(), response.status().as_u16(), started);
            body::into_transport(response, None)
        })
    }
}

async fn run_handler(handler: Arc<dyn RequestHandler>, request: Request) -> Response {
    let outcome = AssertUnwindSafe(async move { handler.call(request).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Handler failed");
            metrics::record_failure("handler");
            Response::internal_error()
        }
        Err(panic) => {
            tracing::error!(message = %panic_message(panic.as_ref()), "Handler panicked");
            metrics::record_failure("panic");
            Response::internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ServeOptions::default();
        assert_eq!(options.port, 8000);
        assert_eq!(options.hostname, "localhost");
        assert!(options.tls.is_none());
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        assert_eq!(url_host("::1"), "[::1]");
        assert_eq!(url_host("[::1]"), "[::1]");
        assert_eq!(url_host("localhost"), "localhost");
    }

    #[tokio::test]
    async fn test_on_listen_reports_bound_port() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = serve(
            ServeOptions::new()
                .hostname("127.0.0.1")
                .port(0)
                .on_listen(move |info| {
                    let _ = tx.send(info.clone());
                }),
            |_req: Request| async { Response::text("ok") },
        )
        .await
        .unwrap();

        let info = rx.await.unwrap();
        assert_eq!(info.port, handle.local_addr().port());
        assert_eq!(info.url, format!("http://127.0.0.1:{}/", info.port));

        handle.shutdown();
        handle.finished().await;
    }
}
