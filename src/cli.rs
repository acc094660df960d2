//! `cold-serve` launcher.
//!
//! # Modes
//! ```text
//! cold-serve --echo [-p PORT]              echo server via serve()
//! cold-serve <manifest> [-p PORT]          static routes via serve()
//! cold-serve <manifest> -E [-V]            static routes via Controls::start
//! ```
//!
//! Exit codes: 0 after Ctrl-C, 1 for a missing manifest, a manifest that
//! fails to load, or a listener that fails to start.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use clap::Parser;
use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};

use crate::config::{load_config, ListenerConfig, ServeConfig, StaticRouteConfig};
use crate::dispatch::{Handler, HandlerResult, RequestHandler};
use crate::events::{Event, Topic};
use crate::http::{Params, Request, Response};
use crate::lifecycle::{serve, Controls, ServeHandle, ServeOptions, Shutdown};
use crate::observability::{logging, metrics};
use crate::routing::Router;

#[derive(Parser, Debug)]
#[command(name = "cold-serve")]
#[command(about = "HTTP/WebSocket server for static route manifests", long_about = None)]
pub struct Cli {
    /// Route manifest (TOML)
    pub manifest: Option<PathBuf>,

    /// Serve an echo handler instead of a manifest
    #[arg(long)]
    pub echo: bool,

    /// Override the port of the first listener
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the host of the first listener
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Serve through the routed server context and its event bus
    #[arg(short = 'E', long)]
    pub events: bool,

    /// Log lifecycle events and debug output
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

pub async fn run(cli: Cli) -> ExitCode {
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn execute(cli: Cli) -> Result<(), u8> {
    if cli.echo {
        logging::init_logging(if cli.verbose { "debug" } else { "info" });
        let mut listener = ListenerConfig::default();
        apply_overrides(&cli, &mut listener);
        return serve_with(&[listener], echo).await;
    }

    let Some(manifest) = cli.manifest.as_deref() else {
        eprintln!("error: a route manifest is required unless --echo is given");
        eprintln!("usage: cold-serve <MANIFEST> [-p PORT] [-E] [-V] | cold-serve --echo [-p PORT]");
        return Err(1);
    };

    let config = match load_config(manifest) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}: {}", manifest.display(), e);
            return Err(1);
        }
    };

    logging::init_logging(if cli.verbose { "debug" } else { config.observability.log_level.as_str() });
    tracing::info!(
        manifest = %manifest.display(),
        listeners = config.listeners.len(),
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let mut listeners = config.listeners.clone();
    if listeners.is_empty() {
        listeners.push(ListenerConfig::default());
    }
    apply_overrides(&cli, &mut listeners[0]);

    if cli.events {
        run_controls(&config, &listeners, cli.verbose).await
    } else {
        let router = Arc::new(static_router(&config.routes));
        serve_with(&listeners, move |request: Request| route_static(&router, request)).await
    }
}

fn apply_overrides(cli: &Cli, listener: &mut ListenerConfig) {
    if let Some(port) = cli.port {
        listener.port = port;
    }
    if let Some(host) = &cli.host {
        listener.host = host.clone();
    }
}

/// Serve each listener with `handler` until Ctrl-C.
async fn serve_with<H>(listeners: &[ListenerConfig], handler: H) -> Result<(), u8>
where
    H: RequestHandler + Clone,
{
    let shutdown = Shutdown::new();
    let mut handles: Vec<ServeHandle> = Vec::with_capacity(listeners.len());

    for listener in listeners {
        let options = ServeOptions {
            port: listener.port,
            hostname: listener.host.clone(),
            tls: listener.tls.clone(),
            max_connections: listener.max_connections,
            shutdown: Some(shutdown.clone()),
            ..ServeOptions::default()
        }
        .on_listen(|info| println!("Listening on {}", info.url));

        match serve(options, handler.clone()).await {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                eprintln!("error: {e}");
                shutdown.trigger();
                for handle in handles {
                    handle.finished().await;
                }
                return Err(1);
            }
        }
    }

    wait_for_ctrl_c().await;
    shutdown.trigger();
    for handle in handles {
        handle.finished().await;
    }
    Ok(())
}

async fn run_controls(config: &ServeConfig, listeners: &[ListenerConfig], verbose: bool) -> Result<(), u8> {
    let controls = static_controls(config);

    if verbose {
        controls.bus().subscribe(Topic::Start, |event| {
            if let Event::Start { index, port } = event {
                tracing::info!(index, port, "listener started");
            }
        });
        controls.bus().subscribe(Topic::Stop, |event| {
            if let Event::Stop { index } = event {
                tracing::info!(index, "listener stopped");
            }
        });
    }
    controls.bus().subscribe(Topic::Error, |event| {
        if let Event::Error(err) = event {
            tracing::warn!(kind = err.kind(), error = %err, "request failed");
        }
    });

    for listener in listeners {
        match controls.start(listener).await {
            Ok(index) => {
                if let Some(addr) = controls.local_addr(index) {
                    let scheme = if listener.tls.is_some() { "https" } else { "http" };
                    println!("Listening on {}://{}/", scheme, addr);
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                controls.stop_all().await;
                return Err(1);
            }
        }
    }

    wait_for_ctrl_c().await;
    controls.stop_all().await;
    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Canned response from a manifest route.
#[derive(Debug, Clone)]
struct StaticPage {
    status: StatusCode,
    body: String,
    content_type: HeaderValue,
}

impl StaticPage {
    fn from_config(route: &StaticRouteConfig) -> Self {
        Self {
            status: StatusCode::from_u16(route.status).unwrap_or(StatusCode::OK),
            body: route.body.clone(),
            content_type: HeaderValue::from_str(&route.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("text/plain; charset=utf-8")),
        }
    }

    /// Body with every `{name}` replaced by the `:name` capture.
    fn render(&self, params: &Params) -> Response {
        let body = params
            .iter()
            .fold(self.body.clone(), |body, (name, value)| body.replace(&format!("{{{name}}}"), value));
        Response::text(body)
            .with_status_code(self.status)
            .with_header(CONTENT_TYPE, self.content_type.clone())
    }
}

impl Handler for StaticPage {
    fn call(&self, _request: Request, params: Params) -> BoxFuture<'static, HandlerResult> {
        let response = self.render(&params);
        Box::pin(async move { Ok(response) })
    }
}

/// Manifest routes as `(method, pattern, handler)`, in manifest order.
///
/// Routes with an unparseable method are skipped; validation reports them.
fn static_routes(routes: &[StaticRouteConfig]) -> impl Iterator<Item = (Method, &str, StaticPage)> {
    routes.iter().filter_map(|route| {
        let method = Method::from_bytes(route.method.as_bytes()).ok()?;
        Some((method, route.path.as_str(), StaticPage::from_config(route)))
    })
}

fn static_router(routes: &[StaticRouteConfig]) -> Router {
    let mut router = Router::new();
    for (method, path, handler) in static_routes(routes) {
        router.register(method, path, handler);
    }
    router
}

fn static_controls(config: &ServeConfig) -> Controls {
    static_routes(&config.routes)
        .fold(
            Controls::builder().dispatch_config(config.dispatch.clone()),
            |builder, (method, path, page)| builder.route(method, path, page),
        )
        .build()
}

fn route_static(router: &Router, request: Request) -> BoxFuture<'static, HandlerResult> {
    let matched = router
        .resolve(request.method(), request.path())
        .map(|m| (Arc::clone(m.route.handler()), m.params));

    match matched {
        Some((handler, params)) => handler.call(request, params),
        None => Box::pin(async { Ok(Response::not_found()) }),
    }
}

/// Reflect the request back as pretty JSON.
async fn echo(request: Request) -> HandlerResult {
    let headers: Map<String, Value> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();

    let body = if request.has_body() {
        request.text().await?
    } else {
        String::new()
    };

    let payload = json!({
        "method": request.method().as_str(),
        "url": request.url().as_str(),
        "headers": headers,
        "body": body,
    });
    let text = serde_json::to_string_pretty(&payload)?;
    Ok(Response::text(text).with_header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
}
