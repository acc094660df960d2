//! Request dispatch pipeline.
//!
//! # State Machine
//! ```text
//! Received ─▶ Intercepted? ──response──────────────────────┐
//!                 │ no                                      │
//!                 ▼                                         ▼
//!             Routed? ──match: handler(request, params)──▶ Resolved ─▶ Committed
//!                 │ no                                      ▲
//!                 ▼                                         │
//!             Fallback? ──typed fallback / `fetch` reply───┤
//!                 │ nothing                                 │
//!                 └──────────── 404 Not Found ──────────────┘
//!
//! Any failure on the way ─▶ `error` published ─▶ 500 ─▶ Committed
//! ```
//!
//! # Design Decisions
//! - Each request is processed exactly once; nothing is retried
//! - Failures stay inside the request: they are published, logged and
//!   answered with a 500, never propagated to the accept loop
//! - A typed fallback, when registered, replaces the `fetch` topic
//! - No stage has a deadline unless `fallback_timeout` is configured

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::Instrument;

use super::error::DispatchError;
use super::handler::RequestHandler;
use super::interceptor::InterceptorChain;
use crate::events::bus::panic_message;
use crate::events::{Event, EventBus, FetchEvent, Responder};
use crate::http::body::{self, StreamErrorHook};
use crate::http::{Request, Response};
use crate::observability::{logging, metrics};
use crate::routing::Router;

/// Wired dispatch stages shared by every connection of a server.
pub struct Pipeline {
    interceptors: InterceptorChain,
    router: Router,
    fallback: Option<Arc<dyn RequestHandler>>,
    bus: EventBus,
    fallback_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        interceptors: InterceptorChain,
        router: Router,
        fallback: Option<Arc<dyn RequestHandler>>,
        bus: EventBus,
        fallback_timeout: Option<Duration>,
    ) -> Self {
        Self {
            interceptors,
            router,
            fallback,
            bus,
            fallback_timeout,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Resolve a response for `request`. Never fails: errors become a 500.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();

        let span = logging::request_span(method.as_str(), &path);

        async move {
            let response = match self.resolve(request).await {
                Ok(response) => response,
                Err(err) => self.fail(err),
            };

            tracing::debug!(
                status = response.status().as_u16(),
                body = response.body().kind(),
                "Request resolved"
            );
            metrics::record_request(method.as_str(), response.status().as_u16(), started);
            response
        }
        .instrument(span)
        .await
    }

    /// Publish a failure and produce the 500 that replaces the response.
    pub(crate) fn fail(&self, err: DispatchError) -> Response {
        tracing::error!(kind = err.kind(), error = %err, "Dispatch failed");
        metrics::record_failure(err.kind());
        self.bus.publish(&Event::Error(Arc::new(err)));
        Response::internal_error()
    }

    /// Hook that reports body stream failures on the `error` topic.
    pub(crate) fn stream_error_hook(&self) -> StreamErrorHook {
        let bus = self.bus.clone();
        Arc::new(move |source| {
            metrics::record_failure("body_stream");
            bus.publish(&Event::Error(Arc::new(DispatchError::BodyStream { source })));
        })
    }

    /// Dispatch and adapt the result for the transport.
    pub(crate) async fn dispatch_to_transport(
        &self,
        request: Request,
    ) -> axum::http::Response<axum::body::Body> {
        let response = self.dispatch(request).await;
        body::into_transport(response, Some(self.stream_error_hook()))
    }

    async fn resolve(&self, request: Request) -> Result<Response, DispatchError> {
        if let Some(response) = self.interceptors.run(&request).await? {
            return Ok(response);
        }

        if let Some(matched) = self.router.resolve(request.method(), request.path()) {
            let route = matched.route;
            request.set_params(matched.params.clone());

            let handler = Arc::clone(route.handler());
            let outcome = AssertUnwindSafe(async move { handler.call(request, matched.params).await })
                .catch_unwind()
                .await
                .map_err(|panic| DispatchError::Panicked {
                    stage: "route handler",
                    message: panic_message(panic.as_ref()),
                })?;

            return outcome.map_err(|source| DispatchError::Handler {
                method: route.method().clone(),
                pattern: route.pattern().to_string(),
                source,
            });
        }

        let fallback = match &self.fallback {
            Some(fallback) => Some(self.call_fallback(fallback, request).await?),
            None => self.publish_fetch(request).await?,
        };
        Ok(fallback.unwrap_or_else(Response::not_found))
    }

    async fn call_fallback(
        &self,
        fallback: &Arc<dyn RequestHandler>,
        request: Request,
    ) -> Result<Response, DispatchError> {
        let fallback = Arc::clone(fallback);
        AssertUnwindSafe(async move { fallback.call(request).await })
            .catch_unwind()
            .await
            .map_err(|panic| DispatchError::Panicked {
                stage: "fallback handler",
                message: panic_message(panic.as_ref()),
            })?
            .map_err(|source| DispatchError::Fallback { source })
    }

    /// Offer the request on the `fetch` topic and wait for a reply.
    ///
    /// Resolves to `None` once every responder clone is dropped unanswered,
    /// or when the optional fallback timeout elapses.
    async fn publish_fetch(&self, request: Request) -> Result<Option<Response>, DispatchError> {
        let (responder, mut reply) = Responder::new();
        let delivery = self.bus.publish(&Event::Fetch(FetchEvent { request, responder }));

        if !delivery.is_clean() {
            return match reply.try_recv() {
                Ok(response) => Ok(Some(response)),
                Err(_) => Err(DispatchError::FetchSubscriber(delivery.failures.join("; "))),
            };
        }

        let response = match self.fallback_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(reply) => reply.ok(),
                Err(_) => {
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "Fetch fallback timed out");
                    None
                }
            },
            None => reply.await.ok(),
        };
        Ok(response)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("interceptors", &self.interceptors)
            .field("routes", &self.router.len())
            .field("typed_fallback", &self.fallback.is_some())
            .field("fallback_timeout", &self.fallback_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;
    use crate::http::{Params, ResponseBody};
    use axum::http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn pipeline(router: Router, bus: EventBus) -> Pipeline {
        Pipeline::new(InterceptorChain::new(), router, None, bus, None)
    }

    fn text_of(res: &Response) -> &str {
        match res.body() {
            ResponseBody::Text(t) => t,
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_params_reach_handler_and_request() {
        let mut router = Router::new();
        router.register(Method::GET, "/hello/:name", |req: Request, params: Params| async move {
            assert_eq!(req.params(), Some(&params));
            Response::text(format!("Hello, {}!", params.get("name").unwrap_or_default()))
        });

        let res = pipeline(router, EventBus::new())
            .dispatch(Request::get("http://localhost/hello/Alice").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text_of(&res), "Hello, Alice!");
    }

    #[tokio::test]
    async fn test_unmatched_without_fallback_is_404() {
        let bus = EventBus::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        bus.subscribe(Topic::Error, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let res = pipeline(Router::new(), bus)
            .dispatch(Request::get("http://localhost/missing").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(!text_of(&res).is_empty());
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_publishes_once_and_returns_500() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Topic::Error, move |event| {
            if let Event::Error(err) = event {
                if let DispatchError::Handler { source, .. } = err.as_ref() {
                    sink.lock().unwrap().push(source.to_string());
                }
            }
        });

        let mut router = Router::new();
        router.register(Method::GET, "/boom", |_req: Request, _p: Params| async {
            Err::<Response, _>("kaboom")
        });

        let res = pipeline(router, bus)
            .dispatch(Request::get("http://localhost/boom").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*seen.lock().unwrap(), vec!["kaboom".to_string()]);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let bus = EventBus::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = kinds.clone();
        bus.subscribe(Topic::Error, move |event| {
            if let Event::Error(err) = event {
                sink.lock().unwrap().push(err.kind());
            }
        });

        let mut router = Router::new();
        router.register(Method::GET, "/panic", |_req: Request, _p: Params| async {
            if true {
                panic!("handler bug");
            }
            Response::text("unreachable")
        });

        let res = pipeline(router, bus)
            .dispatch(Request::get("http://localhost/panic").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*kinds.lock().unwrap(), vec!["panic"]);
    }

    #[tokio::test]
    async fn test_fetch_subscriber_responds_later() {
        let bus = EventBus::new();
        bus.subscribe(Topic::Fetch, |event| {
            if let Event::Fetch(fetch) = event {
                let responder = fetch.responder.clone();
                let path = fetch.request.path().to_string();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    responder.respond(Response::text(format!("late {path}")));
                });
            }
        });

        let res = pipeline(Router::new(), bus)
            .dispatch(Request::get("http://localhost/anything").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text_of(&res), "late /anything");
    }

    #[tokio::test]
    async fn test_fetch_subscriber_panic_is_500() {
        let bus = EventBus::new();
        bus.subscribe(Topic::Fetch, |_| panic!("fetch subscriber bug"));

        let res = pipeline(Router::new(), bus)
            .dispatch(Request::get("http://localhost/x").unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_fallback_timeout_yields_404() {
        let bus = EventBus::new();
        let parked = Arc::new(Mutex::new(Vec::new()));
        let keep = parked.clone();
        bus.subscribe(Topic::Fetch, move |event| {
            if let Event::Fetch(fetch) = event {
                keep.lock().unwrap().push(fetch.responder.clone());
            }
        });

        let pipeline = Pipeline::new(
            InterceptorChain::new(),
            Router::new(),
            None,
            bus,
            Some(Duration::from_millis(20)),
        );
        let res = pipeline.dispatch(Request::get("http://localhost/slow").unwrap()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(parked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_fallback_replaces_fetch_topic() {
        let bus = EventBus::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        bus.subscribe(Topic::Fetch, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let fallback: Arc<dyn RequestHandler> = Arc::new(|req: Request| async move {
            Response::text(format!("fallback for {}", req.path())).with_status_code(StatusCode::IM_A_TEAPOT)
        });
        let pipeline = Pipeline::new(InterceptorChain::new(), Router::new(), Some(fallback), bus, None);

        let res = pipeline.dispatch(Request::get("http://localhost/tea").unwrap()).await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(text_of(&res), "fallback for /tea");
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interceptor_short_circuits_before_routing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = InterceptorChain::new();
        let counter = hits.clone();
        chain.register(move |_req: Request| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        chain.register(|_req: Request| async {
            Response::text("created").with_status_code(StatusCode::CREATED)
        });

        let mut router = Router::new();
        router.register(Method::GET, "/", |_req: Request, _p: Params| async {
            Response::text("routed")
        });

        let pipeline = Pipeline::new(chain, router, None, EventBus::new(), None);
        let res = pipeline.dispatch(Request::get("http://localhost/").unwrap()).await;

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(text_of(&res), "created");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
