//! Handler traits for the three dispatch styles.
//!
//! - [`Handler`]: route handler, called with the request and its captures
//! - [`RequestHandler`]: direct handler / fallback, called with the request
//!
//! Both are implemented for async closures whose output is a [`Response`]
//! or a `Result<Response, E>`; returning `Err` counts as a handler failure.

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::http::{Params, Request, Response};

/// Boxed error produced by user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of invoking a handler.
pub type HandlerResult = Result<Response, BoxError>;

/// Values a handler may return.
pub trait IntoReply {
    fn into_reply(self) -> HandlerResult;
}

impl IntoReply for Response {
    fn into_reply(self) -> HandlerResult {
        Ok(self)
    }
}

impl<E: Into<BoxError>> IntoReply for Result<Response, E> {
    fn into_reply(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

/// Route handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, params: Params) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReply,
{
    fn call(&self, request: Request, params: Params) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(request, params);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// Handler taking only the request: the direct-serve handler and the
/// typed fallback.
pub trait RequestHandler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReply,
{
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.into_reply() })
    }
}
