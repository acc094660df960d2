//! Interceptor chain.
//!
//! # Responsibilities
//! - Hold interceptors in registration order
//! - Run them one at a time, awaiting each before starting the next
//! - Stop at the first interceptor that produces a response
//!
//! # Design Decisions
//! - The first response ends the chain, so no interceptor ever observes a
//!   response produced by an earlier one; interceptors only see the request
//! - Errors and panics are tagged with the interceptor's position

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::error::DispatchError;
use super::handler::BoxError;
use crate::events::bus::panic_message;
use crate::http::{Request, Response};

/// What an interceptor decided.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Short-circuit with this response.
    Respond(Response),
}

/// Values an interceptor may return.
pub trait IntoFlow {
    fn into_flow(self) -> Result<Flow, BoxError>;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(self)
    }
}

impl IntoFlow for () {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(Flow::Continue)
    }
}

impl IntoFlow for Response {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(Flow::Respond(self))
    }
}

impl IntoFlow for Option<Response> {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(self.map_or(Flow::Continue, Flow::Respond))
    }
}

impl<T: IntoFlow, E: Into<BoxError>> IntoFlow for Result<T, E> {
    fn into_flow(self) -> Result<Flow, BoxError> {
        self.map_err(Into::into)?.into_flow()
    }
}

pub trait Interceptor: Send + Sync + 'static {
    fn intercept(&self, request: Request) -> BoxFuture<'static, Result<Flow, BoxError>>;
}

impl<F, Fut> Interceptor for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoFlow,
{
    fn intercept(&self, request: Request) -> BoxFuture<'static, Result<Flow, BoxError>> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.into_flow() })
    }
}

#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I: Interceptor>(&mut self, interceptor: I) {
        self.interceptors.push(Arc::new(interceptor));
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the chain. `Ok(None)` means nobody short-circuited.
    pub async fn run(&self, request: &Request) -> Result<Option<Response>, DispatchError> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            let outcome = AssertUnwindSafe(async { interceptor.intercept(request.clone()).await })
                .catch_unwind()
                .await
                .map_err(|panic| DispatchError::Panicked {
                    stage: "interceptor",
                    message: panic_message(panic.as_ref()),
                })?;

            match outcome.map_err(|source| DispatchError::Interceptor { index, source })? {
                Flow::Continue => continue,
                Flow::Respond(response) => {
                    tracing::debug!(interceptor = index, status = %response.status(), "Interceptor responded");
                    return Ok(Some(response));
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}
