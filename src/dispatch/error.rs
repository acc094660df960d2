//! Dispatch failure taxonomy.
//!
//! A routing miss is not an error (it becomes a plain 404). Everything here
//! is published on the `error` topic; failures raised before the response is
//! committed also turn into a 500.

use axum::http::Method;

use super::handler::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request URL could not be reconstructed from the transport request.
    #[error("could not build request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An interceptor returned an error.
    #[error("interceptor #{index} failed: {source}")]
    Interceptor { index: usize, source: BoxError },

    /// A route handler returned an error.
    #[error("handler for {method} {pattern} failed: {source}")]
    Handler {
        method: Method,
        pattern: String,
        source: BoxError,
    },

    /// The typed fallback returned an error.
    #[error("fallback handler failed: {source}")]
    Fallback { source: BoxError },

    /// A `fetch` subscriber panicked before anyone responded.
    #[error("fetch subscriber failed: {0}")]
    FetchSubscriber(String),

    /// User code panicked while producing a response.
    #[error("{stage} panicked: {message}")]
    Panicked { stage: &'static str, message: String },

    /// The response body stream failed after headers were sent.
    #[error("response body stream failed after headers were sent: {source}")]
    BodyStream { source: BoxError },
}

impl DispatchError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidUrl(_) => "invalid_url",
            DispatchError::Interceptor { .. } => "interceptor",
            DispatchError::Handler { .. } => "handler",
            DispatchError::Fallback { .. } => "fallback",
            DispatchError::FetchSubscriber(_) => "fetch_subscriber",
            DispatchError::Panicked { .. } => "panic",
            DispatchError::BodyStream { .. } => "body_stream",
        }
    }
}
