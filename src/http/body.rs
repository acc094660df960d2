//! Body adapter: canonical response → transport response.
//!
//! # Responsibilities
//! - Serialize status, headers and body onto the transport
//! - Pick the write strategy from the body variant
//! - Report stream failures that happen after headers were flushed
//!
//! # Write Strategies
//! ```text
//! Empty  → zero-length body (keep-alive unaffected)
//! Text   → written as-is, length known to the transport
//! Bytes  → single buffered write
//! Stream → forwarded chunk by chunk as the producer yields them
//! ```
//!
//! # Known Hazard
//! Headers are committed before the first stream chunk. If the producer
//! fails mid-stream the connection is closed abruptly and the client sees a
//! truncated response; no trailer or error frame is appended. The failure is
//! handed to the `on_stream_error` hook so it can be surfaced for
//! observability.
//!
//! # Design Decisions
//! - hyper polls the body only when the socket can take more data, so a slow
//!   client slows the producer instead of growing a buffer

use std::sync::Arc;

use axum::body::Body;
use futures_util::stream::StreamExt;

use crate::dispatch::BoxError;
use crate::http::response::{Response, ResponseBody};

/// Callback receiving a stream failure after the response has started.
pub type StreamErrorHook = Arc<dyn Fn(BoxError) + Send + Sync>;

/// Convert a canonical response into the transport's response type.
pub fn into_transport(
    response: Response,
    on_stream_error: Option<StreamErrorHook>,
) -> axum::http::Response<Body> {
    let (status, headers, body) = response.into_parts();

    let body = match body {
        ResponseBody::Empty => Body::empty(),
        ResponseBody::Text(text) => Body::from(text),
        ResponseBody::Bytes(bytes) => Body::from(bytes),
        ResponseBody::Stream(stream) => {
            let stream = stream.map(move |chunk| {
                chunk.map_err(|err| {
                    tracing::warn!(error = %err, "Response body stream failed; closing connection");
                    if let Some(hook) = &on_stream_error {
                        hook(err);
                    }
                    std::io::Error::other("response body stream aborted")
                })
            });
            Body::from_stream(stream)
        }
    };

    let mut res = axum::http::Response::new(body);
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res
}
