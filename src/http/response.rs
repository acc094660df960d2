//! Canonical response model.
//!
//! # Responsibilities
//! - Hold status, headers and a body whose kind is fixed at construction
//! - Provide constructors for the common shapes (text, bytes, JSON, streams)
//! - Reject status codes outside 100-599
//!
//! # Design Decisions
//! - The body is a closed variant ({Empty, Text, Bytes, Stream}); the body
//!   adapter never inspects runtime types
//! - Header writes replace earlier values for the same name (last write wins)
//! - Streams are boxed so any producer can back a response

use std::fmt;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use futures_util::Stream;
use serde::Serialize;

use crate::dispatch::BoxError;

/// Lazily produced response bytes, finite or unbounded.
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Status code outside the range a response may carry.
#[derive(Debug, thiserror::Error)]
#[error("status code {0} is outside 100-599")]
pub struct InvalidStatus(pub u16);

/// Response body, decided when the response is built.
pub enum ResponseBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl ResponseBody {
    /// Wrap any fallible byte stream.
    pub fn stream<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        ResponseBody::Stream(
            stream
                .map_ok(Into::<Bytes>::into)
                .map_err(Into::<BoxError>::into)
                .boxed(),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Empty => "empty",
            ResponseBody::Text(_) => "text",
            ResponseBody::Bytes(_) => "bytes",
            ResponseBody::Stream(_) => "stream",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ResponseBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        ResponseBody::Text(value)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        ResponseBody::Text(value.to_string())
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        ResponseBody::Bytes(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        ResponseBody::Bytes(Bytes::from(value))
    }
}

/// Outbound response.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    /// Empty-bodied response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Empty-bodied response from a raw status code.
    pub fn with_status(code: u16) -> Result<Self, InvalidStatus> {
        if !(100..=599).contains(&code) {
            return Err(InvalidStatus(code));
        }
        let status = StatusCode::from_u16(code).map_err(|_| InvalidStatus(code))?;
        Ok(Self::new(status))
    }

    /// `200 OK` with a UTF-8 text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .with_body(ResponseBody::Text(body.into()))
    }

    /// `200 OK` with a binary body.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .with_body(ResponseBody::Bytes(body.into()))
    }

    /// `200 OK` with a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(value)?;
        Ok(Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(ResponseBody::Text(body)))
    }

    /// `200 OK` streaming the given producer.
    pub fn stream<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(StatusCode::OK).with_body(ResponseBody::stream(stream))
    }

    /// `200 OK` Server-Sent Events response around an already framed body.
    pub fn event_stream(body: ResponseBody) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))
            .with_header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"))
            .with_header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
            .with_body(body)
    }

    pub fn not_found() -> Self {
        Self::text("Not Found").with_status_code(StatusCode::NOT_FOUND)
    }

    pub fn internal_error() -> Self {
        Self::text("Internal Server Error").with_status_code(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_status_code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any earlier value for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_status_range() {
        assert!(Response::with_status(100).is_ok());
        assert!(Response::with_status(599).is_ok());
        assert!(matches!(Response::with_status(99), Err(InvalidStatus(99))));
        assert!(matches!(Response::with_status(600), Err(InvalidStatus(600))));
    }

    #[test]
    fn test_last_header_write_wins() {
        let res = Response::text("x")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"))
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));

        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(res.headers().get_all("x-a").iter().count(), 1);
        assert_eq!(res.headers()["x-a"], "2");
    }

    #[test]
    fn test_body_kinds() {
        assert_eq!(Response::new(StatusCode::NO_CONTENT).body().kind(), "empty");
        assert_eq!(Response::text("hi").body().kind(), "text");
        assert_eq!(Response::bytes(vec![1u8, 2, 3]).body().kind(), "bytes");

        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"a"))]);
        assert_eq!(Response::stream(chunks).body().kind(), "stream");
    }

    #[test]
    fn test_canned_responses() {
        let nf = Response::not_found();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);
        assert!(matches!(nf.body(), ResponseBody::Text(t) if !t.is_empty()));

        let ie = Response::internal_error();
        assert_eq!(ie.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(ie.body(), ResponseBody::Text(t) if t == "Internal Server Error"));
    }

    #[test]
    fn test_json_response() {
        let res = Response::json(&serde_json::json!({ "ok": true })).unwrap();
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        assert!(matches!(res.body(), ResponseBody::Text(t) if t == r#"{"ok":true}"#));
    }
}
