//! Canonical request model.
//!
//! # Responsibilities
//! - Build a transport-independent view of an inbound call
//! - Infer the absolute URL from the `Host` header and the listener scheme
//! - Expose the body as a lazily consumed byte stream (never for GET/HEAD)
//! - Carry the route parameter side-channel, written once after matching
//!
//! # Design Decisions
//! - Cheap to clone: interceptors, handlers and fallbacks share one `Arc`
//! - Headers live in a `HeaderMap` (case-insensitive keys, multi-value order kept)
//! - The body is taken, not borrowed: exactly one consumer drains it
//! - No buffering or re-encoding; the transport may still be receiving body
//!   bytes while the request is already being dispatched

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, Method};
use serde::de::DeserializeOwned;
use url::Url;

/// Default cap applied by [`Request::bytes`] and friends.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Transport scheme of the listener that accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request arrived: listener scheme plus the bind authority used
/// when the client sent no usable `Host` header.
#[derive(Debug, Clone)]
pub struct Origin {
    pub scheme: Scheme,
    pub authority: String,
}

/// Named path-segment captures produced by route matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Later captures with the same name overwrite earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Failure while collecting a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body was already consumed")]
    Consumed,
    #[error("failed to read request body: {0}")]
    Read(#[from] axum::Error),
    #[error("request body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable view of one inbound call.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Mutex<Option<Body>>,
    params: OnceLock<Params>,
    max_body_bytes: usize,
}

impl Request {
    /// Build a request from its parts.
    ///
    /// A body passed with GET or HEAD is dropped.
    pub fn from_parts(method: Method, url: Url, headers: HeaderMap, body: Option<Body>) -> Self {
        Self::build(method, url, headers, body, DEFAULT_MAX_BODY_BYTES)
    }

    fn build(
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Body>,
        max_body_bytes: usize,
    ) -> Self {
        let body = if carries_body(&method) { body } else { None };
        Self {
            inner: Arc::new(Inner {
                method,
                url,
                headers,
                body: Mutex::new(body),
                params: OnceLock::new(),
                max_body_bytes,
            }),
        }
    }

    /// Bodiless GET request, mostly useful for in-process dispatch.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_parts(Method::GET, Url::parse(url)?, HeaderMap::new(), None))
    }

    /// Adapt a transport request.
    ///
    /// The URL is `scheme://host` taken from the `Host` header, falling back
    /// to the listener's authority, with the path and query of the request
    /// target. A `Host` value that is not a bare host (carries a path,
    /// query, fragment or userinfo) is ignored.
    pub fn from_transport(
        parts: Parts,
        body: Body,
        origin: &Origin,
        max_body_bytes: usize,
    ) -> Result<Self, url::ParseError> {
        let host_base = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .filter(|h| !h.is_empty())
            .and_then(|host| Url::parse(&format!("{}://{}", origin.scheme, host)).ok())
            .filter(is_bare_origin);

        let mut url = match host_base {
            Some(url) => url,
            None => Url::parse(&format!("{}://{}", origin.scheme, origin.authority))?,
        };
        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());

        Ok(Self::build(parts.method, url, parts.headers, Some(body), max_body_bytes))
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn path(&self) -> &str {
        self.inner.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.url.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// First value of a header, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Route captures; `None` until a route has matched.
    pub fn params(&self) -> Option<&Params> {
        self.inner.params.get()
    }

    /// Attach route captures. Only the first call has an effect.
    pub(crate) fn set_params(&self, params: Params) -> bool {
        self.inner.params.set(params).is_ok()
    }

    /// Whether an unconsumed body is still attached.
    pub fn has_body(&self) -> bool {
        self.body_slot().is_some()
    }

    /// Take the raw body stream. Returns `None` for GET/HEAD or once taken.
    pub fn take_body(&self) -> Option<Body> {
        self.body_slot().take()
    }

    /// Collect the body, bounded by the configured body limit.
    ///
    /// Requests that never carried a body yield an empty buffer.
    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        if !carries_body(self.method()) {
            return Ok(Bytes::new());
        }
        let body = self.take_body().ok_or(BodyError::Consumed)?;
        Ok(axum::body::to_bytes(body, self.inner.max_body_bytes).await?)
    }

    pub async fn text(&self) -> Result<String, BodyError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn body_slot(&self) -> std::sync::MutexGuard<'_, Option<Body>> {
        self.inner.body.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("url", &self.inner.url.as_str())
            .field("headers", &self.inner.headers)
            .field("params", &self.inner.params.get())
            .finish_non_exhaustive()
    }
}

fn carries_body(method: &Method) -> bool {
    method != Method::GET && method != Method::HEAD
}

fn is_bare_origin(url: &Url) -> bool {
    url.has_host()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn origin() -> Origin {
        Origin {
            scheme: Scheme::Http,
            authority: "localhost:8000".to_string(),
        }
    }

    fn parts(method: Method, uri: &str, host: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_url_from_host_header() {
        let req = Request::from_transport(
            parts(Method::GET, "/hello/Alice?x=1", Some("example.com:9000")),
            Body::empty(),
            &origin(),
            DEFAULT_MAX_BODY_BYTES,
        )
        .unwrap();

        assert_eq!(req.url().as_str(), "http://example.com:9000/hello/Alice?x=1");
        assert_eq!(req.path(), "/hello/Alice");
        assert_eq!(req.query(), Some("x=1"));
    }

    #[test]
    fn test_host_header_cannot_rewrite_path() {
        for host in ["evil.com/admin", "x?", "x#frag", "user@x"] {
            let req = Request::from_transport(
                parts(Method::GET, "/hello/Alice?x=1", Some(host)),
                Body::empty(),
                &origin(),
                DEFAULT_MAX_BODY_BYTES,
            )
            .unwrap();

            assert_eq!(req.url().as_str(), "http://localhost:8000/hello/Alice?x=1", "host {host:?}");
            assert_eq!(req.path(), "/hello/Alice");
            assert_eq!(req.query(), Some("x=1"));
        }
    }

    #[test]
    fn test_url_falls_back_to_listener_authority() {
        let req = Request::from_transport(
            parts(Method::GET, "/", None),
            Body::empty(),
            &origin(),
            DEFAULT_MAX_BODY_BYTES,
        )
        .unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:8000/");

        let https = Origin {
            scheme: Scheme::Https,
            authority: "127.0.0.1:443".into(),
        };
        let req = Request::from_transport(parts(Method::GET, "/a", Some("bad host")), Body::empty(), &https, 16)
            .unwrap();
        assert_eq!(req.url().as_str(), "https://127.0.0.1/a");
    }

    #[test]
    fn test_get_and_head_never_carry_body() {
        for method in [Method::GET, Method::HEAD] {
            let req = Request::from_parts(
                method,
                Url::parse("http://localhost/").unwrap(),
                HeaderMap::new(),
                Some(Body::from("ignored")),
            );
            assert!(!req.has_body());
            assert!(req.take_body().is_none());
        }

        let post = Request::from_parts(
            Method::POST,
            Url::parse("http://localhost/").unwrap(),
            HeaderMap::new(),
            Some(Body::from("kept")),
        );
        assert!(post.has_body());
    }

    #[tokio::test]
    async fn test_body_is_single_consumer() {
        let req = Request::from_parts(
            Method::POST,
            Url::parse("http://localhost/echo").unwrap(),
            HeaderMap::new(),
            Some(Body::from("payload")),
        );
        let clone = req.clone();

        assert_eq!(req.text().await.unwrap(), "payload");
        assert!(matches!(clone.text().await, Err(BodyError::Consumed)));
    }

    #[tokio::test]
    async fn test_json_body() {
        let req = Request::from_parts(
            Method::PUT,
            Url::parse("http://localhost/").unwrap(),
            HeaderMap::new(),
            Some(Body::from(r#"{"n":3}"#)),
        );
        let value: serde_json::Value = req.json().await.unwrap();
        assert_eq!(value["n"], 3);
    }

    #[test]
    fn test_multi_value_headers_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append("X-Tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        let req = Request::from_parts(Method::GET, Url::parse("http://h/").unwrap(), headers, None);

        let values: Vec<_> = req.headers().get_all("X-TAG").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(req.header("x-tag"), Some("a"));
    }

    #[test]
    fn test_params_written_once() {
        let req = Request::get("http://localhost/users/7").unwrap();
        assert!(req.params().is_none());

        assert!(req.set_params(Params::from_iter([("id", "7")])));
        assert!(!req.set_params(Params::from_iter([("id", "8")])));
        assert_eq!(req.params().and_then(|p| p.get("id")), Some("7"));
    }
}
