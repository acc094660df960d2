//! WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Complete the upgrade handshake (`101 Switching Protocols`)
//! - Wrap the upgraded socket in a shareable bidirectional channel
//!
//! # Data Flow
//! ```text
//! GET + Upgrade: websocket
//!     → is_upgrade_request()
//!     → switching_protocols() sent to client
//!     → hyper hands over the raw socket
//!     → WebSocketChannel published on the `websocket` topic
//! ```
//!
//! # Design Decisions
//! - Upgrades bypass interceptors and routing entirely
//! - The channel is cheap to clone; send and receive halves are locked
//!   independently so one task can read while another writes

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::net::connection::ConnectionId;

type Socket = WebSocketStream<TokioIo<Upgraded>>;

/// Returns true for a well-formed WebSocket upgrade handshake.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    if req.method() != Method::GET {
        return false;
    }
    let headers = req.headers();

    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    let connection = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    upgrade && connection && headers.contains_key(header::SEC_WEBSOCKET_KEY)
}

/// Build the `101 Switching Protocols` reply for an upgrade request.
///
/// Returns `None` when the request carries no `Sec-WebSocket-Key`.
pub fn switching_protocols<B>(req: &Request<B>) -> Option<Response<Body>> {
    let key = req.headers().get(header::SEC_WEBSOCKET_KEY)?;
    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes())).ok()?;

    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = res.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Some(res)
}

/// Bidirectional message channel over an upgraded connection.
#[derive(Clone)]
pub struct WebSocketChannel {
    connection_id: ConnectionId,
    peer_addr: SocketAddr,
    sink: Arc<Mutex<SplitSink<Socket, Message>>>,
    stream: Arc<Mutex<SplitStream<Socket>>>,
}

impl WebSocketChannel {
    /// Take over an upgraded socket; the handshake reply has already been sent.
    pub(crate) async fn from_upgraded(
        upgraded: Upgraded,
        connection_id: ConnectionId,
        peer_addr: SocketAddr,
    ) -> Self {
        let socket = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        let (sink, stream) = socket.split();
        Self {
            connection_id,
            peer_addr,
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn send(&self, message: Message) -> Result<(), WsError> {
        self.sink.lock().await.send(message).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.send(Message::text(text.into())).await
    }

    /// Next inbound message; `None` once the peer has gone away.
    pub async fn recv(&self) -> Option<Result<Message, WsError>> {
        self.stream.lock().await.next().await
    }

    pub async fn close(&self) -> Result<(), WsError> {
        self.sink.lock().await.close().await
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("connection_id", &self.connection_id)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> axum::http::request::Builder {
        Request::builder()
            .method(Method::GET)
            .uri("/chat")
            .header("Upgrade", "websocket")
            .header("Connection", "keep-alive, Upgrade")
            .header("Sec-WebSocket-Version", "13")
    }

    #[test]
    fn test_detects_upgrade() {
        let req = handshake()
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();
        assert!(is_upgrade_request(&req));
    }

    #[test]
    fn test_rejects_incomplete_handshakes() {
        let no_key = handshake().body(()).unwrap();
        assert!(!is_upgrade_request(&no_key));

        let plain = Request::builder().uri("/chat").body(()).unwrap();
        assert!(!is_upgrade_request(&plain));

        let post = Request::builder()
            .method(Method::POST)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();
        assert!(!is_upgrade_request(&post));
    }

    #[test]
    fn test_accept_key() {
        let req = handshake()
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();
        let res = switching_protocols(&req).unwrap();

        assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            res.headers()[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
