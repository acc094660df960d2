//! HTTP model subsystem.
//!
//! # Data Flow
//! ```text
//! hyper request (parts + streaming body)
//!     → request.rs (canonical Request, URL inference, lazy body)
//!     → [dispatch pipeline resolves a Response]
//!     → response.rs (status, headers, closed body variant)
//!     → body.rs (write strategy per body kind)
//!     → Send to client
//!
//! Upgrade handshakes:
//!     → websocket.rs (101 reply, WebSocketChannel)
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod sse;
pub mod websocket;

pub use request::{BodyError, Origin, Params, Request, Scheme};
pub use response::{BodyStream, InvalidStatus, Response, ResponseBody};
pub use websocket::WebSocketChannel;
