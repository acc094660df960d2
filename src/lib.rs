//! HTTP/WebSocket serving library.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net (listener, TLS, connection driver)
//!                        │
//!                        ├── upgrade ──▶ http::websocket ──▶ events (`websocket`)
//!                        ▼
//!                     http::Request (canonical)
//!                        │
//!                        ▼
//!                     dispatch (interceptors → routing → fallback / `fetch`)
//!                        │             failure ──▶ events (`error`) + 500
//!                        ▼
//!     Client Response  http::Response ──▶ http::body (adapter)
//!     ◀──────────────
//!
//!     Cross-cutting: config, lifecycle (Controls, serve, shutdown), observability
//! ```

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::ServeConfig;
pub use dispatch::{BoxError, DispatchError, Flow};
pub use events::{Event, EventBus, Topic};
pub use http::{Params, Request, Response, ResponseBody};
pub use lifecycle::{serve, Controls, ServeOptions, Shutdown, StartError};
