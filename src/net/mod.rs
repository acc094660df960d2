//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (HTTP/1.1 driver, lifecycle tracking)
//!     → ConnectionService (dispatch pipeline or direct handler)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Stopping a listener halts the accept loop only; open connections
//!   finish their in-flight exchange
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionId, ConnectionInfo, ConnectionService, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use tls::{load_tls_config, TlsError};
