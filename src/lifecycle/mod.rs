//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Routed serving (controls.rs):
//!     builder registrations → Controls → start(config) → index
//!     stop(index) → accept loop halted → `stop` published
//!
//! Direct serving (serve.rs):
//!     serve(options, handler) → ServeHandle → shutdown() → finished()
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop exits → connections wind down
//! ```
//!
//! # Design Decisions
//! - Bind failures fail the call outright and are never retried
//! - TLS material is validated before the socket is bound

pub mod controls;
pub mod error;
pub mod serve;
pub mod shutdown;

pub use controls::{Controls, ControlsBuilder};
pub use error::StartError;
pub use serve::{serve, ListenInfo, ServeHandle, ServeOptions};
pub use shutdown::{Shutdown, ShutdownSignal};
