//! Errors raised while bringing a listener up.

use thiserror::Error;

use crate::net::{ListenerError, TlsError};

/// `start`/`serve` failure. Never retried.
#[derive(Debug, Error)]
pub enum StartError {
    /// The socket could not be bound (port in use, unresolvable host, ...).
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: ListenerError,
    },

    /// Certificate or key material was rejected.
    #[error("invalid TLS material: {0}")]
    Tls(#[from] TlsError),
}
