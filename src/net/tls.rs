//! TLS configuration and certificate loading.
//!
//! PEM material is parsed up front so that a bad certificate or key fails
//! `start` with a precise error instead of surfacing on the first handshake.
//! Only `http/1.1` is offered over ALPN.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::{PemSource, TlsConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("malformed PEM in {what}: {source}")]
    Pem { what: &'static str, source: io::Error },

    #[error("no certificates found in certificate material")]
    NoCertificates,

    #[error("no private key found in key material")]
    NoPrivateKey,

    #[error("certificate rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the server-side TLS configuration for a listener.
pub fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let certs = read_certificates(&config.certificate)?;
    let key = read_private_key(&config.private_key)?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut server_config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn reader(source: &PemSource) -> Result<Box<dyn BufRead>, TlsError> {
    match source {
        PemSource::Pem(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
        PemSource::File(path) => {
            let file = File::open(path).map_err(|source| TlsError::Read {
                path: path.clone(),
                source,
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

fn read_certificates(source: &PemSource) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = reader(source)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            what: "certificate",
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }
    Ok(certs)
}

fn read_private_key(source: &PemSource) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = reader(source)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Pem {
            what: "private key",
            source,
        })?
        .ok_or(TlsError::NoPrivateKey)
}
