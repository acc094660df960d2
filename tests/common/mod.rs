//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use cold_serve::config::{ListenerConfig, PemSource, TlsConfig};
use cold_serve::lifecycle::Controls;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Loopback listener on a free port.
pub fn loopback() -> ListenerConfig {
    ListenerConfig::new("127.0.0.1", 0)
}

/// Loopback listener with the self-signed fixture certificate.
pub fn loopback_tls() -> ListenerConfig {
    loopback().with_tls(TlsConfig {
        certificate: PemSource::File(fixture("cert.pem")),
        private_key: PemSource::File(fixture("key.pem")),
    })
}

pub fn fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Start a listener and return its index and bound address.
pub async fn start(controls: &Controls) -> (usize, SocketAddr) {
    let index = controls.start(&loopback()).await.unwrap();
    let addr = controls.local_addr(index).unwrap();
    (index, addr)
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Client for the self-signed fixture certificate.
pub fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Write `request` verbatim and read until the server closes.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
