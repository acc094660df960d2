//! Listener registry, start/stop notifications and TLS.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{Method, StatusCode};
use cold_serve::config::{ListenerConfig, PemSource, TlsConfig};
use cold_serve::events::{Event, Topic};
use cold_serve::http::{Params, Request, Response};
use cold_serve::lifecycle::{Controls, StartError};

mod common;

fn hello() -> Controls {
    Controls::builder()
        .route(Method::GET, "/", |_req: Request, _params: Params| async {
            Response::text("hello")
        })
        .build()
}

#[tokio::test]
async fn test_start_publishes_bound_port_and_stop_publishes_index() {
    let controls = hello();
    let events = Arc::new(Mutex::new(Vec::new()));

    for topic in [Topic::Start, Topic::Stop] {
        let log = Arc::clone(&events);
        controls.bus().subscribe(topic, move |event| {
            let line = match event {
                Event::Start { index, port } => format!("start:{index}:{port}"),
                Event::Stop { index } => format!("stop:{index}"),
                _ => return,
            };
            log.lock().unwrap().push(line);
        });
    }

    let (index, addr) = common::start(&controls).await;
    controls.stop(index).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![format!("start:0:{}", addr.port()), "stop:0".to_string()]
    );
}

#[tokio::test]
async fn test_stopping_twice_or_unknown_is_noop() {
    let controls = hello();
    let stops = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&stops);
    controls.bus().subscribe(Topic::Stop, move |_| *counter.lock().unwrap() += 1);

    controls.stop(3).await;
    let (index, _) = common::start(&controls).await;
    controls.stop(index).await;
    controls.stop(index).await;

    assert_eq!(*stops.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_listeners_run_independently() {
    let controls = hello();
    let (first, first_addr) = common::start(&controls).await;
    let (second, second_addr) = common::start(&controls).await;
    assert_ne!(first_addr.port(), second_addr.port());

    controls.stop(first).await;

    let client = common::client();
    assert!(client.get(format!("http://{first_addr}/")).send().await.is_err());
    let res = client.get(format!("http://{second_addr}/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "hello");

    controls.stop(second).await;
}

#[tokio::test]
async fn test_port_in_use_fails_start() {
    let controls = hello();
    let (index, addr) = common::start(&controls).await;

    let err = controls
        .start(&ListenerConfig::new("127.0.0.1", addr.port()))
        .await
        .unwrap_err();
    assert!(matches!(err, StartError::Bind { .. }), "{err}");
    assert!(!controls.is_active(index + 1));

    controls.stop(index).await;
}

#[tokio::test]
async fn test_invalid_certificate_fails_start() {
    let controls = hello();
    let config = common::loopback().with_tls(TlsConfig {
        certificate: PemSource::Pem("-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----\n".into()),
        private_key: PemSource::File(common::fixture("key.pem")),
    });

    let err = controls.start(&config).await.unwrap_err();
    assert!(matches!(err, StartError::Tls(_)), "{err}");
}

#[tokio::test]
async fn test_https_listener_serves_routes() {
    let controls = hello();
    let index = controls.start(&common::loopback_tls()).await.unwrap();
    let port = controls.local_addr(index).unwrap().port();

    let res = common::tls_client()
        .get(format!("https://localhost:{port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello");

    controls.stop(index).await;
}

#[tokio::test]
async fn test_stop_lets_in_flight_request_finish() {
    let controls = Controls::builder()
        .route(Method::GET, "/slow", |_req: Request, _params: Params| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Response::text("done")
        })
        .build();
    let (index, addr) = common::start(&controls).await;

    let pending = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/slow"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    controls.stop(index).await;
    assert_eq!(pending.await.unwrap(), "done");
}
