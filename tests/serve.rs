//! Direct-handler serving.

use std::time::Duration;

use axum::http::StatusCode;
use cold_serve::http::{Request, Response};
use cold_serve::lifecycle::{serve, ServeOptions, Shutdown};

mod common;

fn local() -> ServeOptions {
    ServeOptions::new().hostname("127.0.0.1").port(0)
}

#[tokio::test]
async fn test_every_request_reaches_the_handler() {
    let handle = serve(local(), |req: Request| async move {
        let body = req.text().await?;
        Ok::<_, cold_serve::BoxError>(Response::text(format!("{} {} {}", req.method(), req.path(), body)))
    })
    .await
    .unwrap();
    let addr = handle.local_addr();
    let client = common::client();

    let res = client.get(format!("http://{addr}/any/path")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "GET /any/path ");

    let res = client
        .post(format!("http://{addr}/submit"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "POST /submit payload");

    handle.shutdown();
    handle.finished().await;
}

#[tokio::test]
async fn test_handler_error_and_panic_become_500() {
    let handle = serve(local(), |req: Request| async move {
        match req.path() {
            "/error" => Err("nope".into()),
            "/panic" => panic!("handler exploded"),
            _ => Ok::<_, cold_serve::BoxError>(Response::text("fine")),
        }
    })
    .await
    .unwrap();
    let addr = handle.local_addr();
    let client = common::client();

    for path in ["/error", "/panic"] {
        let res = client.get(format!("http://{addr}{path}")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.text().await.unwrap(), "Internal Server Error");
    }

    // The listener survives both failures.
    let res = client.get(format!("http://{addr}/ok")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "fine");

    handle.shutdown();
    handle.finished().await;
}

#[tokio::test]
async fn test_external_shutdown_releases_port() {
    let shutdown = Shutdown::new();
    let handle = serve(local().shutdown(shutdown.clone()), |_req: Request| async {
        Response::text("up")
    })
    .await
    .unwrap();
    let addr = handle.local_addr();

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle.finished())
        .await
        .unwrap();

    assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
}

#[tokio::test]
async fn test_https_serve_reports_https_url() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tls = common::loopback_tls().tls.unwrap();
    let handle = serve(
        local().tls(tls).on_listen(move |info| {
            let _ = tx.send(info.url.clone());
        }),
        |_req: Request| async { Response::text("secure") },
    )
    .await
    .unwrap();

    let url = rx.await.unwrap();
    assert_eq!(url, format!("https://127.0.0.1:{}/", handle.local_addr().port()));

    let res = common::tls_client().get(&url).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "secure");

    handle.shutdown();
    handle.finished().await;
}
