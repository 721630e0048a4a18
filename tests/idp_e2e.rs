//! End-to-end instance-data HTTP scenarios over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::watch;

use mirage::config::{InstanceDataSettings, ProviderKind};
use mirage::idp::InstanceDataServer;

struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<mirage::Result<()>>,
}

impl TestServer {
    async fn start(settings: InstanceDataSettings) -> Self {
        let bound = InstanceDataServer::new(&settings)
            .unwrap()
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr().unwrap();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(bound.serve(shutdown_rx));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) -> mirage::Result<()> {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap()
    }
}

fn fs_settings(dir: &std::path::Path) -> InstanceDataSettings {
    InstanceDataSettings {
        listen: "127.0.0.1:0".parse().unwrap(),
        provider: ProviderKind::Fs,
        fs_dir: dir.to_path_buf(),
        proxy_upstream: String::new(),
    }
}

fn proxy_settings(upstream: &str) -> InstanceDataSettings {
    InstanceDataSettings {
        listen: "127.0.0.1:0".parse().unwrap(),
        provider: ProviderKind::Proxy,
        fs_dir: std::path::PathBuf::new(),
        proxy_upstream: upstream.to_string(),
    }
}

/// Real HTTP upstream imitating a metadata endpoint.
async fn spawn_mock_metadata() -> SocketAddr {
    let app = Router::new()
        .route(
            "/latest/meta-data/instance-id",
            get(|| async { "i-0123456789abcdef0" }),
        )
        .route(
            "/latest/meta-data/local-ipv4",
            get(|| async { "10.1.2.3" }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn should_serve_static_metadata_files() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("latest").join("meta-data");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("instance-id"), "i-deadbeef").unwrap();

    let server = TestServer::start(fs_settings(dir.path())).await;

    let response = reqwest::get(server.url("/latest/meta-data/instance-id"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "i-deadbeef");

    let missing = reqwest::get(server.url("/latest/meta-data/ami-id"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn should_relay_requests_through_proxy_provider() {
    let upstream = spawn_mock_metadata().await;
    let server = TestServer::start(proxy_settings(&upstream.to_string())).await;

    let response = reqwest::get(server.url("/latest/meta-data/instance-id"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(reqwest::header::CONTENT_LENGTH),
        Some(&reqwest::header::HeaderValue::from_static("19"))
    );
    assert_eq!(response.text().await.unwrap(), "i-0123456789abcdef0");

    let response = reqwest::get(server.url("/latest/meta-data/local-ipv4"))
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "10.1.2.3");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn should_relay_upstream_status_codes() {
    let upstream = spawn_mock_metadata().await;
    let server = TestServer::start(proxy_settings(&upstream.to_string())).await;

    let response = reqwest::get(server.url("/no/such/path")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn should_return_bad_gateway_when_upstream_is_down() {
    // Grab a free port, then close it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let server = TestServer::start(proxy_settings(&dead.to_string())).await;

    let response = reqwest::get(server.url("/latest/meta-data/instance-id"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.bytes().await.unwrap().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn should_reject_unconfigured_provider() {
    let settings = InstanceDataSettings {
        listen: "127.0.0.1:0".parse().unwrap(),
        provider: ProviderKind::None,
        fs_dir: std::path::PathBuf::new(),
        proxy_upstream: String::new(),
    };

    assert!(InstanceDataServer::new(&settings).is_err());
}

#[tokio::test]
async fn should_stop_cleanly_on_shutdown_signal() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(fs_settings(dir.path())).await;

    let result = tokio::time::timeout(Duration::from_secs(2), server.stop()).await;

    assert!(result.unwrap().is_ok());
}
