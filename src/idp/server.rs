//! HTTP frontend for the instance-data provider.
//!
//! Wraps the selected provider with request logging and exposes the same
//! start/graceful-shutdown contract as the DNS server.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use metrics::counter;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use super::build_provider;
use crate::config::InstanceDataSettings;
use crate::error::{Error, Result};

/// Instance-data HTTP server with its provider built but not yet bound.
pub struct InstanceDataServer {
    listen: SocketAddr,
    app: Router,
}

impl InstanceDataServer {
    /// Select and build the configured provider, wrapped in request logging.
    pub fn new(cfg: &InstanceDataSettings) -> Result<Self> {
        let app = build_provider(cfg)?.layer(middleware::from_fn(log_request));
        Ok(Self {
            listen: cfg.listen,
            app,
        })
    }

    /// Bind the HTTP listener. A bind failure is fatal.
    pub async fn bind(self) -> Result<BoundInstanceDataServer> {
        let listener = TcpListener::bind(self.listen)
            .await
            .map_err(|source| Error::Bind {
                transport: "http",
                addr: self.listen,
                source,
            })?;

        Ok(BoundInstanceDataServer {
            listener,
            app: self.app,
        })
    }
}

/// Instance-data server with its socket bound, ready to serve.
pub struct BoundInstanceDataServer {
    listener: TcpListener,
    app: Router,
}

impl BoundInstanceDataServer {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the shutdown signal flips, then drain in-flight
    /// requests. The caller bounds the drain with a deadline.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(net = "http", addr = %self.listener.local_addr()?, "started");

        axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

        Ok(())
    }
}

async fn log_request(
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    counter!("http_requests_total").increment(1);
    info!(client = %client, uri = %req.uri(), "incoming request");
    next.run(req).await
}
