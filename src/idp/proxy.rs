//! Transparent reverse-proxy instance-data provider.
//!
//! Rewrites every inbound request to the configured upstream metadata
//! backend and relays its response. The upstream body is fully buffered
//! before replying, so the relayed response has a known length and is
//! decoupled from the upstream connection lifetime. Failures answer
//! 502 Bad Gateway; there are no retries.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{error, warn};

/// Inbound request bodies above this size are rejected.
const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    upstream: Arc<str>,
}

/// Build a provider relaying every request to `upstream` (`host:port`).
pub fn router(upstream: String) -> Router {
    let state = ProxyState {
        client: reqwest::Client::new(),
        upstream: upstream.into(),
    };

    Router::new().fallback(forward_request).with_state(state)
}

async fn forward_request(State(state): State<ProxyState>, req: Request) -> Response {
    let path_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let url = format!("http://{}{}", state.upstream, path_query);

    let method = req.method().clone();
    let mut headers = req.headers().clone();
    // reqwest derives the Host header from the rewritten URL.
    headers.remove(header::HOST);

    let body = match axum::body::to_bytes(req.into_body(), MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(err) => {
            warn!(url = %url, "failed to read request body: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let upstream_response = match state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!(url = %url, "request failed: {err}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();

    let body = match upstream_response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            error!(url = %url, "failed to read upstream body: {err}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len() as u64));

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
