//! Verbatim relaying of unmatched queries to the upstream resolver.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Maximum accepted DNS payload over UDP.
pub const MAX_UDP_PAYLOAD: usize = 4096;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Relays raw DNS queries to a configured upstream resolver.
///
/// Both the query and the upstream reply are passed through verbatim;
/// answers are never rewritten or filtered. Failures are reported to the
/// caller and never retried.
#[derive(Debug, Clone)]
pub struct Forwarder {
    upstream: SocketAddr,
}

impl Forwarder {
    pub const fn new(upstream: SocketAddr) -> Self {
        Self { upstream }
    }

    /// Relay a raw query and return the raw upstream reply.
    pub async fn forward(&self, query: &[u8]) -> Result<Vec<u8>> {
        // The ephemeral socket must share the upstream's address family.
        let local: SocketAddr = if self.upstream.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.upstream).await?;
        socket.send(query).await?;

        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = tokio::time::timeout(UPSTREAM_TIMEOUT, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Upstream(format!("upstream {} timed out", self.upstream)))??;

        Ok(buf[..len].to_vec())
    }
}
