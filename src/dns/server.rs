//! Dual-listener DNS server.
//!
//! Serves the same zone router over UDP and TCP concurrently. Each
//! datagram and each TCP connection is handled by its own task; handler
//! failures are logged and the offending query dropped, matching the
//! fire-and-forget nature of DNS request handling.

use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::Message;
use hickory_proto::rr::LowerName;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use metrics::counter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tracing::{info, warn};

use super::forwarder::{Forwarder, MAX_UDP_PAYLOAD};
use super::responder::synthesize_reply;
use super::router::ZoneRouter;
use crate::config::DnsSettings;
use crate::error::{Error, Result};

/// DNS server with its routing table built but sockets not yet bound.
pub struct DnsServer {
    listen: SocketAddr,
    router: Arc<ZoneRouter>,
    forwarder: Forwarder,
}

impl DnsServer {
    /// Build the zone router from the settings. Interface discovery for the
    /// instance-data zone happens here, once.
    pub fn new(cfg: &DnsSettings) -> Result<Self> {
        Ok(Self {
            listen: cfg.listen,
            router: Arc::new(ZoneRouter::build(cfg)?),
            forwarder: Forwarder::new(cfg.upstream),
        })
    }

    /// Bind both transports. A bind failure on either is fatal.
    pub async fn bind(self) -> Result<BoundDnsServer> {
        let udp = UdpSocket::bind(self.listen)
            .await
            .map_err(|source| Error::Bind {
                transport: "udp",
                addr: self.listen,
                source,
            })?;
        let tcp = TcpListener::bind(self.listen)
            .await
            .map_err(|source| Error::Bind {
                transport: "tcp",
                addr: self.listen,
                source,
            })?;

        Ok(BoundDnsServer {
            udp: Arc::new(udp),
            tcp,
            handler: QueryHandler {
                router: self.router,
                forwarder: self.forwarder,
            },
        })
    }
}

/// DNS server with both sockets bound, ready to serve.
pub struct BoundDnsServer {
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
    handler: QueryHandler,
}

impl BoundDnsServer {
    pub fn udp_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn tcp_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Serve both transports until the shutdown signal flips or either
    /// transport fails. A failure in one transport tears the other down.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::try_join!(
            serve_udp(self.udp, self.handler.clone(), shutdown.clone()),
            serve_tcp(self.tcp, self.handler, shutdown),
        )?;
        Ok(())
    }
}

/// Shared per-query logic: route, synthesize or forward.
#[derive(Clone)]
struct QueryHandler {
    router: Arc<ZoneRouter>,
    forwarder: Forwarder,
}

impl QueryHandler {
    /// Handle one raw query; `None` means no reply is sent.
    async fn handle(&self, payload: &[u8], client: SocketAddr) -> Option<Vec<u8>> {
        counter!("dns_queries_total").increment(1);

        let query = match Message::from_bytes(payload) {
            Ok(query) => query,
            Err(err) => {
                warn!(client = %client, "failed to parse DNS message: {err}");
                return None;
            }
        };

        let Some(question) = query.queries().first() else {
            warn!(client = %client, "query has no questions");
            return None;
        };

        let qname = LowerName::from(question.name());
        if let Some(answers) = self.router.lookup(&qname) {
            let reply = synthesize_reply(&query, answers, client);
            match reply.to_bytes() {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(client = %client, "failed to encode reply: {err}");
                    None
                }
            }
        } else {
            counter!("dns_forwarded_total").increment(1);
            match self.forwarder.forward(payload).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    counter!("dns_forward_failures_total").increment(1);
                    warn!(client = %client, "proxy request failed: {err}");
                    None
                }
            }
        }
    }
}

async fn serve_udp(
    socket: Arc<UdpSocket>,
    handler: QueryHandler,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(net = "udp", addr = %socket.local_addr()?, "started");

    let mut buf = [0u8; MAX_UDP_PAYLOAD];
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            received = socket.recv_from(&mut buf) => {
                let (len, client) = match received {
                    Ok(received) => received,
                    Err(err) => {
                        warn!(net = "udp", "failed to receive datagram: {err}");
                        continue;
                    }
                };

                let payload = buf[..len].to_vec();
                let socket = Arc::clone(&socket);
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Some(reply) = handler.handle(&payload, client).await {
                        if let Err(err) = socket.send_to(&reply, client).await {
                            warn!(client = %client, "failed to send reply: {err}");
                        }
                    }
                });
            }
        }
    }
}

async fn serve_tcp(
    listener: TcpListener,
    handler: QueryHandler,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(net = "tcp", addr = %listener.local_addr()?, "started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, client)) => {
                        let handler = handler.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(serve_tcp_conn(stream, client, handler, shutdown));
                    }
                    Err(err) => warn!(net = "tcp", "failed to accept connection: {err}"),
                }
            }
        }
    }
}

/// Serve length-prefixed queries (RFC 1035 §4.2.2) on one connection until
/// the peer disconnects or shutdown is requested.
async fn serve_tcp_conn(
    mut stream: TcpStream,
    client: SocketAddr,
    handler: QueryHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // The length prefix is read with cancel-safe `read` calls so a
        // shutdown firing between them never discards frame bytes.
        let mut len_buf = [0u8; 2];
        let mut filled = 0;
        while filled < len_buf.len() {
            tokio::select! {
                _ = shutdown.changed() => return,
                read = stream.read(&mut len_buf[filled..]) => match read {
                    // Zero bytes means the peer closed the connection.
                    Ok(0) | Err(_) => return,
                    Ok(n) => filled += n,
                }
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        if let Err(err) = stream.read_exact(&mut payload).await {
            warn!(client = %client, "truncated TCP query: {err}");
            return;
        }

        let Some(reply) = handler.handle(&payload, client).await else {
            continue;
        };

        let Ok(reply_len) = u16::try_from(reply.len()) else {
            warn!(client = %client, "reply too large for TCP framing");
            continue;
        };

        let mut framed = Vec::with_capacity(reply.len() + 2);
        framed.extend_from_slice(&reply_len.to_be_bytes());
        framed.extend_from_slice(&reply);
        if let Err(err) = stream.write_all(&framed).await {
            warn!(client = %client, "failed to send reply: {err}");
            return;
        }
    }
}
