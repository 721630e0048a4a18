//! DNS zone routing, reply synthesis, forwarding and serving.

pub mod forwarder;
pub mod responder;
pub mod router;
pub mod server;

pub use forwarder::Forwarder;
pub use router::{AnswerSet, ZoneRouter};
pub use server::DnsServer;
