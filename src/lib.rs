//! Mirage - a DNS sinkhole and fake cloud-metadata service.
//!
//! Mirage answers DNS queries for configured blackhole zones with fixed
//! sinkhole addresses, serves an `instance-data.` zone derived from the
//! host's private interface addresses (or a static override), forwards
//! everything else to a real upstream resolver, and emulates a cloud
//! instance-metadata endpoint over HTTP from either a static directory or
//! a transparent reverse proxy.
//!
//! # Architecture
//!
//! - [`config`]: defaults/env/file configuration with single-step validation
//! - [`iface`]: IP classification and host interface scanning
//! - [`dns`]: zone routing, reply synthesis, forwarding and the
//!   dual-transport (UDP + TCP) server
//! - [`idp`]: instance-data providers (filesystem, reverse proxy) and their
//!   HTTP frontend
//! - [`metrics`]: optional Prometheus exporter
//! - [`error`]: error types
//!
//! All routing tables and providers are built once at startup and shared
//! read-only by the concurrent request handlers.
//!
//! ```rust
//! let ips = vec!["169.254.169.254".to_string(), "fd00:ec2::254".to_string()];
//! let (v4, v6) = mirage::iface::split_ips(&ips).unwrap();
//! assert_eq!(v4.len(), 1);
//! assert_eq!(v6.len(), 1);
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod idp;
pub mod iface;
pub mod metrics;

pub use config::Config;
pub use error::{Error, Result};
