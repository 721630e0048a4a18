//! Error types for the Mirage servers.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for Mirage operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("DNS protocol error: {0}")]
    Protocol(#[from] hickory_proto::error::ProtoError),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors. All of these are fatal at startup,
/// before any listener binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid IP: {value:?}")]
    InvalidIp { value: String },

    #[error("unspecified IP not allowed: {value:?}")]
    UnspecifiedIp { value: String },

    #[error("invalid instance-data IP (must be a specified IPv4 address): {value:?}")]
    InvalidDataIp { value: String },

    #[error("invalid zone name: {value:?}")]
    InvalidZone { value: String },

    #[error("zone name cannot be empty")]
    EmptyZoneName,

    #[error("unsupported instance-data provider: {kind}")]
    UnsupportedProvider { kind: String },

    #[error("instance-data fs provider requires a directory")]
    EmptyFsDir,

    #[error("instance-data proxy provider requires an upstream address")]
    EmptyProxyUpstream,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
