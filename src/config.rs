//! Configuration loading and validation.
//!
//! Configuration is built in three explicit stages: built-in defaults,
//! then `MIRAGE_*` environment variables, then the optional TOML file.
//! The merged result is validated once, before any listener binds.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::iface::split_ips;

/// Main configuration, immutable after [`Config::load`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable debug-level logging.
    pub verbose: bool,
    pub dns: DnsSettings,
    pub instance_data: InstanceDataSettings,
    pub metrics: MetricsSettings,
}

/// Settings for the DNS sinkhole server.
#[derive(Debug, Clone)]
pub struct DnsSettings {
    /// Address both DNS transports (UDP and TCP) bind to.
    pub listen: SocketAddr,

    /// Upstream resolver receiving every query that matches no zone.
    pub upstream: SocketAddr,

    /// Static override for the `instance-data.` zone. When unset the host
    /// interfaces are scanned instead.
    pub data_ip: Option<IpAddr>,

    /// Blackhole zone names.
    pub zones: Vec<String>,

    /// Sinkhole addresses (mixed v4/v6) answered for every blackhole zone.
    pub ips: Vec<String>,
}

/// Settings for the instance-data HTTP server.
#[derive(Debug, Clone)]
pub struct InstanceDataSettings {
    pub listen: SocketAddr,
    pub provider: ProviderKind,
    /// Root directory for the `fs` provider.
    pub fs_dir: PathBuf,
    /// `host:port` of the real metadata backend for the `proxy` provider.
    pub proxy_upstream: String,
}

/// Metrics exporter settings.
#[derive(Debug, Clone)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen: SocketAddr,
}

/// Which instance-data provider serves HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    None,
    Fs,
    Proxy,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "fs" => Ok(Self::Fs),
            "proxy" => Ok(Self::Proxy),
            _ => Err(ConfigError::UnsupportedProvider {
                kind: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Fs => f.write_str("fs"),
            Self::Proxy => f.write_str("proxy"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: true,
            dns: DnsSettings {
                listen: "0.0.0.0:53".parse().expect("valid default"),
                upstream: "1.1.1.1:53".parse().expect("valid default"),
                data_ip: None,
                zones: vec![
                    "does-not-exist.example.com.".to_string(),
                    "example.invalid.".to_string(),
                ],
                ips: vec!["169.254.169.254".to_string(), "fd00:ec2::254".to_string()],
            },
            instance_data: InstanceDataSettings {
                listen: "0.0.0.0:8773".parse().expect("valid default"),
                provider: ProviderKind::Proxy,
                fs_dir: PathBuf::from("./data"),
                proxy_upstream: "169.254.169.254:80".to_string(),
            },
            metrics: MetricsSettings {
                enabled: false,
                listen: "127.0.0.1:9100".parse().expect("valid default"),
            },
        }
    }
}

/// Partial configuration layer. Fields left unset keep the value of the
/// previous stage.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Overlay {
    verbose: Option<bool>,
    #[serde(default)]
    dns: DnsOverlay,
    #[serde(default)]
    instance_data: InstanceDataOverlay,
    #[serde(default)]
    metrics: MetricsOverlay,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DnsOverlay {
    listen: Option<SocketAddr>,
    upstream: Option<SocketAddr>,
    data_ip: Option<IpAddr>,
    zones: Option<Vec<String>>,
    ips: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstanceDataOverlay {
    listen: Option<SocketAddr>,
    provider: Option<ProviderKind>,
    fs_dir: Option<PathBuf>,
    proxy_upstream: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetricsOverlay {
    enabled: Option<bool>,
    listen: Option<SocketAddr>,
}

impl Overlay {
    fn parse(content: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    fn from_env<I>(vars: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overlay = Self::default();

        for (key, value) in vars {
            match key.as_str() {
                "MIRAGE_VERBOSE" => overlay.verbose = Some(parse_env(&key, &value)?),
                "MIRAGE_DNS_LISTEN" => overlay.dns.listen = Some(parse_env(&key, &value)?),
                "MIRAGE_DNS_UPSTREAM" => overlay.dns.upstream = Some(parse_env(&key, &value)?),
                "MIRAGE_DNS_DATA_IP" => overlay.dns.data_ip = Some(parse_env(&key, &value)?),
                "MIRAGE_DNS_ZONES" => overlay.dns.zones = Some(split_csv(&value)),
                "MIRAGE_DNS_IPS" => overlay.dns.ips = Some(split_csv(&value)),
                "MIRAGE_DATA_LISTEN" => {
                    overlay.instance_data.listen = Some(parse_env(&key, &value)?);
                }
                "MIRAGE_DATA_PROVIDER" => {
                    overlay.instance_data.provider = Some(parse_env(&key, &value)?);
                }
                "MIRAGE_DATA_FS_DIR" => {
                    overlay.instance_data.fs_dir = Some(PathBuf::from(&value));
                }
                "MIRAGE_DATA_PROXY_UPSTREAM" => {
                    overlay.instance_data.proxy_upstream = Some(value);
                }
                "MIRAGE_METRICS_ENABLED" => {
                    overlay.metrics.enabled = Some(parse_env(&key, &value)?);
                }
                "MIRAGE_METRICS_LISTEN" => {
                    overlay.metrics.listen = Some(parse_env(&key, &value)?);
                }
                _ => {}
            }
        }

        Ok(overlay)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> std::result::Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration: defaults, then environment, then the optional
    /// TOML file, validated as a single step after the merge.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        config.apply(Overlay::from_env(std::env::vars())?);

        if let Some(path) = path {
            let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
            config.apply(Overlay::parse(&content)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string over the defaults.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply(Overlay::parse(content)?);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overlay: Overlay) {
        if let Some(verbose) = overlay.verbose {
            self.verbose = verbose;
        }

        if let Some(listen) = overlay.dns.listen {
            self.dns.listen = listen;
        }
        if let Some(upstream) = overlay.dns.upstream {
            self.dns.upstream = upstream;
        }
        if let Some(data_ip) = overlay.dns.data_ip {
            self.dns.data_ip = Some(data_ip);
        }
        if let Some(zones) = overlay.dns.zones {
            self.dns.zones = zones;
        }
        if let Some(ips) = overlay.dns.ips {
            self.dns.ips = ips;
        }

        if let Some(listen) = overlay.instance_data.listen {
            self.instance_data.listen = listen;
        }
        if let Some(provider) = overlay.instance_data.provider {
            self.instance_data.provider = provider;
        }
        if let Some(fs_dir) = overlay.instance_data.fs_dir {
            self.instance_data.fs_dir = fs_dir;
        }
        if let Some(proxy_upstream) = overlay.instance_data.proxy_upstream {
            self.instance_data.proxy_upstream = proxy_upstream;
        }

        if let Some(enabled) = overlay.metrics.enabled {
            self.metrics.enabled = enabled;
        }
        if let Some(listen) = overlay.metrics.listen {
            self.metrics.listen = listen;
        }
    }

    /// Validate the merged configuration.
    fn validate(&self) -> Result<()> {
        for zone in &self.dns.zones {
            if zone.trim().is_empty() {
                return Err(ConfigError::EmptyZoneName.into());
            }
        }

        split_ips(&self.dns.ips)?;

        if let Some(ip) = self.dns.data_ip {
            match ip {
                IpAddr::V4(v4) if !v4.is_unspecified() => {}
                _ => {
                    return Err(ConfigError::InvalidDataIp {
                        value: ip.to_string(),
                    }
                    .into());
                }
            }
        }

        match self.instance_data.provider {
            ProviderKind::None => {
                return Err(ConfigError::UnsupportedProvider {
                    kind: self.instance_data.provider.to_string(),
                }
                .into());
            }
            ProviderKind::Fs => {
                if self.instance_data.fs_dir.as_os_str().is_empty() {
                    return Err(ConfigError::EmptyFsDir.into());
                }
            }
            ProviderKind::Proxy => {
                if self.instance_data.proxy_upstream.is_empty() {
                    return Err(ConfigError::EmptyProxyUpstream.into());
                }
            }
        }

        Ok(())
    }
}
