//! Instance-data providers and their HTTP frontend.
//!
//! Exactly one provider variant is active per process, selected once at
//! startup from the configuration. There is no fallback chain between
//! variants.

pub mod fs;
pub mod proxy;
pub mod server;

pub use server::InstanceDataServer;

use axum::Router;

use crate::config::{InstanceDataSettings, ProviderKind};
use crate::error::{ConfigError, Result};

/// Build the configured provider. `none` and unknown kinds are startup
/// configuration errors.
pub fn build_provider(cfg: &InstanceDataSettings) -> Result<Router> {
    match cfg.provider {
        ProviderKind::Fs => Ok(fs::router(&cfg.fs_dir)),
        ProviderKind::Proxy => Ok(proxy::router(cfg.proxy_upstream.clone())),
        ProviderKind::None => Err(ConfigError::UnsupportedProvider {
            kind: cfg.provider.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(provider: ProviderKind) -> InstanceDataSettings {
        InstanceDataSettings {
            listen: "127.0.0.1:0".parse().unwrap(),
            provider,
            fs_dir: PathBuf::from("./data"),
            proxy_upstream: "127.0.0.1:80".to_string(),
        }
    }

    #[test]
    fn should_build_fs_and_proxy_providers() {
        assert!(build_provider(&settings(ProviderKind::Fs)).is_ok());
        assert!(build_provider(&settings(ProviderKind::Proxy)).is_ok());
    }

    #[test]
    fn should_reject_none_provider() {
        assert!(build_provider(&settings(ProviderKind::None)).is_err());
    }
}
