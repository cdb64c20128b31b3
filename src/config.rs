// Process configuration: listen address, provider entries, upstream timeout and
// cache tuning, from the command line with environment fallbacks.

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;

use crate::{cache::CacheConfig, providers::RegistryConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "company-gateway")]
#[command(version)]
#[command(about = "Country-routed company lookup gateway over legacy registry services")]
pub struct Cli {
    /// Provider entries in the form `countryCode=url`
    #[arg(value_name = "CODE=URL")]
    pub providers: Vec<String>,

    /// Listening IP address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 9000)]
    pub port: u16,

    /// Per-request timeout against a provider before falling back to the cache
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value_t = 500)]
    pub upstream_timeout_ms: u64,

    /// Lifetime of cached company records, 0 keeps them forever
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 86_400)]
    pub cache_ttl_secs: u64,

    /// Interval of the background cache sweep, 0 sweeps on access instead
    #[arg(long, env = "CACHE_CLEANUP_SECS", default_value_t = 0)]
    pub cache_cleanup_secs: u64,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.host))?;

        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            upstream_timeout: Duration::from_millis(self.upstream_timeout_ms),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Some(Duration::from_secs(self.cache_ttl_secs)),
            cleanup_interval: Some(Duration::from_secs(self.cache_cleanup_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["company-gateway"]).unwrap();

        assert!(cli.providers.is_empty());
        assert_eq!(cli.upstream_timeout_ms, 500);
        assert_eq!(
            cli.registry_config().upstream_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(
            cli.cache_config().default_ttl,
            Some(Duration::from_secs(24 * 60 * 60))
        );
    }

    #[test]
    fn test_providers_and_overrides() {
        let cli = Cli::try_parse_from([
            "company-gateway",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--cache-ttl-secs",
            "0",
            "us=http://localhost:9001",
            "mx=http://localhost:9003",
        ])
        .unwrap();

        assert_eq!(
            cli.providers,
            vec!["us=http://localhost:9001", "mx=http://localhost:9003"]
        );
        assert_eq!(
            cli.listen_addr().unwrap(),
            "127.0.0.1:9100".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cli.cache_config().default_ttl, Some(Duration::ZERO));
    }

    #[test]
    fn test_invalid_host() {
        let cli = Cli::try_parse_from(["company-gateway", "--host", "not-an-ip"]).unwrap();
        assert!(cli.listen_addr().is_err());
    }
}
