// Provider registry: maps a country code to the legacy registry service that
// answers for it. Built once at startup and read-only afterwards.

use std::{collections::HashMap, time::Duration};

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

// Worst-case wait on a provider before the cache fallback engages.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("entry {0:?} is not in the form code=url")]
    MissingSeparator(String),

    #[error("entry {0:?} has an empty country code")]
    EmptyCountryCode(String),

    #[error("invalid provider url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("provider url {0:?} has no host")]
    MissingHost(String),

    #[error("provider url {0:?} cannot carry a path")]
    CannotBeABase(String),

    #[error("failed to build outbound client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub upstream_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

/// An upstream legacy registry bound to one country code.
#[derive(Debug, Clone)]
pub struct Provider {
    country_code: String,
    base_url: Url,
    client: Client,
}

impl Provider {
    /// Parses a single `code=url` entry. The url must be absolute, with a
    /// scheme and a non-empty host.
    pub fn parse(entry: &str, config: &RegistryConfig) -> Result<Self, ProviderError> {
        let (code, raw_url) = entry
            .split_once('=')
            .ok_or_else(|| ProviderError::MissingSeparator(entry.to_string()))?;

        let code = code.trim();
        if code.is_empty() {
            return Err(ProviderError::EmptyCountryCode(entry.to_string()));
        }

        let base_url = parse_base_url(raw_url.trim())?;

        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            country_code: code.to_string(),
            base_url,
            client,
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `{base_url}/companies/{company_id}`, built on a copy so the stored
    /// base url never changes.
    pub fn company_url(&self, company_id: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| ProviderError::CannotBeABase(self.base_url.to_string()))?
            .pop_if_empty()
            .push("companies")
            .push(company_id);

        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ProviderError> {
    let url = Url::parse(raw).map_err(|source| ProviderError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(ProviderError::MissingHost(raw.to_string())),
    }

    if url.cannot_be_a_base() {
        return Err(ProviderError::CannotBeABase(raw.to_string()));
    }

    Ok(url)
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
}

impl ProviderRegistry {
    /// Builds the registry from `code=url` entries. Malformed entries are
    /// logged and skipped; on duplicate codes the last valid entry wins.
    pub fn build<I, S>(entries: I, config: &RegistryConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut providers = HashMap::new();

        for entry in entries {
            let entry = entry.as_ref();

            match Provider::parse(entry, config) {
                Ok(provider) => {
                    debug!(
                        country_code = provider.country_code(),
                        base_url = %provider.base_url(),
                        "registered provider"
                    );
                    providers.insert(provider.country_code.clone(), provider);
                }
                Err(e) => warn!(entry, error = %e, "skipping provider entry"),
            }
        }

        Self { providers }
    }

    pub fn lookup(&self, country_code: &str) -> Option<&Provider> {
        self.providers.get(country_code)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn country_codes(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
