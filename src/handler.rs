// Company lookup pipeline: provider lookup, outbound fetch, cache fallback,
// declared-version gate, body read, normalization and write-through.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cache::ResilienceCache,
    normalizer::{normalize, validate_declared_version, NormalizationError},
    providers::{ProviderError, ProviderRegistry},
};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no provider registered for country {0:?}")]
    UnknownCountry(String),

    #[error("upstream unavailable and nothing cached for company {0:?}")]
    NoFallback(String),

    #[error("upstream declared unsupported content types {0:?}")]
    UnsupportedVersion(Vec<String>),

    #[error("failed to read upstream body: {0}")]
    BodyRead(#[source] reqwest::Error),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("invalid provider: {0}")]
    InvalidProvider(#[from] ProviderError),

    #[error("failed to serialize company record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownCountry(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoFallback(_) => StatusCode::NOT_FOUND,
            GatewayError::UnsupportedVersion(_)
            | GatewayError::BodyRead(_)
            | GatewayError::Normalization(_)
            | GatewayError::InvalidProvider(_)
            | GatewayError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Failures answer with the status code only; upstream details stay in the logs.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "company lookup failed");
        } else {
            debug!(error = %self, "company lookup rejected");
        }
        status.into_response()
    }
}

/// Validated query values, placed in the request extensions by the
/// required-parameter gate before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyQuery {
    pub company_id: String,
    pub country_code: String,
}

#[derive(Debug, Clone)]
pub struct CompanyLookupHandler {
    providers: Arc<ProviderRegistry>,
    cache: Arc<ResilienceCache>,
}

impl CompanyLookupHandler {
    pub fn new(providers: Arc<ProviderRegistry>, cache: Arc<ResilienceCache>) -> Self {
        Self { providers, cache }
    }

    pub fn cache(&self) -> &ResilienceCache {
        &self.cache
    }

    /// Runs the lookup and returns the serialized canonical record, either
    /// fresh from the provider or, when the provider cannot be reached, the
    /// last one cached for `company_id`.
    ///
    /// Dropping the returned future (the caller went away) drops the
    /// in-flight outbound request and body read with it.
    pub async fn lookup(
        &self,
        company_id: &str,
        country_code: &str,
    ) -> Result<Bytes, GatewayError> {
        let provider = self
            .providers
            .lookup(country_code)
            .ok_or_else(|| GatewayError::UnknownCountry(country_code.to_string()))?;

        let url = provider.company_url(company_id)?;
        debug!(%url, company_id, country_code, "fetching company from provider");

        let response = match provider.client().get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    company_id,
                    country_code,
                    error = %e,
                    "provider unavailable, trying cache"
                );
                return self.fallback(company_id);
            }
        };

        let content_types: Vec<String> = response
            .headers()
            .get_all(reqwest::header::CONTENT_TYPE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        if !validate_declared_version(&content_types) {
            return Err(GatewayError::UnsupportedVersion(content_types));
        }

        let body = response.bytes().await.map_err(GatewayError::BodyRead)?;
        let record = normalize(&body)?;
        let serialized = Bytes::from(record.to_json()?);

        // best effort: an entry already cached for this id is left untouched
        let (_, loaded) = self.cache.store_or_load(company_id, serialized.clone());
        debug!(company_id, already_cached = loaded, "company record normalized");

        Ok(serialized)
    }

    fn fallback(&self, company_id: &str) -> Result<Bytes, GatewayError> {
        match self.cache.get(company_id) {
            Some(cached) => {
                debug!(company_id, "serving cached company record");
                Ok(cached)
            }
            None => Err(GatewayError::NoFallback(company_id.to_string())),
        }
    }
}

pub async fn company_route(
    State(handler): State<CompanyLookupHandler>,
    Extension(query): Extension<CompanyQuery>,
) -> Result<Response, GatewayError> {
    let body = handler.lookup(&query.company_id, &query.country_code).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
