// HTTP surface: routing, the required query parameter gate, health endpoint and
// the serve loop.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    catch_panic::CatchPanicLayer,
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::handler::{company_route, CompanyLookupHandler, CompanyQuery};

pub const COMPANY_ID: &str = "id";
pub const COUNTRY_CODE: &str = "county_iso";

// First non-empty value of `name` in a raw query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Rejects requests missing `id` or `county_iso` with 404 and hands the
/// validated values to the handler through the request extensions.
pub async fn require_company_query(mut request: Request, next: Next) -> Response {
    let query = request.uri().query().unwrap_or_default();

    let company_id = query_param(query, COMPANY_ID);
    let country_code = query_param(query, COUNTRY_CODE);

    match (company_id, country_code) {
        (Some(company_id), Some(country_code)) => {
            request.extensions_mut().insert(CompanyQuery {
                company_id,
                country_code,
            });
            next.run(request).await
        }
        _ => {
            debug!(uri = %request.uri(), "missing required query parameters");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn status() -> StatusCode {
    StatusCode::OK
}

pub fn router(handler: CompanyLookupHandler) -> Router {
    let company = Router::new()
        .route("/company", get(company_route))
        .route_layer(middleware::from_fn(require_company_query));

    Router::new()
        .route("/status", get(status))
        .merge(company)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(handler)
}

/// The router with trailing slashes stripped before routing.
pub fn app(handler: CompanyLookupHandler) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router(handler))
}

pub async fn serve(addr: SocketAddr, handler: CompanyLookupHandler) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "company gateway listening");

    axum::serve(
        listener,
        axum::ServiceExt::<Request>::into_make_service(app(handler)),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("company gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        let query = "id=v1&county_iso=us&id=v2";

        assert_eq!(query_param(query, COMPANY_ID), Some("v1".to_string()));
        assert_eq!(query_param(query, COUNTRY_CODE), Some("us".to_string()));
        assert_eq!(query_param(query, "missing"), None);
        assert_eq!(query_param("id=&county_iso=us", COMPANY_ID), None);
        assert_eq!(
            query_param("id=acme%20ltd", COMPANY_ID),
            Some("acme ltd".to_string())
        );
    }
}
