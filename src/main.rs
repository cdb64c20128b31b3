use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use company_gateway::{
    config::Cli, server, CompanyLookupHandler, ProviderRegistry, ResilienceCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("company_gateway={},tower_http=info", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting company gateway v{}", env!("CARGO_PKG_VERSION"));

    let providers = ProviderRegistry::build(&cli.providers, &cli.registry_config());
    if providers.is_empty() {
        warn!("no valid provider configured, every lookup will be rejected");
    }
    info!(
        providers = providers.len(),
        countries = ?providers.country_codes().collect::<Vec<_>>(),
        "provider registry built"
    );

    let cache = Arc::new(ResilienceCache::new(cli.cache_config()));
    if cache.spawn_janitor().is_some() {
        info!(every = ?cache.config().cleanup_interval, "cache janitor started");
    }

    let handler = CompanyLookupHandler::new(Arc::new(providers), cache);

    server::serve(cli.listen_addr()?, handler).await
}
