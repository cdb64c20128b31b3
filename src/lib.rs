// Company lookup gateway over country-specific legacy registry services

pub mod cache;
pub mod config;
pub mod handler;
pub mod normalizer;
pub mod providers;
pub mod server;

// Re-export key types for convenience
pub use cache::{CacheConfig, CacheStats, ResilienceCache};
pub use handler::{CompanyLookupHandler, CompanyQuery, GatewayError};
pub use normalizer::{
    normalize, validate_declared_version, CanonicalCompanyRecord, NormalizationError,
    SchemaVariant,
};
pub use providers::{Provider, ProviderError, ProviderRegistry, RegistryConfig};
