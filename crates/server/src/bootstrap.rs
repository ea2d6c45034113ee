use std::sync::Arc;
use std::time::Duration;

use haggle_agent::{OpenAiResponder, ProviderError, SessionRegistry};
use haggle_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fallback provider setup failed: {0}")]
    Provider(#[source] ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wire the session registry from an already-loaded config. `main` loads the
/// config first so logging can be initialized before bootstrap runs.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let responder = OpenAiResponder::from_config(&config.llm).map_err(BootstrapError::Provider)?;
    info!(
        event_name = "system.bootstrap.provider_configured",
        correlation_id = "bootstrap",
        provider = %config.llm.provider,
        model = %config.llm.model,
        "fallback provider configured"
    );

    let registry = Arc::new(SessionRegistry::new(
        config.terms_catalog(),
        config.catalog.history_window,
        Arc::new(responder),
        Duration::from_secs(config.llm.timeout_secs),
    ));
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        products = config.catalog.products.len(),
        default_product = %config.catalog.default_product,
        "negotiation catalog loaded"
    );

    Ok(Application { config, registry })
}
