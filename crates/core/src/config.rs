use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::product::ProductId;
use crate::negotiation::state::Terms;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub default_product: String,
    /// Most recent turns retained per session and handed to the fallback
    /// responder as context.
    pub history_window: usize,
    pub products: Vec<ProductConfig>,
}

/// Negotiation terms for one catalog item. Every field is required: a
/// missing threshold is a startup failure, never a silent default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: String,
    pub name: String,
    pub start_price: i64,
    pub floor_price: i64,
    pub round1_increment: i64,
    pub round1_counter_floor: i64,
    pub round2_accept_threshold: i64,
    pub round2_tolerance: i64,
    pub round2_counter_price: i64,
    pub round3_accept_threshold: i64,
    pub final_concession_floor: i64,
    pub final_concession_price: i64,
}

impl ProductConfig {
    pub fn terms(&self) -> Terms {
        Terms {
            product_id: ProductId(self.id.clone()),
            product_name: self.name.clone(),
            start_price: self.start_price,
            floor_price: self.floor_price,
            round1_increment: self.round1_increment,
            round1_counter_floor: self.round1_counter_floor,
            round2_accept_threshold: self.round2_accept_threshold,
            round2_tolerance: self.round2_tolerance,
            round2_counter_price: self.round2_counter_price,
            round3_accept_threshold: self.round3_accept_threshold,
            final_concession_floor: self.final_concession_floor,
            final_concession_price: self.final_concession_price,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub default_product: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig {
                default_product: "bluetooth_earphones".to_string(),
                history_window: 12,
                products: default_products(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

/// The shop's stock shelf. Thresholds are derived from each item's selling
/// range: the range top is the opening ask and the range bottom the floor.
fn default_products() -> Vec<ProductConfig> {
    vec![
        ProductConfig {
            id: "wired_earphones".to_string(),
            name: "Wired Earphones".to_string(),
            start_price: 220,
            floor_price: 180,
            round1_increment: 10,
            round1_counter_floor: 205,
            round2_accept_threshold: 200,
            round2_tolerance: 10,
            round2_counter_price: 210,
            round3_accept_threshold: 195,
            final_concession_floor: 185,
            final_concession_price: 195,
        },
        ProductConfig {
            id: "bluetooth_earphones".to_string(),
            name: "Bluetooth Earphones".to_string(),
            start_price: 800,
            floor_price: 650,
            round1_increment: 25,
            round1_counter_floor: 740,
            round2_accept_threshold: 720,
            round2_tolerance: 30,
            round2_counter_price: 750,
            round3_accept_threshold: 700,
            final_concession_floor: 670,
            final_concession_price: 700,
        },
        ProductConfig {
            id: "headphones".to_string(),
            name: "Headphones".to_string(),
            start_price: 2200,
            floor_price: 1600,
            round1_increment: 100,
            round1_counter_floor: 1950,
            round2_accept_threshold: 1900,
            round2_tolerance: 100,
            round2_counter_price: 2000,
            round3_accept_threshold: 1800,
            final_concession_floor: 1650,
            final_concession_price: 1800,
        },
        ProductConfig {
            id: "bluetooth_speaker".to_string(),
            name: "Bluetooth Speaker".to_string(),
            start_price: 1600,
            floor_price: 1200,
            round1_increment: 50,
            round1_counter_floor: 1450,
            round2_accept_threshold: 1400,
            round2_tolerance: 75,
            round2_counter_price: 1475,
            round3_accept_threshold: 1350,
            final_concession_floor: 1250,
            final_concession_price: 1350,
        },
    ]
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("haggle.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Terms for every configured product, ready for the session registry.
    pub fn terms_catalog(&self) -> Vec<Terms> {
        self.catalog.products.iter().map(ProductConfig::terms).collect()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(default_product) = catalog.default_product {
                self.catalog.default_product = default_product;
            }
            if let Some(history_window) = catalog.history_window {
                self.catalog.history_window = history_window;
            }
            if let Some(products) = catalog.products {
                self.catalog.products = products;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HAGGLE_CATALOG_DEFAULT_PRODUCT") {
            self.catalog.default_product = value;
        }
        if let Some(value) = read_env("HAGGLE_CATALOG_HISTORY_WINDOW") {
            self.catalog.history_window =
                parse_usize("HAGGLE_CATALOG_HISTORY_WINDOW", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HAGGLE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HAGGLE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HAGGLE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HAGGLE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("HAGGLE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("HAGGLE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HAGGLE_SERVER_PORT") {
            self.server.port = parse_u16("HAGGLE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HAGGLE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("HAGGLE_LOGGING_LEVEL").or_else(|| read_env("HAGGLE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HAGGLE_LOGGING_FORMAT").or_else(|| read_env("HAGGLE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(default_product) = overrides.default_product {
            self.catalog.default_product = default_product;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("haggle.toml"), PathBuf::from("config/haggle.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.products.is_empty() {
        return Err(ConfigError::Validation(
            "catalog.products must list at least one product".to_string(),
        ));
    }

    if catalog.history_window < 2 {
        return Err(ConfigError::Validation(
            "catalog.history_window must be at least 2 turns".to_string(),
        ));
    }

    let mut seen = std::collections::BTreeSet::new();
    for product in &catalog.products {
        if product.id.trim().is_empty() {
            return Err(ConfigError::Validation("catalog product id must not be empty".to_string()));
        }
        if !seen.insert(product.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "catalog product id `{}` is listed twice",
                product.id
            )));
        }
        validate_product(product)?;
    }

    if !catalog.products.iter().any(|product| product.id == catalog.default_product) {
        return Err(ConfigError::Validation(format!(
            "catalog.default_product `{}` is not in catalog.products",
            catalog.default_product
        )));
    }

    Ok(())
}

fn validate_product(product: &ProductConfig) -> Result<(), ConfigError> {
    let id = &product.id;

    if product.floor_price < 1 {
        return Err(ConfigError::Validation(format!(
            "product `{id}`: floor_price must be at least 1"
        )));
    }
    if product.floor_price > product.start_price {
        return Err(ConfigError::Validation(format!(
            "product `{id}`: floor_price {} exceeds start_price {}",
            product.floor_price, product.start_price
        )));
    }
    if product.round1_increment < 0 || product.round2_tolerance < 0 {
        return Err(ConfigError::Validation(format!(
            "product `{id}`: round1_increment and round2_tolerance must not be negative"
        )));
    }

    // Everything the engine may ever quote or accept must sit at or above
    // the floor, so the floor guardrail cannot be defeated by configuration.
    let at_or_above_floor = [
        ("round1_counter_floor", product.round1_counter_floor),
        ("round2_accept_threshold", product.round2_accept_threshold),
        ("round2_counter_price", product.round2_counter_price),
        ("round3_accept_threshold", product.round3_accept_threshold),
        ("final_concession_floor", product.final_concession_floor),
        ("final_concession_price", product.final_concession_price),
    ];
    for (field, value) in at_or_above_floor {
        if value < product.floor_price {
            return Err(ConfigError::Validation(format!(
                "product `{id}`: {field} {} is below floor_price {}",
                value, product.floor_price
            )));
        }
    }

    if product.round2_accept_threshold - product.round2_tolerance < product.floor_price {
        return Err(ConfigError::Validation(format!(
            "product `{id}`: round2 tolerance band dips below floor_price"
        )));
    }
    if product.final_concession_floor > product.round3_accept_threshold {
        return Err(ConfigError::Validation(format!(
            "product `{id}`: final_concession_floor exceeds round3_accept_threshold"
        )));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    default_product: Option<String>,
    history_window: Option<usize>,
    products: Option<Vec<ProductConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn default_catalog_passes_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::default();
        config.validate().map_err(|err| format!("default config should validate: {err}"))?;

        ensure(config.catalog.products.len() == 4, "default shop stocks four items")?;
        ensure(config.catalog.history_window == 12, "default history window is 12 turns")?;
        ensure(
            config.terms_catalog().iter().all(|terms| terms.floor_price <= terms.start_price),
            "every default product floors below its start price",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HAGGLE_MODEL", "shopkeeper-7b");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("haggle.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "${TEST_HAGGLE_MODEL}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.model == "shopkeeper-7b",
                "model should be interpolated from the environment",
            )
        })();

        clear_vars(&["TEST_HAGGLE_MODEL"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_LOG_LEVEL", "warn");
        env::set_var("HAGGLE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["HAGGLE_LOG_LEVEL", "HAGGLE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_LLM_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("haggle.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env model should win over the file")?;
            ensure(config.logging.level == "debug", "override log level should win over the file")
        })();

        clear_vars(&["HAGGLE_LLM_MODEL"]);
        result
    }

    #[test]
    fn floor_above_start_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("haggle.toml");
        fs::write(
            &path,
            r#"
[catalog]
default_product = "clay_lamp"

[[catalog.products]]
id = "clay_lamp"
name = "Clay Lamp"
start_price = 100
floor_price = 150
round1_increment = 10
round1_counter_floor = 160
round2_accept_threshold = 160
round2_tolerance = 5
round2_counter_price = 165
round3_accept_threshold = 155
final_concession_floor = 152
final_concession_price = 155
"#,
        )
        .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };

        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("floor_price")
        );
        ensure(has_message, "validation failure should name floor_price")
    }

    #[test]
    fn product_with_missing_threshold_is_a_parse_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("haggle.toml");
        // final_concession_price is deliberately absent.
        fs::write(
            &path,
            r#"
[[catalog.products]]
id = "clay_lamp"
name = "Clay Lamp"
start_price = 150
floor_price = 100
round1_increment = 10
round1_counter_floor = 130
round2_accept_threshold = 120
round2_tolerance = 10
round2_counter_price = 125
round3_accept_threshold = 115
final_concession_floor = 105
"#,
        )
        .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected parse failure for missing threshold".to_string()),
                Err(error) => error,
            };

        ensure(
            matches!(error, ConfigError::ParseFile { .. }),
            "missing required product field should fail at parse time",
        )
    }

    #[test]
    fn duplicate_product_ids_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let mut config = AppConfig::default();
        let duplicate = config.catalog.products[0].clone();
        config.catalog.products.push(duplicate);

        let error = match config.validate() {
            Ok(()) => return Err("expected duplicate id to fail validation".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("twice")),
            "duplicate id error should say the id is listed twice",
        )
    }

    #[test]
    fn openai_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing api key to fail validation".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
            "validation failure should name llm.api_key",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_LLM_API_KEY", "sk-super-secret");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-super-secret"), "debug output should not contain the key")?;
            ensure(
                config
                    .llm
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "sk-super-secret")
                    .unwrap_or(false),
                "api key should still be readable through expose_secret",
            )
        })();

        clear_vars(&["HAGGLE_LLM_API_KEY"]);
        result
    }
}
