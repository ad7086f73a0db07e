use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "IRR";
const DEFAULT_CART_TTL_DAYS: i64 = 14;
const DEFAULT_ATTEMPT_TTL_HOURS: i64 = 48;
const DEFAULT_STALE_ORDER_TTL_DAYS: i64 = 7;
const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = 24;
const DEFAULT_RECEIPT_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Currency assumed for carts and orders when the catalog does not say
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Days until an untouched cart becomes eligible for cleanup
    #[serde(default = "default_cart_ttl_days")]
    pub cart_ttl_days: i64,

    /// Hours an unresolved payment attempt may sit in a pre-approval state
    /// before the sweeper expires it. Attempts awaiting admin review never
    /// expire.
    #[serde(default = "default_attempt_ttl_hours")]
    pub payment_attempt_ttl_hours: i64,

    /// Days a pending-payment order with no live attempts survives before the
    /// sweeper cancels it
    #[serde(default = "default_stale_order_ttl_days")]
    pub stale_order_ttl_days: i64,

    /// Hours an idempotency record is replayable before being purged
    #[serde(default = "default_idempotency_ttl_hours")]
    pub idempotency_ttl_hours: i64,

    /// Maximum accepted receipt upload size in bytes
    #[serde(default = "default_receipt_max_bytes")]
    pub receipt_max_bytes: usize,

    /// Directory receipts are written to by the filesystem blob store
    #[serde(default = "default_receipt_storage_dir")]
    pub receipt_storage_dir: String,

    /// Interval between sweeper passes (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Rate limiting: requests per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,

    /// Rate limiting: window size (seconds)
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_cart_ttl_days() -> i64 {
    DEFAULT_CART_TTL_DAYS
}
fn default_attempt_ttl_hours() -> i64 {
    DEFAULT_ATTEMPT_TTL_HOURS
}
fn default_stale_order_ttl_days() -> i64 {
    DEFAULT_STALE_ORDER_TTL_DAYS
}
fn default_idempotency_ttl_hours() -> i64 {
    DEFAULT_IDEMPOTENCY_TTL_HOURS
}
fn default_receipt_max_bytes() -> usize {
    DEFAULT_RECEIPT_MAX_BYTES
}
fn default_receipt_storage_dir() -> String {
    "data/receipts".to_string()
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}
fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

impl AppConfig {
    /// Construct a configuration programmatically (used by tests and tools).
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            cart_ttl_days: default_cart_ttl_days(),
            payment_attempt_ttl_hours: default_attempt_ttl_hours(),
            stale_order_ttl_days: default_stale_order_ttl_days(),
            idempotency_ttl_hours: default_idempotency_ttl_hours(),
            receipt_max_bytes: default_receipt_max_bytes(),
            receipt_storage_dir: default_receipt_storage_dir(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rate_limit_requests_per_window: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_secs(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }
}

/// Loads configuration from `config/{default,<env>}.toml` plus `APP__*`
/// environment variables (double underscore separates nesting).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment)?
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(
        environment = %cfg.environment,
        port = cfg.port,
        "configuration loaded"
    );
    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("academy_api={level},tower_http=info")));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
