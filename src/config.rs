use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    pub database: DatabaseConfig,
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Base URL of the CoinGecko-compatible REST API
    pub api_url: String,
    /// Optional API key, sent as `x-cg-pro-api-key`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Quote currency for prices (e.g., "usd")
    pub vs_currency: String,
    /// Number of coins by market cap to track
    pub top_n: u32,
    /// Days of price history used for the trailing mean
    pub history_days: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pause between per-coin history requests
    #[serde(default)]
    pub request_delay_ms: u64,
    /// Retries for the ranked coin list fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl MarketConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Fixed quantity bought each time a coin is undervalued
    pub buy_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Order endpoint; required unless running dry
    #[serde(default)]
    pub order_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Idle time between cycles
    pub interval_secs: u64,
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Positions per gain recomputation page
    #[serde(default = "default_page_size")]
    pub recompute_page_size: u32,
    /// Walk every page instead of only the first one
    #[serde(default)]
    pub paginate: bool,
}

fn default_page_size() -> u32 {
    20
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            recompute_page_size: default_page_size(),
            paginate: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Enable dry run mode (no real orders)
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("market.api_url", "https://api.coingecko.com/api/v3")?
            .set_default("market.vs_currency", "usd")?
            .set_default("market.top_n", 10)?
            .set_default("market.history_days", 30)?
            .set_default("strategy.buy_amount", "1")?
            .set_default("schedule.interval_secs", 3600)?
            .set_default("portfolio.recompute_page_size", 20)?
            .set_default("portfolio.paginate", false)?
            .set_default("database.url", "postgres://localhost/coinledger")?
            .set_default("database.max_connections", 5)?
            .set_default("dry_run.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("COINLEDGER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (COINLEDGER_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("COINLEDGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(dry_run: bool) -> Self {
        use rust_decimal_macros::dec;

        Self {
            market: MarketConfig {
                api_url: "https://api.coingecko.com/api/v3".to_string(),
                api_key: None,
                vs_currency: "usd".to_string(),
                top_n: 10,
                history_days: 30,
                request_timeout_ms: default_request_timeout_ms(),
                request_delay_ms: 0,
                max_retries: default_max_retries(),
                retry_backoff_ms: default_retry_backoff_ms(),
            },
            strategy: StrategyConfig {
                buy_amount: dec!(1),
            },
            execution: ExecutionConfig::default(),
            schedule: ScheduleConfig {
                interval_secs: 3600,
            },
            portfolio: PortfolioConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/coinledger".to_string(),
                max_connections: default_max_connections(),
                acquire_timeout_secs: default_acquire_timeout_secs(),
            },
            dry_run: DryRunConfig { enabled: dry_run },
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.strategy.buy_amount <= Decimal::ZERO {
            errors.push("buy_amount must be positive".to_string());
        }

        if self.market.top_n == 0 || self.market.top_n > 250 {
            errors.push("top_n must be between 1 and 250".to_string());
        }

        if self.market.history_days == 0 {
            errors.push("history_days must be positive".to_string());
        }

        if self.portfolio.recompute_page_size == 0 {
            errors.push("recompute_page_size must be positive".to_string());
        }

        if self.schedule.interval_secs == 0 {
            errors.push("interval_secs must be positive".to_string());
        }

        if !self.dry_run.enabled && self.execution.order_url.is_none() {
            errors.push("execution.order_url is required when dry run is disabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
