//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use dustsweep_connectors::BINANCE_API_URL;
use dustsweep_domain::Address;
use dustsweep_engine::InsertionOptions;
use dustsweep_exec::RetryPolicy;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Treasury used outside production when none is configured (`0x…dEaD`).
pub fn dev_treasury_address() -> Address {
    let mut bytes = [0u8; 20];
    bytes[18] = 0xde;
    bytes[19] = 0xad;
    Address::from_bytes(bytes)
}

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Sweep configuration
    pub sweep: SweepConfig,

    /// Route provider configuration
    pub providers: ProviderConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Protocol fee recipient
    pub treasury_address: Address,
    /// How long an intent can wait before streaming
    pub context_ttl: Duration,
    /// Tokens per batch in the execution context
    pub batch_size: usize,
    /// Fee placement tuning
    pub insertion: InsertionOptions,
}

/// Route provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Retry policy applied to every provider
    pub retry: RetryPolicy,
    /// LI.FI base URL; not queried when unset
    pub lifi_base_url: Option<String>,
    /// LI.FI API key
    pub lifi_api_key: Option<String>,
    /// Odos base URL; not queried when unset
    pub odos_base_url: Option<String>,
    /// Binance API base URL for native asset prices
    pub binance_base_url: String,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let sweep = Self::load_sweep_config(environment)?;
        let providers = Self::load_provider_config()?;

        Ok(Self {
            api,
            sweep,
            providers,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            sweep: SweepConfig {
                context_ttl: Duration::from_secs(60),
                ..SweepConfig::default()
            },
            providers: ProviderConfig {
                retry: RetryPolicy {
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                    request_timeout: Duration::from_secs(1),
                    ..RetryPolicy::default()
                },
                lifi_base_url: None,
                lifi_api_key: None,
                odos_base_url: None,
                binance_base_url: BINANCE_API_URL.to_string(),
            },
            environment: Environment::Test,
        }
    }

    /// Whether the daemon should run on stub providers.
    pub fn uses_stub_providers(&self) -> bool {
        self.environment == Environment::Test
            || (self.providers.lifi_base_url.is_none() && self.providers.odos_base_url.is_none())
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("DUSTSWEEP_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid DUSTSWEEP_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("DUSTSWEEP_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("DUSTSWEEP_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_sweep_config(environment: Environment) -> DaemonResult<SweepConfig> {
        let treasury_address = match env::var("DUSTSWEEP_TREASURY_ADDRESS") {
            Ok(raw) => Address::parse(&raw).map_err(|e| {
                DaemonError::Config(format!("Invalid DUSTSWEEP_TREASURY_ADDRESS: {}", e))
            })?,
            Err(_) if environment == Environment::Production => {
                return Err(DaemonError::Config(
                    "DUSTSWEEP_TREASURY_ADDRESS is required in production".to_string(),
                ));
            }
            Err(_) => dev_treasury_address(),
        };

        let ttl_secs = Self::load_parsed_env("DUSTSWEEP_CONTEXT_TTL_SECS", 300u64)?;
        let batch_size = Self::load_parsed_env("DUSTSWEEP_BATCH_SIZE", 10usize)?;
        if batch_size == 0 {
            return Err(DaemonError::Config("DUSTSWEEP_BATCH_SIZE must be positive".to_string()));
        }

        let defaults = InsertionOptions::default();
        let insertion = InsertionOptions {
            minimum_threshold_pct: Self::load_decimal_env(
                "DUSTSWEEP_MIN_THRESHOLD_PCT",
                defaults.minimum_threshold_pct,
            )?,
            safety_buffer: Self::load_decimal_env("DUSTSWEEP_SAFETY_BUFFER", defaults.safety_buffer)?,
            min_token_ratio: defaults.min_token_ratio,
        };

        Ok(SweepConfig {
            treasury_address,
            context_ttl: Duration::from_secs(ttl_secs),
            batch_size,
            insertion,
        })
    }

    fn load_provider_config() -> DaemonResult<ProviderConfig> {
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: Self::load_parsed_env("DUSTSWEEP_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(Self::load_parsed_env("DUSTSWEEP_RETRY_BASE_DELAY_MS", 250u64)?),
            max_delay: Duration::from_millis(Self::load_parsed_env("DUSTSWEEP_RETRY_MAX_DELAY_MS", 4000u64)?),
            request_timeout: Duration::from_millis(Self::load_parsed_env(
                "DUSTSWEEP_PROVIDER_TIMEOUT_MS",
                10_000u64,
            )?),
            ..defaults
        };

        Ok(ProviderConfig {
            retry,
            lifi_base_url: env::var("DUSTSWEEP_LIFI_BASE_URL").ok().filter(|s| !s.is_empty()),
            lifi_api_key: env::var("DUSTSWEEP_LIFI_API_KEY").ok().filter(|s| !s.is_empty()),
            odos_base_url: env::var("DUSTSWEEP_ODOS_BASE_URL").ok().filter(|s| !s.is_empty()),
            binance_base_url: env::var("DUSTSWEEP_BINANCE_BASE_URL")
                .unwrap_or_else(|_| BINANCE_API_URL.to_string()),
        })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            treasury_address: dev_treasury_address(),
            context_ttl: Duration::from_secs(300),
            batch_size: 10,
            insertion: InsertionOptions::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            sweep: SweepConfig::default(),
            providers: ProviderConfig {
                retry: RetryPolicy::default(),
                lifi_base_url: None,
                lifi_api_key: None,
                odos_base_url: None,
                binance_base_url: BINANCE_API_URL.to_string(),
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
