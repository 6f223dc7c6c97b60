//! Runtime configuration from environment variables
//!
//! Required variables abort startup when missing; tuning knobs fall back to
//! defaults matching the production pacing (10s per chain call, 20s per
//! points address, 60s triggers).

use std::env;
use std::time::Duration;

use super::chain::normalize_address;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the sync runtime
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Token contract (`idCounter`, `ownerOf`), lowercased
    pub token_contract: String,

    /// Points contract (`getPoints`), lowercased
    pub points_contract: String,

    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `*.sql` migrations
    pub schema_dir: String,

    /// HTTP listen port
    pub port: u16,

    /// HTTP client timeout for a single RPC call
    pub rpc_timeout_ms: u64,

    /// Minimum spacing between the starts of two chain calls
    pub call_spacing_ms: u64,

    /// Per-address floor for the points walk (never below `call_spacing_ms`)
    pub points_address_delay_ms: u64,

    pub token_sync_interval_ms: u64,
    pub points_sync_interval_ms: u64,
    pub counter_watch_interval_ms: u64,

    /// A held points lock older than this is reclaimable (0 = never)
    pub points_lock_ttl_secs: u64,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Required:
    /// - `RPC_URL`
    /// - `CONTRACT_ADDRESS`
    /// - `POINTS_CONTRACT_ADDRESS`
    /// - `POINTSFLOW_DB_PATH`
    ///
    /// Optional (defaults):
    /// - `POINTSFLOW_SCHEMA_DIR` (sql)
    /// - `PORT` (3000)
    /// - `RPC_TIMEOUT_MS` (10000)
    /// - `CALL_SPACING_MS` (10000)
    /// - `POINTS_ADDRESS_DELAY_MS` (20000)
    /// - `TOKEN_SYNC_INTERVAL_MS` (60000)
    /// - `POINTS_SYNC_INTERVAL_MS` (60000)
    /// - `COUNTER_WATCH_INTERVAL_MS` (60000)
    /// - `POINTS_LOCK_TTL_SECS` (21600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = required("RPC_URL")?;
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_URL must start with http:// or https://".to_string(),
            ));
        }

        let token_contract = contract_address("CONTRACT_ADDRESS")?;
        let points_contract = contract_address("POINTS_CONTRACT_ADDRESS")?;
        let db_path = required("POINTSFLOW_DB_PATH")?;

        let schema_dir = env::var("POINTSFLOW_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string());

        let call_spacing_ms = parse_or("CALL_SPACING_MS", 10_000);
        let mut points_address_delay_ms = parse_or("POINTS_ADDRESS_DELAY_MS", 20_000);
        if points_address_delay_ms < call_spacing_ms {
            log::warn!(
                "POINTS_ADDRESS_DELAY_MS ({}) is below CALL_SPACING_MS ({}), raising it",
                points_address_delay_ms,
                call_spacing_ms
            );
            points_address_delay_ms = call_spacing_ms;
        }

        Ok(Self {
            rpc_url,
            token_contract,
            points_contract,
            db_path,
            schema_dir,
            port: parse_or("PORT", 3000),
            rpc_timeout_ms: parse_or("RPC_TIMEOUT_MS", 10_000),
            call_spacing_ms,
            points_address_delay_ms,
            token_sync_interval_ms: parse_or("TOKEN_SYNC_INTERVAL_MS", 60_000),
            points_sync_interval_ms: parse_or("POINTS_SYNC_INTERVAL_MS", 60_000),
            counter_watch_interval_ms: parse_or("COUNTER_WATCH_INTERVAL_MS", 60_000),
            points_lock_ttl_secs: parse_or("POINTS_LOCK_TTL_SECS", 6 * 60 * 60),
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn call_spacing(&self) -> Duration {
        Duration::from_millis(self.call_spacing_ms)
    }

    pub fn points_address_delay(&self) -> Duration {
        Duration::from_millis(self.points_address_delay_ms)
    }

    pub fn points_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.points_lock_ttl_secs)
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVariable(name.to_string())),
    }
}

fn contract_address(name: &str) -> Result<String, ConfigError> {
    let raw = required(name)?;
    normalize_address(&raw)
        .map_err(|_| ConfigError::InvalidValue(format!("{} is not a 0x-prefixed 20-byte address", name)))
}

fn parse_or<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', defaulting to {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
