//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use batpoints_core::{ConversionPolicy, TipPolicy, DEFAULT_SIGNUP_BONUS_POINTS};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/batpoints").
    pub data_dir: String,

    /// Permit running on the non-durable in-memory store.
    pub allow_memory_store: bool,

    /// HS256 secret used to verify user JWTs.
    pub jwt_secret: Option<String>,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Treasury relayer settings.
    pub chain: ChainSettings,

    /// Notification service endpoint (optional; events are logged otherwise).
    pub notification_url: Option<String>,

    /// Points credited once when an account is created.
    pub signup_bonus_points: i64,

    /// Tip bounds.
    pub tips: TipPolicy,

    /// Conversion rate and limits.
    pub conversions: ConversionPolicy,

    /// Seconds between recovery sweeps.
    pub recovery_interval_seconds: u64,

    /// Age after which a conversion with no chain trace is failed.
    pub recovery_stale_after_seconds: u64,
}

/// Treasury relayer settings.
#[derive(Debug, Clone, Default)]
pub struct ChainSettings {
    /// Relayer base URL.
    pub api_url: Option<String>,
    /// Relayer API key.
    pub api_key: Option<String>,
    /// Treasury wallet address.
    pub treasury_address: Option<String>,
    /// Mint when the treasury cannot cover a transfer.
    pub mint_enabled: bool,
}

impl ChainSettings {
    /// Whether enough is configured to talk to the relayer.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some() && self.treasury_address.is_some()
    }
}

/// Chain secrets file structure.
#[derive(Debug, Deserialize)]
struct ChainSecrets {
    api_url: String,
    api_key: String,
    #[serde(default)]
    treasury_address: Option<String>,
}

/// Shortest allowed gap between recovery sweeps.
pub const MIN_RECOVERY_INTERVAL_SECONDS: u64 = 1;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tips = TipPolicy {
            min_amount: env_or("MIN_TIP_AMOUNT", defaults.tips.min_amount),
            max_amount: env_or("MAX_TIP_AMOUNT", defaults.tips.max_amount),
            ..defaults.tips
        };

        let conversions = ConversionPolicy {
            points_to_token_rate: env_or::<Decimal>(
                "POINTS_TO_TOKEN_RATE",
                defaults.conversions.points_to_token_rate,
            ),
            min_conversion_points: env_or(
                "MIN_CONVERSION_POINTS",
                defaults.conversions.min_conversion_points,
            ),
            conversion_step_points: env_or(
                "CONVERSION_STEP_POINTS",
                defaults.conversions.conversion_step_points,
            ),
            max_pending_per_user: env_or(
                "MAX_PENDING_CONVERSIONS_PER_USER",
                defaults.conversions.max_pending_per_user,
            ),
            daily_limit_points: env_or(
                "DAILY_CONVERSION_LIMIT_POINTS",
                defaults.conversions.daily_limit_points,
            ),
            token_decimals: env_or("TOKEN_DECIMALS", defaults.conversions.token_decimals),
            chain_id: env_or("CHAIN_ID", defaults.conversions.chain_id),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            allow_memory_store: env_or("ALLOW_IN_MEMORY_LEDGER", defaults.allow_memory_store),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            chain: load_chain_settings(),
            notification_url: std::env::var("NOTIFICATION_URL").ok(),
            signup_bonus_points: env_or("SIGNUP_BONUS_POINTS", defaults.signup_bonus_points),
            tips,
            conversions,
            recovery_interval_seconds: env_or(
                "RECOVERY_INTERVAL_SECONDS",
                defaults.recovery_interval_seconds,
            )
            .max(MIN_RECOVERY_INTERVAL_SECONDS),
            recovery_stale_after_seconds: env_or(
                "RECOVERY_STALE_AFTER_SECONDS",
                defaults.recovery_stale_after_seconds,
            ),
        }
    }
}

/// Load relayer settings from the secrets file, then the environment.
fn load_chain_settings() -> ChainSettings {
    let mint_enabled = env_or("CHAIN_MINT_ENABLED", false);

    let secret_paths = [
        ".secrets/chain.json",
        "batpoints/.secrets/chain.json",
        "../.secrets/chain.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ChainSecrets>(path) {
            tracing::info!(path = %path, "Loaded chain secrets from file");
            return ChainSettings {
                api_url: Some(secrets.api_url),
                api_key: Some(secrets.api_key),
                treasury_address: secrets
                    .treasury_address
                    .or_else(|| std::env::var("TREASURY_ADDRESS").ok()),
                mint_enabled,
            };
        }
    }

    tracing::debug!("Chain secrets file not found, using environment variables");
    ChainSettings {
        api_url: std::env::var("CHAIN_API_URL").ok(),
        api_key: std::env::var("CHAIN_API_KEY").ok(),
        treasury_address: std::env::var("TREASURY_ADDRESS").ok(),
        mint_enabled,
    }
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/batpoints".into(),
            allow_memory_store: false,
            jwt_secret: None,
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            chain: ChainSettings::default(),
            notification_url: None,
            signup_bonus_points: DEFAULT_SIGNUP_BONUS_POINTS,
            tips: TipPolicy::default(),
            conversions: ConversionPolicy::default(),
            recovery_interval_seconds: 60,
            recovery_stale_after_seconds: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_rules() {
        let config = ServiceConfig::default();
        assert_eq!(config.signup_bonus_points, 100);
        assert_eq!(config.tips.max_amount, 1000);
        assert_eq!(config.conversions.min_conversion_points, 100);
        assert_eq!(config.conversions.points_to_token_rate.to_string(), "0.01");
        assert!(!config.chain.is_configured());
        assert!(!config.allow_memory_store);
    }

    #[test]
    fn zero_recovery_interval_is_clamped() {
        std::env::set_var("RECOVERY_INTERVAL_SECONDS", "0");
        let config = ServiceConfig::from_env();
        std::env::remove_var("RECOVERY_INTERVAL_SECONDS");
        assert_eq!(config.recovery_interval_seconds, MIN_RECOVERY_INTERVAL_SECONDS);
    }

    #[test]
    fn missing_env_falls_back() {
        assert_eq!(env_or("BATPOINTS_TEST_UNSET_VARIABLE", 42_u64), 42);
    }
}
