use contracts::domain::a004_order::PricingRules;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: [u8; 4],
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Signing secret for id tokens. Generated and stored in the database
    /// when absent.
    pub jwt_secret: Option<String>,
    pub token_lifetime_hours: i64,
    /// Adds `Secure` to the admin cookie
    pub secure_cookies: bool,
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_lifetime_hours: 24,
            secure_cookies: true,
            bootstrap_admin_email: "admin@grocery.local".into(),
            bootstrap_admin_password: "ChangeMe123!".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OrdersConfig {
    pub delivery_fee: i64,
    pub free_delivery_threshold: Option<i64>,
    pub tax_rate_bps: i64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            delivery_fee: 499,
            free_delivery_threshold: Some(5000),
            tax_rate_bps: 0,
        }
    }
}

impl OrdersConfig {
    pub fn pricing(&self) -> PricingRules {
        PricingRules {
            delivery_fee: self.delivery_fee,
            free_delivery_threshold: self.free_delivery_threshold,
            tax_rate_bps: self.tax_rate_bps,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VerificationConfig {
    pub code_ttl_minutes: i64,
    pub max_attempts: i32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_minutes: 10,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    /// Cron expression (with seconds) for pruning rate-limit records
    pub rate_limit_cleanup: String,
    /// Cron expression (with seconds) for purging expired verification codes
    pub verification_cleanup: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 60,
            rate_limit_cleanup: "0 0 3 * * *".into(),
            verification_cleanup: "0 0 * * * *".into(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "target/db/grocery.db"

[server]
port = 3000

[orders]
delivery_fee = 499
free_delivery_threshold = 5000
tax_rate_bps = 0
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                return parse_config(&contents);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    parse_config(DEFAULT_CONFIG)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(contents)?;
    Ok(config)
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path_str = &config.database.path;
    let db_path = Path::new(db_path_str);

    if db_path.is_absolute() {
        return Ok(db_path.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return Ok(exe_dir.join(db_path));
        }
    }

    Ok(PathBuf::from(db_path_str))
}
