use std::collections::HashMap;
use std::path::PathBuf;

use luna_common::{Error, Plan, Result};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub billing: BillingConfig,

    #[serde(default)]
    pub brain: BrainConfig,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origin allowed by CORS (the web frontend).
    #[serde(default)]
    pub frontend_url: Option<String>,

    /// Externally reachable base URL of this backend.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: None,
            public_url: None,
        }
    }
}

impl GatewayConfig {
    /// Base URL clients should use to reach the gateway.
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `<data_dir>/luna.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,

    #[serde(default)]
    pub jwt_refresh_secret: Option<String>,

    #[serde(default = "default_access_ttl_minutes")]
    pub access_token_ttl_minutes: i64,

    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_token_ttl_days: i64,

    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_refresh_secret: None,
            access_token_ttl_minutes: default_access_ttl_minutes(),
            refresh_token_ttl_days: default_refresh_ttl_days(),
            password_iterations: default_password_iterations(),
        }
    }
}

fn default_access_ttl_minutes() -> i64 {
    15
}

fn default_refresh_ttl_days() -> i64 {
    7
}

fn default_password_iterations() -> u32 {
    210_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Stripe price id per paid plan, keyed by plan name.
    #[serde(default)]
    pub prices: HashMap<String, String>,

    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: default_stripe_api_base(),
            prices: HashMap::new(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

impl BillingConfig {
    pub fn price_for(&self, plan: Plan) -> Option<&str> {
        self.prices.get(plan.as_str()).map(|s| s.as_str())
    }
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// `template` (built-in) or `openai` (any OpenAI-compatible endpoint).
    #[serde(default = "default_brain_provider")]
    pub provider: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            provider: default_brain_provider(),
            model: None,
            api_key: None,
            base_url: None,
            system_prompt: None,
        }
    }
}

fn default_brain_provider() -> String {
    "template".to_string()
}

impl AppConfig {
    /// Resolve the SQLite database path from config, falling back to the data dir.
    pub fn database_path(&self, config_dir: &std::path::Path) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        self.data_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("data"))
            .join("luna.db")
    }

    /// Check required settings. Production refuses to start without JWT
    /// secrets; development fills them with per-process random values.
    pub fn validate(&mut self) -> Result<()> {
        if self.auth.access_token_ttl_minutes <= 0 || self.auth.refresh_token_ttl_days <= 0 {
            return Err(Error::Config("token lifetimes must be positive".into()));
        }
        if self.auth.password_iterations == 0 {
            return Err(Error::Config("password_iterations must be non-zero".into()));
        }

        for (field, secret) in [
            ("jwt_secret", &mut self.auth.jwt_secret),
            ("jwt_refresh_secret", &mut self.auth.jwt_refresh_secret),
        ] {
            if secret.as_deref().is_some_and(|s| !s.is_empty()) {
                continue;
            }
            if self.environment.is_production() {
                return Err(Error::Config(format!(
                    "auth.{field} must be set in production"
                )));
            }
            warn!("auth.{field} not set, using an ephemeral secret (tokens will not survive restart)");
            *secret = Some(random_secret());
        }

        if self.auth.jwt_secret == self.auth.jwt_refresh_secret {
            return Err(Error::Config(
                "jwt_secret and jwt_refresh_secret must differ".into(),
            ));
        }

        Ok(())
    }
}

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, Environment};
    use std::path::Path;

    #[test]
    fn validate_generates_secrets_in_development() {
        let mut config = AppConfig::default();
        config.validate().expect("development config should validate");
        assert!(config.auth.jwt_secret.is_some());
        assert!(config.auth.jwt_refresh_secret.is_some());
        assert_ne!(config.auth.jwt_secret, config.auth.jwt_refresh_secret);
    }

    #[test]
    fn validate_requires_secrets_in_production() {
        let mut config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.auth.jwt_secret = Some("access".into());
        config.auth.jwt_refresh_secret = Some("refresh".into());
        config.validate().expect("configured secrets should validate");
    }

    #[test]
    fn validate_rejects_identical_secrets() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("same".into());
        config.auth.jwt_refresh_secret = Some("same".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_path_defaults_under_data_dir() {
        let config = AppConfig::default();
        let path = config.database_path(Path::new("/tmp/luna"));
        assert_eq!(path, Path::new("/tmp/luna/data/luna.db"));
    }
}
