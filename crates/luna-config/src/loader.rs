use std::path::{Path, PathBuf};

use luna_common::{Error, Result};
use tracing::info;

use crate::model::{AppConfig, Environment};

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".luna"));
        let xdg_config = dirs::config_dir().map(|c| c.join("luna"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                // Prefer XDG unless only the legacy home directory exists.
                if xdg.exists() || !home.exists() {
                    xdg
                } else {
                    home
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".luna"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join("config.yml").exists() || self.config_dir.join("config.toml").exists()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Load the config file and layer process environment variables on top.
    pub fn load_with_env(&self) -> Result<AppConfig> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.config_dir.join("data")];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

/// Apply deployment environment variables. `lookup` abstracts the
/// environment so overrides can be tested without mutating process state.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("BACKEND_URL") {
        config.gateway.public_url = Some(url);
    }
    if let Some(url) = get("FRONTEND_URL") {
        config.gateway.frontend_url = Some(url);
    }
    if let Some(path) = get("DATABASE_PATH") {
        config.database.path = Some(PathBuf::from(path));
    }
    if let Some(secret) = get("JWT_SECRET") {
        config.auth.jwt_secret = Some(secret);
    }
    if let Some(secret) = get("JWT_REFRESH_SECRET") {
        config.auth.jwt_refresh_secret = Some(secret);
    }
    if let Some(key) = get("STRIPE_SECRET_KEY") {
        config.billing.stripe_secret_key = Some(key);
    }
    if let Some(secret) = get("STRIPE_WEBHOOK_SECRET") {
        config.billing.stripe_webhook_secret = Some(secret);
    }
    if config.brain.api_key.is_none()
        && let Some(key) = get("OPENAI_API_KEY")
    {
        config.brain.api_key = Some(key);
    }
    if let Some(env) = get("LUNA_ENV") {
        config.environment = match env.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigLoader, apply_env_overrides};
    use crate::model::{AppConfig, Environment};
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "luna-config-test-{}-{}-{}",
            label,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn load_returns_default_when_no_config_exists() {
        let dir = temp_dir("default");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.brain.provider, "template");
        assert_eq!(config.auth.access_token_ttl_minutes, 15);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_prefers_yaml_over_toml_when_both_exist() {
        let dir = temp_dir("yaml-precedence");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("config.yml"),
            "gateway:\n  host: \"0.0.0.0\"\n  port: 4001\n",
        )
        .expect("failed to write yaml config");
        fs::write(
            dir.join("config.toml"),
            "[gateway]\nhost = \"127.0.0.2\"\nport = 4999\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 4001);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_reads_toml_billing_prices() {
        let dir = temp_dir("toml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("config.toml"),
            "[billing]\nwebhook_tolerance_secs = 60\n\n[billing.prices]\npremium = \"price_123\"\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.billing.webhook_tolerance_secs, 60);
        assert_eq!(
            config.billing.price_for(luna_common::Plan::Premium),
            Some("price_123")
        );
        assert_eq!(config.billing.price_for(luna_common::Plan::Ultimate), None);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("JWT_SECRET", "from-env"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_env"),
            ("FRONTEND_URL", "https://app.example.com"),
            ("DATABASE_PATH", "/var/lib/luna/luna.db"),
            ("LUNA_ENV", "production"),
            ("STRIPE_SECRET_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.billing.stripe_secret_key = Some("sk_file".into());
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-env"));
        assert_eq!(
            config.billing.stripe_webhook_secret.as_deref(),
            Some("whsec_env")
        );
        assert_eq!(
            config.gateway.frontend_url.as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/var/lib/luna/luna.db"))
        );
        assert_eq!(config.environment, Environment::Production);
        // Blank values do not clobber the file.
        assert_eq!(config.billing.stripe_secret_key.as_deref(), Some("sk_file"));
    }

    #[test]
    fn ensure_dirs_creates_data_directory() {
        let dir = temp_dir("ensure-dirs");
        let loader = ConfigLoader::with_dir(&dir);

        loader.ensure_dirs().expect("ensure_dirs should succeed");

        assert!(dir.exists());
        assert!(dir.join("data").exists());

        let _ = fs::remove_dir_all(dir);
    }
}
