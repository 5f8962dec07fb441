use std::path::Path;
use std::sync::Arc;

use luna_brain::build_brain;
use luna_common::Result;
use luna_config::AppConfig;
use luna_db::Database;
use tracing::info;

use crate::state::AppState;

/// Open the store and the companion brain described by `config`.
///
/// `config` must already be validated so the JWT secrets are populated.
pub fn build_state(config: AppConfig, config_dir: &Path) -> Result<AppState> {
    let db_path = config.database_path(config_dir);
    let db = Arc::new(Database::open(&db_path)?);
    info!("database ready (schema v{})", db.schema_version()?);

    let brain = build_brain(&config.brain)?;
    info!("companion brain: {}", brain.provider_id());

    if config.environment.is_production() {
        info!("running in production mode, internal error details are hidden");
    }

    AppState::new(config, db, brain)
}

#[cfg(test)]
mod tests {
    use super::build_state;
    use luna_config::AppConfig;

    #[test]
    fn builds_state_with_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.validate().unwrap();

        let state = build_state(config, dir.path()).unwrap();
        assert_eq!(state.brain.provider_id(), "template");
        assert!(state.stripe.is_none());
        assert!(dir.path().join("data").join("luna.db").exists());
    }

    #[test]
    fn unknown_brain_provider_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.brain.provider = "mystery".into();
        config.validate().unwrap();

        assert!(build_state(config, dir.path()).is_err());
    }
}
