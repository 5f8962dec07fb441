pub mod brain;
pub mod lexicon;
pub mod openai;
pub mod template;

use std::sync::Arc;

use luna_common::{Error, Result};
use luna_config::BrainConfig;
use tracing::info;

pub use brain::{CompanionBrain, MemoryCandidate, ReplyRequest};
pub use openai::OpenAiBrain;
pub use template::TemplateBrain;

/// Build the brain selected by configuration.
pub fn build_brain(config: &BrainConfig) -> Result<Arc<dyn CompanionBrain>> {
    match config.provider.as_str() {
        "template" => {
            info!("using built-in template brain");
            Ok(Arc::new(TemplateBrain::new()))
        }
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                Error::Config("brain.api_key (or OPENAI_API_KEY) is required for the openai provider".into())
            })?;
            let brain = OpenAiBrain::new(api_key, config.model.clone(), config.base_url.clone())
                .with_system_prompt(config.system_prompt.clone());
            info!("using openai brain");
            Ok(Arc::new(brain))
        }
        other => Err(Error::Config(format!("unknown brain provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::build_brain;
    use luna_config::BrainConfig;

    #[test]
    fn default_config_builds_template_brain() {
        let brain = build_brain(&BrainConfig::default()).unwrap();
        assert_eq!(brain.provider_id(), "template");
    }

    #[test]
    fn openai_requires_api_key() {
        let config = BrainConfig {
            provider: "openai".into(),
            ..BrainConfig::default()
        };
        assert!(build_brain(&config).is_err());

        let config = BrainConfig {
            api_key: Some("sk-test".into()),
            ..config
        };
        assert_eq!(build_brain(&config).unwrap().provider_id(), "openai");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = BrainConfig {
            provider: "oracle".into(),
            ..BrainConfig::default()
        };
        assert!(build_brain(&config).is_err());
    }
}
