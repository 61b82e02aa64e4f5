use super::{
    evaluation::EvaluationConfig,
    evolution::EvolutionConfig,
    grammar::GrammarConfig,
    traits::{ConfigManifest, ConfigSection},
};
use crate::error::RuleforgeError;
use config::{Config, Environment, File, FileFormat};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `RULEFORGE__EVOLUTION__POPULATION_SIZE=20`
pub const ENV_PREFIX: &str = "RULEFORGE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub grammar: GrammarConfig,
    pub evolution: EvolutionConfig,
    pub evaluation: EvaluationConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), RuleforgeError> {
        self.grammar.validate()?;
        self.evolution.validate()?;
        self.evaluation.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: AppConfig,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Layered load: defaults, then the optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, RuleforgeError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            info!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!("Effective configuration: {:?}", config);

        Ok(Self { config })
    }

    /// Reads a TOML file without environment layering
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RuleforgeError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(Self { config })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RuleforgeError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, RuleforgeError> {
        Ok(toml::to_string_pretty(&self.config)?)
    }

    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Applies `f` and keeps the result only when it validates
    pub fn update<F>(&mut self, f: F) -> Result<(), RuleforgeError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.config.clone();
        f(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    pub fn manifest(&self) -> Vec<ConfigManifest> {
        vec![
            self.config.grammar.to_manifest(),
            self.config.evolution.to_manifest(),
            self.config.evaluation.to_manifest(),
        ]
    }
}
