use bomsync_models::{BomError, BomResult};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Which validation tier to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Saving a draft: an empty BOM is acceptable.
    Draft,
    /// Publishing: the BOM must contain at least one active part.
    Publish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Absolute cost delta above which a cost change is High severity.
    pub material_cost_threshold: f64,
    /// Fix suggestions below this confidence are withheld.
    pub suggestion_confidence_floor: f64,
    /// Time a finished sync stays in Success/Error before reading back as Idle.
    pub sync_cooldown_ms: u64,
    pub validation_mode: ValidationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = AppConfig::default();
        let config = Config::builder()
            .set_default("engine.material_cost_threshold", defaults.engine.material_cost_threshold)?
            .set_default("engine.suggestion_confidence_floor", defaults.engine.suggestion_confidence_floor)?
            .set_default("engine.sync_cooldown_ms", defaults.engine.sync_cooldown_ms)?
            .set_default("engine.validation_mode", "publish")?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                File::with_name(&format!(
                    "config/{}",
                    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            // Local overrides (gitignored)
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("BOMSYNC").separator("__"));

        let loaded: AppConfig = config.build()?.try_deserialize()?;
        loaded
            .engine
            .check()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(loaded)
    }
}

impl EngineConfig {
    /// Rejects values the engine cannot work with.
    pub fn check(&self) -> BomResult<()> {
        if !(0.0..=1.0).contains(&self.suggestion_confidence_floor) {
            return Err(BomError::Configuration {
                message: format!(
                    "suggestion_confidence_floor must be within 0..=1, got {}",
                    self.suggestion_confidence_floor
                ),
            });
        }
        if !self.material_cost_threshold.is_finite() || self.material_cost_threshold < 0.0 {
            return Err(BomError::Configuration {
                message: "material_cost_threshold must not be negative".to_string(),
            });
        }
        if i64::try_from(self.sync_cooldown_ms).is_err() {
            return Err(BomError::Configuration {
                message: format!("sync_cooldown_ms must not exceed {}, got {}", i64::MAX, self.sync_cooldown_ms),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            material_cost_threshold: 100.0,
            suggestion_confidence_floor: 0.6,
            sync_cooldown_ms: 3000,
            validation_mode: ValidationMode::Publish,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
                file_path: None,
            },
        }
    }
}
