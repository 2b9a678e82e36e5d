//! Relation engine configuration.
//!
//! [`RelationsConfig`] is read from the `[relations]` section of
//! `config/config.toml`, with `LIFEGUARD__RELATIONS__*` environment
//! variables taking precedence. A missing section yields the defaults.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationsConfig {
    /// Run sibling eager-load nodes on concurrent coroutines
    #[serde(default = "default_concurrent_siblings")]
    pub concurrent_siblings: bool,
    /// Stack size (in words) of eager-load coroutines
    #[serde(default = "default_coroutine_stack_size")]
    pub coroutine_stack_size: usize,
    #[serde(default = "default_pivot_created_at_column")]
    pub pivot_created_at_column: String,
    #[serde(default = "default_pivot_updated_at_column")]
    pub pivot_updated_at_column: String,
}

fn default_concurrent_siblings() -> bool {
    true
}

fn default_coroutine_stack_size() -> usize {
    0x10000
}

fn default_pivot_created_at_column() -> String {
    "created_at".to_string()
}

fn default_pivot_updated_at_column() -> String {
    "updated_at".to_string()
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            concurrent_siblings: default_concurrent_siblings(),
            coroutine_stack_size: default_coroutine_stack_size(),
            pivot_created_at_column: default_pivot_created_at_column(),
            pivot_updated_at_column: default_pivot_updated_at_column(),
        }
    }
}

impl RelationsConfig {
    /// Load the relations configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("LIFEGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LIFEGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Parse a TOML document containing a `[relations]` section
    ///
    /// # Example
    ///
    /// ```
    /// use lifeguard_relations::RelationsConfig;
    ///
    /// let config = RelationsConfig::from_toml("[relations]\nconcurrent_siblings = false\n").unwrap();
    /// assert!(!config.concurrent_siblings);
    /// assert_eq!(config.pivot_created_at_column, "created_at");
    /// ```
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<RelationsConfig>("relations") {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Relations configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }
}
