use crate::config::BotConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads bot configuration by layering defaults, TOML, and environment
    /// variables (`PERPBOT_` prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load() -> Result<BotConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn load_from(path: &str) -> Result<BotConfig> {
        let config: BotConfig = Figment::from(Serialized::defaults(BotConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PERPBOT_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }
}
