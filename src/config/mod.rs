//! Layered configuration.
//!
//! Values come from an optional config file and then from environment
//! variables prefixed with `SIGNALHUB` (nested keys separated by `__`, e.g.
//! `SIGNALHUB__BROKER__WORKER_THREADS=8`). Anything left unspecified falls
//! back to `Settings::default()`.

mod settings;

use config::{Config, Environment, File};

use settings::PartialSettings;

use crate::utils::Result;

pub use settings::{BrokerSettings, LoggingSettings, Settings};

const ENV_PREFIX: &str = "SIGNALHUB";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings> {
    load_config_from("config/default")
}

/// Loads the configuration using `path` as the base name of the config file.
/// The file is optional; its extension selects the format.
pub fn load_config_from(path: &str) -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
