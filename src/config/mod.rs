mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, HubSettings, LoggingSettings, Settings};

/// Loads the configuration from `config/default` and `WEBSUB_*` environment
/// variables, merged over the default values.
///
/// Environment keys use `__` between section and field, e.g.
/// `WEBSUB_HUB__PORT=9300` or `WEBSUB_BROKER__PERSISTENCE_PATH=/var/lib/websub`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("WEBSUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
