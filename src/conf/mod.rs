//! Provides application configuration options.

pub mod auth;
pub mod external;
pub mod floor;
pub mod rooms;
pub mod rpc;
pub mod server;

use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub use self::{
    auth::Auth,
    external::{Directory, Push},
    floor::Floor,
    rooms::Rooms,
    rpc::Rpc,
    server::Server,
};

/// Name of the environment variable holding the path to the configuration
/// file.
const CONF_FILE_ENV_VAR_NAME: &str = "STENTOR_CONF";

/// Prefix of environment variables overriding configuration values.
const ENV_PREFIX: &str = "STENTOR";

/// Separator of nested sections in overriding environment variables, e.g.
/// `STENTOR_SERVER__BIND_PORT`.
const ENV_SEPARATOR: &str = "__";

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Conf {
    /// HTTP server settings.
    pub server: Server,

    /// Client session settings.
    pub rpc: Rpc,

    /// Room settings.
    pub rooms: Rooms,

    /// PTT floor arbitration settings.
    pub floor: Floor,

    /// Credential verification settings.
    pub auth: Auth,

    /// Directory Store settings.
    pub directory: Directory,

    /// Push Gateway settings.
    pub push: Push,
}

impl Conf {
    /// Creates a new [`Conf`] applying values from the following sources
    /// (in the following order):
    /// - default values;
    /// - configuration file, the path of which is given by the
    ///   `STENTOR_CONF` environment variable (`config.toml` otherwise);
    /// - environment variables prefixed with `STENTOR_`.
    ///
    /// # Errors
    ///
    /// Errors if any of the sources fails to parse, or the resulting
    /// configuration is invalid.
    pub fn parse() -> Result<Self, ConfigError> {
        let mut cfg = Config::new();
        match env::var(CONF_FILE_ENV_VAR_NAME) {
            Ok(path) => {
                cfg.merge(File::with_name(&path))?;
            }
            Err(_) => {
                cfg.merge(File::with_name("config").required(false))?;
            }
        }
        cfg.merge(
            Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
        )?;

        let conf: Self = cfg.try_into()?;
        conf.validate()?;
        Ok(conf)
    }

    /// Checks requirements which cannot be expressed by defaults.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_none() && !self.auth.allow_dev {
            return Err(ConfigError::Message(
                "either 'auth.jwt_secret' must be set or 'auth.allow_dev' \
                 enabled"
                    .to_owned(),
            ));
        }
        Ok(())
    }
}
