use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid config file {}: {reason}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A required setting has no value from any source.
    #[error("missing required setting `{field}`")]
    Missing {
        /// Dotted path of the setting, e.g. `remote.base_url`.
        field: &'static str,
    },

    /// A setting has a value that cannot be used.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Dotted path of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.to_string(),
        }
    }
}
