//! Errors raised while loading or checking keychain configuration

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `pib` or `tpm` is not a usable `scheme:location` string
    #[error("{key} locator must be a non-empty scheme:location string, got {value:?}")]
    InvalidLocator { key: &'static str, value: String },

    #[error("unknown log level {0:?}")]
    InvalidLogLevel(String),

    /// An environment override that does not parse
    #[error("{var}={value:?} is not a valid setting")]
    InvalidOverride { var: &'static str, value: String },
}
