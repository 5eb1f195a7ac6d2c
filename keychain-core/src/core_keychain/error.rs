//! Key chain errors
//!
//! One closed set of error kinds for every orchestrator operation. Backend
//! "not found" failures are lifted into [`KeyChainError::NotFound`] so that
//! callers can tell a missing artifact from a broken backend.

use crate::config::ConfigError;
use crate::core_cert::{CertificateError, KeyType};
use crate::core_name::NameError;
use crate::core_pib::PibError;
use crate::core_signing::DigestAlgorithm;
use crate::core_tpm::TpmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyChainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("TPM locator mismatch: PIB records {recorded}, requested {requested}")]
    LocatorMismatch { recorded: String, requested: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported signature: {key_type} key with {digest}")]
    UnsupportedSignature {
        key_type: KeyType,
        digest: DigestAlgorithm,
    },

    #[error("PIB error: {0}")]
    Pib(PibError),

    #[error("TPM error: {0}")]
    Tpm(TpmError),

    #[error("Invalid name: {0}")]
    InvalidName(#[from] NameError),
}

impl KeyChainError {
    /// Whether the operation failed only because an artifact is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyChainError::NotFound(_))
    }
}

impl From<PibError> for KeyChainError {
    fn from(e: PibError) -> Self {
        match e {
            PibError::NotFound(what) => KeyChainError::NotFound(what),
            PibError::Name(e) => KeyChainError::InvalidName(e),
            other => KeyChainError::Pib(other),
        }
    }
}

impl From<TpmError> for KeyChainError {
    fn from(e: TpmError) -> Self {
        match e {
            TpmError::KeyNotFound(key) => KeyChainError::NotFound(format!("private key {}", key)),
            other => KeyChainError::Tpm(other),
        }
    }
}

impl From<CertificateError> for KeyChainError {
    fn from(e: CertificateError) -> Self {
        PibError::from(e).into()
    }
}

impl From<ConfigError> for KeyChainError {
    fn from(e: ConfigError) -> Self {
        KeyChainError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeyChainError>;
