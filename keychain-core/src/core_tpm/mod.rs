//! Key custodian (TPM)
//!
//! Holds private keys and performs raw key generation and signing. Keys are
//! addressed by the same name the public info base uses for them.

mod file_tpm;
mod memory_tpm;
mod params;
mod private_key;
pub mod sealed;

pub use file_tpm::FileTpm;
pub use memory_tpm::MemoryTpm;
pub use params::KeyParams;
pub use private_key::PrivateKey;

use crate::core_cert::PublicKey;
use crate::core_name::Name;
use crate::core_signing::DigestAlgorithm;
use thiserror::Error;
use zeroize::Zeroizing;

/// Key custodian errors
#[derive(Debug, Error)]
pub enum TpmError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedDigest(DigestAlgorithm),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Sealed key error: {0}")]
    Sealed(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Which half of a key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Public,
    Private,
}

/// Abstract key custodian
pub trait Tpm: Send + Sync {
    /// Locator of this instance, `scheme:location`
    fn locator(&self) -> String;

    /// Generate a key pair under `key_name`; fails if it already exists
    fn generate_key_pair(&self, key_name: &Name, params: &KeyParams) -> Result<(), TpmError>;

    /// Remove both halves; absent keys are not an error
    fn delete_key_pair(&self, key_name: &Name) -> Result<(), TpmError>;

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, TpmError>;

    /// Raw signature over `bytes`
    fn sign(
        &self,
        bytes: &[u8],
        key_name: &Name,
        digest: DigestAlgorithm,
    ) -> Result<Vec<u8>, TpmError>;

    fn does_key_exist(&self, key_name: &Name, class: KeyClass) -> bool;

    /// Unencrypted PKCS#8 DER of the private key
    fn export_private_key_pkcs8(&self, key_name: &Name) -> Result<Zeroizing<Vec<u8>>, TpmError>;

    /// Store PKCS#8 DER as the private key for `key_name`, replacing any
    /// previous key
    fn import_private_key_pkcs8(&self, key_name: &Name, der: &[u8]) -> Result<(), TpmError>;

    /// Private key sealed under `password`
    fn export_private_key(&self, key_name: &Name, password: &str) -> Result<Vec<u8>, TpmError> {
        let der = self.export_private_key_pkcs8(key_name)?;
        sealed::seal(&der, password)
    }

    /// Unseal with `password` and import
    fn import_private_key(
        &self,
        key_name: &Name,
        sealed_key: &[u8],
        password: &str,
    ) -> Result<(), TpmError> {
        let der = sealed::unseal(sealed_key, password)?;
        self.import_private_key_pkcs8(key_name, &der)
    }
}
