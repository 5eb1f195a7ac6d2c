//! Public info base (PIB)
//!
//! Stores identity, key and certificate names, public key bytes and the
//! default pointers between them. Private keys never pass through here.
//!
//! A key belongs to the identity formed by all but its last component; a
//! certificate belongs to the key named by its certificate name.

mod memory_pib;
mod migrations;
pub mod protocol;
mod sql_pib;

pub use memory_pib::MemoryPib;
pub use sql_pib::{SqlPib, PIB_DB_FILE};

use crate::core_cert::{
    certificate_name_to_public_key_name, CertificateError, IdentityCertificate, PublicKey,
    DSK_PREFIX, KSK_PREFIX,
};
use crate::core_name::{now_millis, Component, Name, NameError};
use thiserror::Error;

/// Public info base errors
#[derive(Debug, Error)]
pub enum PibError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid name: {0}")]
    Name(#[from] NameError),
}

impl From<rusqlite::Error> for PibError {
    fn from(e: rusqlite::Error) -> Self {
        PibError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for PibError {
    fn from(e: r2d2::Error) -> Self {
        PibError::Storage(format!("Failed to get connection: {}", e))
    }
}

impl From<CertificateError> for PibError {
    fn from(e: CertificateError) -> Self {
        match e {
            CertificateError::Name(e) => PibError::Name(e),
            CertificateError::Encoding(msg) => PibError::Serialization(msg),
        }
    }
}

/// Abstract public info base
pub trait Pib: Send + Sync {
    /// Locator of this instance, `scheme:location`
    fn locator(&self) -> String;

    /// TPM locator recorded by an earlier session
    fn tpm_locator(&self) -> Result<Option<String>, PibError>;

    fn set_tpm_locator(&self, locator: &str) -> Result<(), PibError>;

    fn does_identity_exist(&self, identity: &Name) -> Result<bool, PibError>;

    /// Register an identity; a no-op when it already exists
    fn add_identity(&self, identity: &Name) -> Result<(), PibError>;

    /// Remove an identity with all its keys and certificates
    fn delete_identity(&self, identity: &Name) -> Result<(), PibError>;

    fn does_key_exist(&self, key_name: &Name) -> Result<bool, PibError>;

    /// Register a key (and its identity when missing); an existing key has
    /// its public key replaced
    fn add_key(&self, key_name: &Name, public_key: &PublicKey) -> Result<(), PibError>;

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, PibError>;

    /// Remove a key with all its certificates
    fn delete_key(&self, key_name: &Name) -> Result<(), PibError>;

    fn does_certificate_exist(&self, cert_name: &Name) -> Result<bool, PibError>;

    /// Store a certificate, registering its key when missing
    fn add_certificate(&self, certificate: &IdentityCertificate) -> Result<(), PibError>;

    fn certificate(&self, cert_name: &Name) -> Result<IdentityCertificate, PibError>;

    fn delete_certificate(&self, cert_name: &Name) -> Result<(), PibError>;

    fn default_identity(&self) -> Result<Name, PibError>;

    /// The identity must exist
    fn set_default_identity(&self, identity: &Name) -> Result<(), PibError>;

    fn default_key_name_for_identity(&self, identity: &Name) -> Result<Name, PibError>;

    /// Make `key_name` its identity's default; the key must exist
    fn set_default_key_name_for_identity(&self, key_name: &Name) -> Result<(), PibError>;

    fn default_certificate_name_for_key(&self, key_name: &Name) -> Result<Name, PibError>;

    /// Make `cert_name` its key's default; the certificate must exist
    fn set_default_certificate_name_for_key(&self, cert_name: &Name) -> Result<(), PibError>;

    /// Identities whose default flag equals `is_default`
    fn identities(&self, is_default: bool) -> Result<Vec<Name>, PibError>;

    /// Keys of `identity` whose default flag equals `is_default`
    fn key_names_of_identity(&self, identity: &Name, is_default: bool)
        -> Result<Vec<Name>, PibError>;

    /// Certificates of `key_name` whose default flag equals `is_default`
    fn certificate_names_of_key(&self, key_name: &Name, is_default: bool)
        -> Result<Vec<Name>, PibError>;

    fn default_certificate_name_for_identity(&self, identity: &Name) -> Result<Name, PibError> {
        let key_name = self.default_key_name_for_identity(identity)?;
        self.default_certificate_name_for_key(&key_name)
    }

    /// Fresh key name `<identity>/ksk-<ms>` (or `dsk-`), bumping the
    /// timestamp until the name is unused
    fn new_key_name(&self, identity: &Name, is_ksk: bool) -> Result<Name, PibError> {
        let prefix = if is_ksk { KSK_PREFIX } else { DSK_PREFIX };
        let mut timestamp = now_millis();
        loop {
            let mut component = prefix.to_vec();
            component.extend_from_slice(timestamp.to_string().as_bytes());
            let key_name = identity.clone().append(Component::from_bytes(component));
            if !self.does_key_exist(&key_name)? {
                return Ok(key_name);
            }
            timestamp += 1;
        }
    }

    fn add_certificate_as_key_default(
        &self,
        certificate: &IdentityCertificate,
    ) -> Result<(), PibError> {
        self.add_certificate(certificate)?;
        self.set_default_certificate_name_for_key(certificate.name())
    }

    fn add_certificate_as_identity_default(
        &self,
        certificate: &IdentityCertificate,
    ) -> Result<(), PibError> {
        self.add_certificate(certificate)?;
        let key_name = certificate_name_to_public_key_name(certificate.name())?;
        self.set_default_key_name_for_identity(&key_name)?;
        self.set_default_certificate_name_for_key(certificate.name())
    }

    fn add_certificate_as_system_default(
        &self,
        certificate: &IdentityCertificate,
    ) -> Result<(), PibError> {
        self.add_certificate_as_identity_default(certificate)?;
        let key_name = certificate_name_to_public_key_name(certificate.name())?;
        self.set_default_identity(&key_name.prefix(-1))
    }

    /// The default certificate of the default identity
    fn default_certificate(&self) -> Result<IdentityCertificate, PibError> {
        let identity = self.default_identity()?;
        let cert_name = self.default_certificate_name_for_identity(&identity)?;
        self.certificate(&cert_name)
    }

    fn all_identities(&self) -> Result<Vec<Name>, PibError> {
        let mut names = self.identities(true)?;
        names.extend(self.identities(false)?);
        Ok(names)
    }

    /// Every key of `identity`, both ksk and dsk, default first
    fn all_key_names_of_identity(&self, identity: &Name) -> Result<Vec<Name>, PibError> {
        let mut names = self.key_names_of_identity(identity, true)?;
        names.extend(self.key_names_of_identity(identity, false)?);
        Ok(names)
    }

    fn all_certificate_names_of_key(&self, key_name: &Name) -> Result<Vec<Name>, PibError> {
        let mut names = self.certificate_names_of_key(key_name, true)?;
        names.extend(self.certificate_names_of_key(key_name, false)?);
        Ok(names)
    }
}

#[cfg(test)]
mod tests;
