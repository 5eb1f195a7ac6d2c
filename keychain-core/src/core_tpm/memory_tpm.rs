//! In-memory key custodian for tests and ephemeral use

use super::{KeyClass, KeyParams, PrivateKey, Tpm, TpmError};
use crate::core_cert::PublicKey;
use crate::core_name::Name;
use crate::core_signing::DigestAlgorithm;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use zeroize::Zeroizing;

fn handle_poison<T>(_err: PoisonError<T>) -> TpmError {
    TpmError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// In-memory key custodian (non-persistent)
#[derive(Clone, Default)]
pub struct MemoryTpm {
    location: String,
    keys: Arc<RwLock<HashMap<Name, PrivateKey>>>,
}

impl MemoryTpm {
    pub const SCHEME: &'static str = "tpm-memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Instance tagged with `location`; the location only feeds the locator
    pub fn with_location(location: &str) -> Self {
        MemoryTpm {
            location: location.to_string(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn with_key<T>(
        &self,
        key_name: &Name,
        f: impl FnOnce(&PrivateKey) -> Result<T, TpmError>,
    ) -> Result<T, TpmError> {
        let keys = self.keys.read().map_err(handle_poison)?;
        let key = keys
            .get(key_name)
            .ok_or_else(|| TpmError::KeyNotFound(key_name.to_uri()))?;
        f(key)
    }
}

impl Tpm for MemoryTpm {
    fn locator(&self) -> String {
        format!("{}:{}", Self::SCHEME, self.location)
    }

    fn generate_key_pair(&self, key_name: &Name, params: &KeyParams) -> Result<(), TpmError> {
        if self.keys.read().map_err(handle_poison)?.contains_key(key_name) {
            return Err(TpmError::KeyExists(key_name.to_uri()));
        }
        let key = PrivateKey::generate(params)?;
        debug!(key = %key_name, params = %params, "Generated key pair");
        self.keys
            .write()
            .map_err(handle_poison)?
            .insert(key_name.clone(), key);
        Ok(())
    }

    fn delete_key_pair(&self, key_name: &Name) -> Result<(), TpmError> {
        self.keys.write().map_err(handle_poison)?.remove(key_name);
        Ok(())
    }

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, TpmError> {
        self.with_key(key_name, |key| key.public_key())
    }

    fn sign(
        &self,
        bytes: &[u8],
        key_name: &Name,
        digest: DigestAlgorithm,
    ) -> Result<Vec<u8>, TpmError> {
        self.with_key(key_name, |key| key.sign(bytes, digest))
    }

    fn does_key_exist(&self, key_name: &Name, _class: KeyClass) -> bool {
        self.keys
            .read()
            .map(|keys| keys.contains_key(key_name))
            .unwrap_or(false)
    }

    fn export_private_key_pkcs8(&self, key_name: &Name) -> Result<Zeroizing<Vec<u8>>, TpmError> {
        self.with_key(key_name, |key| key.to_pkcs8_der())
    }

    fn import_private_key_pkcs8(&self, key_name: &Name, der: &[u8]) -> Result<(), TpmError> {
        let key = PrivateKey::from_pkcs8_der(der)?;
        self.keys
            .write()
            .map_err(handle_poison)?
            .insert(key_name.clone(), key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_name() -> Name {
        Name::from_uri("/alice/ksk-1").unwrap()
    }

    #[test]
    fn test_generate_and_sign() {
        let tpm = MemoryTpm::new();
        tpm.generate_key_pair(&key_name(), &KeyParams::ecdsa()).unwrap();

        assert!(tpm.does_key_exist(&key_name(), KeyClass::Private));
        assert!(tpm.does_key_exist(&key_name(), KeyClass::Public));
        let signature = tpm.sign(b"data", &key_name(), DigestAlgorithm::Sha256).unwrap();
        assert!(!signature.is_empty());
    }

    #[test]
    fn test_duplicate_generation_fails() {
        let tpm = MemoryTpm::new();
        tpm.generate_key_pair(&key_name(), &KeyParams::ecdsa()).unwrap();
        assert!(matches!(
            tpm.generate_key_pair(&key_name(), &KeyParams::ecdsa()),
            Err(TpmError::KeyExists(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let tpm = MemoryTpm::new();
        tpm.generate_key_pair(&key_name(), &KeyParams::ecdsa()).unwrap();
        tpm.delete_key_pair(&key_name()).unwrap();
        tpm.delete_key_pair(&key_name()).unwrap();
        assert!(!tpm.does_key_exist(&key_name(), KeyClass::Private));
        assert!(matches!(
            tpm.public_key(&key_name()),
            Err(TpmError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_sealed_export_import_between_instances() {
        let source = MemoryTpm::new();
        source.generate_key_pair(&key_name(), &KeyParams::ecdsa()).unwrap();
        let sealed = source.export_private_key(&key_name(), "pw").unwrap();

        let target = MemoryTpm::new();
        assert!(matches!(
            target.import_private_key(&key_name(), &sealed, "bad"),
            Err(TpmError::InvalidPassword)
        ));
        target.import_private_key(&key_name(), &sealed, "pw").unwrap();
        assert_eq!(
            target.public_key(&key_name()).unwrap(),
            source.public_key(&key_name()).unwrap()
        );
    }

    #[test]
    fn test_locator() {
        assert_eq!(MemoryTpm::new().locator(), "tpm-memory:");
        assert_eq!(MemoryTpm::with_location("a").locator(), "tpm-memory:a");
    }
}
