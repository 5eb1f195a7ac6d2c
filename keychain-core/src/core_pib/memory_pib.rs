//! In-memory public info base for tests and ephemeral use

use super::{Pib, PibError};
use crate::core_cert::{certificate_name_to_public_key_name, IdentityCertificate, PublicKey};
use crate::core_name::Name;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

fn handle_poison<T>(_err: PoisonError<T>) -> PibError {
    PibError::Storage("Lock poisoned: a thread panicked while holding the lock".to_string())
}

struct KeyEntry {
    public_key: PublicKey,
    default_certificate: Option<Name>,
}

#[derive(Default)]
struct PibState {
    tpm_locator: Option<String>,
    default_identity: Option<Name>,
    /// identity -> its default key
    identities: BTreeMap<Name, Option<Name>>,
    keys: BTreeMap<Name, KeyEntry>,
    certificates: BTreeMap<Name, IdentityCertificate>,
}

impl PibState {
    fn ensure_key(&mut self, key_name: &Name, public_key: &PublicKey) {
        self.identities.entry(key_name.prefix(-1)).or_insert(None);
        self.keys
            .entry(key_name.clone())
            .and_modify(|entry| entry.public_key = public_key.clone())
            .or_insert_with(|| KeyEntry {
                public_key: public_key.clone(),
                default_certificate: None,
            });
    }

    fn remove_key(&mut self, key_name: &Name) {
        self.keys.remove(key_name);
        self.certificates.retain(|cert_name, _| {
            certificate_name_to_public_key_name(cert_name).ok().as_ref() != Some(key_name)
        });
        if let Some(default_key) = self.identities.get_mut(&key_name.prefix(-1)) {
            if default_key.as_ref() == Some(key_name) {
                *default_key = None;
            }
        }
    }
}

/// In-memory public info base (non-persistent)
#[derive(Clone, Default)]
pub struct MemoryPib {
    location: String,
    state: Arc<RwLock<PibState>>,
}

impl MemoryPib {
    pub const SCHEME: &'static str = "pib-memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Instance tagged with `location`; the location only feeds the locator
    pub fn with_location(location: &str) -> Self {
        MemoryPib {
            location: location.to_string(),
            state: Arc::new(RwLock::new(PibState::default())),
        }
    }
}

impl Pib for MemoryPib {
    fn locator(&self) -> String {
        format!("{}:{}", Self::SCHEME, self.location)
    }

    fn tpm_locator(&self) -> Result<Option<String>, PibError> {
        Ok(self.state.read().map_err(handle_poison)?.tpm_locator.clone())
    }

    fn set_tpm_locator(&self, locator: &str) -> Result<(), PibError> {
        self.state.write().map_err(handle_poison)?.tpm_locator = Some(locator.to_string());
        Ok(())
    }

    fn does_identity_exist(&self, identity: &Name) -> Result<bool, PibError> {
        Ok(self
            .state
            .read()
            .map_err(handle_poison)?
            .identities
            .contains_key(identity))
    }

    fn add_identity(&self, identity: &Name) -> Result<(), PibError> {
        self.state
            .write()
            .map_err(handle_poison)?
            .identities
            .entry(identity.clone())
            .or_insert(None);
        Ok(())
    }

    fn delete_identity(&self, identity: &Name) -> Result<(), PibError> {
        let mut state = self.state.write().map_err(handle_poison)?;
        let keys: Vec<Name> = state
            .keys
            .keys()
            .filter(|key_name| &key_name.prefix(-1) == identity)
            .cloned()
            .collect();
        for key_name in &keys {
            state.remove_key(key_name);
        }
        state.identities.remove(identity);
        if state.default_identity.as_ref() == Some(identity) {
            state.default_identity = None;
        }
        Ok(())
    }

    fn does_key_exist(&self, key_name: &Name) -> Result<bool, PibError> {
        Ok(self
            .state
            .read()
            .map_err(handle_poison)?
            .keys
            .contains_key(key_name))
    }

    fn add_key(&self, key_name: &Name, public_key: &PublicKey) -> Result<(), PibError> {
        self.state
            .write()
            .map_err(handle_poison)?
            .ensure_key(key_name, public_key);
        Ok(())
    }

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, PibError> {
        self.state
            .read()
            .map_err(handle_poison)?
            .keys
            .get(key_name)
            .map(|entry| entry.public_key.clone())
            .ok_or_else(|| PibError::NotFound(format!("key {}", key_name)))
    }

    fn delete_key(&self, key_name: &Name) -> Result<(), PibError> {
        self.state.write().map_err(handle_poison)?.remove_key(key_name);
        Ok(())
    }

    fn does_certificate_exist(&self, cert_name: &Name) -> Result<bool, PibError> {
        Ok(self
            .state
            .read()
            .map_err(handle_poison)?
            .certificates
            .contains_key(cert_name))
    }

    fn add_certificate(&self, certificate: &IdentityCertificate) -> Result<(), PibError> {
        let key_name = certificate.public_key_name()?;
        let mut state = self.state.write().map_err(handle_poison)?;
        if !state.keys.contains_key(&key_name) {
            state.ensure_key(&key_name, certificate.public_key());
        }
        state
            .certificates
            .insert(certificate.name().clone(), certificate.clone());
        Ok(())
    }

    fn certificate(&self, cert_name: &Name) -> Result<IdentityCertificate, PibError> {
        self.state
            .read()
            .map_err(handle_poison)?
            .certificates
            .get(cert_name)
            .cloned()
            .ok_or_else(|| PibError::NotFound(format!("certificate {}", cert_name)))
    }

    fn delete_certificate(&self, cert_name: &Name) -> Result<(), PibError> {
        let mut state = self.state.write().map_err(handle_poison)?;
        state.certificates.remove(cert_name);
        if let Ok(key_name) = certificate_name_to_public_key_name(cert_name) {
            if let Some(entry) = state.keys.get_mut(&key_name) {
                if entry.default_certificate.as_ref() == Some(cert_name) {
                    entry.default_certificate = None;
                }
            }
        }
        Ok(())
    }

    fn default_identity(&self) -> Result<Name, PibError> {
        self.state
            .read()
            .map_err(handle_poison)?
            .default_identity
            .clone()
            .ok_or_else(|| PibError::NotFound("default identity".to_string()))
    }

    fn set_default_identity(&self, identity: &Name) -> Result<(), PibError> {
        let mut state = self.state.write().map_err(handle_poison)?;
        if !state.identities.contains_key(identity) {
            return Err(PibError::NotFound(format!("identity {}", identity)));
        }
        state.default_identity = Some(identity.clone());
        Ok(())
    }

    fn default_key_name_for_identity(&self, identity: &Name) -> Result<Name, PibError> {
        self.state
            .read()
            .map_err(handle_poison)?
            .identities
            .get(identity)
            .cloned()
            .flatten()
            .ok_or_else(|| PibError::NotFound(format!("default key of {}", identity)))
    }

    fn set_default_key_name_for_identity(&self, key_name: &Name) -> Result<(), PibError> {
        let mut state = self.state.write().map_err(handle_poison)?;
        if !state.keys.contains_key(key_name) {
            return Err(PibError::NotFound(format!("key {}", key_name)));
        }
        state
            .identities
            .insert(key_name.prefix(-1), Some(key_name.clone()));
        Ok(())
    }

    fn default_certificate_name_for_key(&self, key_name: &Name) -> Result<Name, PibError> {
        self.state
            .read()
            .map_err(handle_poison)?
            .keys
            .get(key_name)
            .and_then(|entry| entry.default_certificate.clone())
            .ok_or_else(|| PibError::NotFound(format!("default certificate of {}", key_name)))
    }

    fn set_default_certificate_name_for_key(&self, cert_name: &Name) -> Result<(), PibError> {
        let key_name = certificate_name_to_public_key_name(cert_name)?;
        let mut state = self.state.write().map_err(handle_poison)?;
        if !state.certificates.contains_key(cert_name) {
            return Err(PibError::NotFound(format!("certificate {}", cert_name)));
        }
        let entry = state
            .keys
            .get_mut(&key_name)
            .ok_or_else(|| PibError::NotFound(format!("key {}", key_name)))?;
        entry.default_certificate = Some(cert_name.clone());
        Ok(())
    }

    fn identities(&self, is_default: bool) -> Result<Vec<Name>, PibError> {
        let state = self.state.read().map_err(handle_poison)?;
        Ok(state
            .identities
            .keys()
            .filter(|identity| (state.default_identity.as_ref() == Some(*identity)) == is_default)
            .cloned()
            .collect())
    }

    fn key_names_of_identity(
        &self,
        identity: &Name,
        is_default: bool,
    ) -> Result<Vec<Name>, PibError> {
        let state = self.state.read().map_err(handle_poison)?;
        let default_key = state.identities.get(identity).cloned().flatten();
        Ok(state
            .keys
            .keys()
            .filter(|key_name| &key_name.prefix(-1) == identity)
            .filter(|key_name| (default_key.as_ref() == Some(*key_name)) == is_default)
            .cloned()
            .collect())
    }

    fn certificate_names_of_key(
        &self,
        key_name: &Name,
        is_default: bool,
    ) -> Result<Vec<Name>, PibError> {
        let state = self.state.read().map_err(handle_poison)?;
        let default_cert = state
            .keys
            .get(key_name)
            .and_then(|entry| entry.default_certificate.clone());
        Ok(state
            .certificates
            .keys()
            .filter(|cert_name| {
                certificate_name_to_public_key_name(cert_name).ok().as_ref() == Some(key_name)
            })
            .filter(|cert_name| (default_cert.as_ref() == Some(*cert_name)) == is_default)
            .cloned()
            .collect())
    }
}
