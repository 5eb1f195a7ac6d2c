//! File-based key custodian
//!
//! Each key pair lives in two files named after the SHA-256 of the key
//! name's URI:
//! ```text
//! <dir>/<hex digest>.pri   PKCS#8 DER private key (0600 on Unix)
//! <dir>/<hex digest>.pub   SPKI DER public key
//! ```

use super::{KeyClass, KeyParams, PrivateKey, Tpm, TpmError};
use crate::core_cert::PublicKey;
use crate::core_name::Name;
use crate::core_signing::DigestAlgorithm;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Directory name under `~/.ndn` used when no location is given
pub const DEFAULT_TPM_DIR: &str = "ndnsec-tpm-file";

/// File-based key custodian
pub struct FileTpm {
    base_path: PathBuf,
}

impl FileTpm {
    pub const SCHEME: &'static str = "tpm-file";

    /// Open (creating if needed) the key directory at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, TpmError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(FileTpm { base_path })
    }

    /// Open the directory named by a locator location; empty means
    /// `~/.ndn/ndnsec-tpm-file`
    pub fn from_location(location: &str) -> Result<Self, TpmError> {
        if location.is_empty() {
            let home = dirs::home_dir()
                .ok_or_else(|| TpmError::Other("Home directory not found".to_string()))?;
            Self::new(home.join(".ndn").join(DEFAULT_TPM_DIR))
        } else {
            Self::new(location)
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key_name: &Name, class: KeyClass) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key_name.to_uri().as_bytes()));
        let extension = match class {
            KeyClass::Private => "pri",
            KeyClass::Public => "pub",
        };
        self.base_path.join(format!("{}.{}", digest, extension))
    }

    fn load_private_key(&self, key_name: &Name) -> Result<PrivateKey, TpmError> {
        let path = self.key_path(key_name, KeyClass::Private);
        if !path.exists() {
            return Err(TpmError::KeyNotFound(key_name.to_uri()));
        }
        let der = Zeroizing::new(fs::read(&path)?);
        PrivateKey::from_pkcs8_der(&der)
    }

    fn store_key(&self, key_name: &Name, key: &PrivateKey) -> Result<(), TpmError> {
        let der = key.to_pkcs8_der()?;
        let public = key.public_key()?;
        write_atomic(&self.key_path(key_name, KeyClass::Private), &der, true)?;
        write_atomic(
            &self.key_path(key_name, KeyClass::Public),
            public.as_der(),
            false,
        )
    }
}

/// Write to a temp file, then rename over the target
fn write_atomic(path: &Path, data: &[u8], private: bool) -> Result<(), TpmError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    if private {
        restrict_permissions(&temp_path)?;
    }
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), TpmError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), TpmError> {
    Ok(())
}

impl Tpm for FileTpm {
    fn locator(&self) -> String {
        format!("{}:{}", Self::SCHEME, self.base_path.display())
    }

    fn generate_key_pair(&self, key_name: &Name, params: &KeyParams) -> Result<(), TpmError> {
        if self.does_key_exist(key_name, KeyClass::Private) {
            return Err(TpmError::KeyExists(key_name.to_uri()));
        }
        let key = PrivateKey::generate(params)?;
        self.store_key(key_name, &key)?;
        debug!(key = %key_name, params = %params, "Generated key pair");
        Ok(())
    }

    fn delete_key_pair(&self, key_name: &Name) -> Result<(), TpmError> {
        for class in [KeyClass::Private, KeyClass::Public] {
            let path = self.key_path(key_name, class);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key = %key_name, path = %path.display(), error = %e, "Failed to remove key file");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, TpmError> {
        let path = self.key_path(key_name, KeyClass::Public);
        if !path.exists() {
            return Err(TpmError::KeyNotFound(key_name.to_uri()));
        }
        Ok(PublicKey::from_der(fs::read(&path)?))
    }

    fn sign(
        &self,
        bytes: &[u8],
        key_name: &Name,
        digest: DigestAlgorithm,
    ) -> Result<Vec<u8>, TpmError> {
        self.load_private_key(key_name)?.sign(bytes, digest)
    }

    fn does_key_exist(&self, key_name: &Name, class: KeyClass) -> bool {
        self.key_path(key_name, class).exists()
    }

    fn export_private_key_pkcs8(&self, key_name: &Name) -> Result<Zeroizing<Vec<u8>>, TpmError> {
        self.load_private_key(key_name)?.to_pkcs8_der()
    }

    fn import_private_key_pkcs8(&self, key_name: &Name, der: &[u8]) -> Result<(), TpmError> {
        let key = PrivateKey::from_pkcs8_der(der)?;
        self.store_key(key_name, &key)
    }
}
