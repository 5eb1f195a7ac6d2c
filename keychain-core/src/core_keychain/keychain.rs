//! The key chain orchestrator
//!
//! Owns one PIB and one TPM, chosen by locator at construction, and drives
//! identity creation, key generation, certificate issuance, signing, export
//! and import across the two.

use super::error::{KeyChainError, Result};
use super::locator::{BackendRegistry, Locator, LocatorResolver};
use crate::config::Config;
use crate::core_cert::{
    build_certificate, certificate_name_to_public_key_name, is_key_name, IdentityCertificate,
    SecuredBag, SubjectDescription,
};
use crate::core_name::{Component, Name};
use crate::core_pib::{Pib, PibError};
use crate::core_signing::{
    determine_signature, Data, DigestAlgorithm, Interest, Signature, SignatureInfo,
    SignatureType, SigningEngine,
};
use crate::core_tpm::{KeyClass, KeyParams, Tpm};
use crate::metrics::{self, Timer};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Validity of self-signed certificates, roughly twenty years
pub const SELF_SIGNED_VALIDITY: Duration = Duration::from_secs(7300 * 24 * 3600);

/// First component of the identity made up when no default identity exists
pub const TMP_IDENTITY: &str = "tmp-identity";

/// Digest used for every keyed signature
const DIGEST: DigestAlgorithm = DigestAlgorithm::Sha256;

/// `Ok(None)` for a PIB "not found", the value otherwise
fn optional<T>(result: std::result::Result<T, PibError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PibError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Identity, key and certificate management over a PIB/TPM pair
pub struct KeyChain {
    pib: Box<dyn Pib>,
    tpm: Box<dyn Tpm>,
    pib_locator: Locator,
    tpm_locator: Locator,
    engine: SigningEngine,
}

impl KeyChain {
    /// Open the configured default backends
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_locators("", "", false, config)
    }

    /// Open explicit backends; empty strings select the configured defaults
    pub fn with_locators(pib: &str, tpm: &str, allow_reset: bool, config: &Config) -> Result<Self> {
        Self::with_registry(&BackendRegistry::with_defaults(), pib, tpm, allow_reset, config)
    }

    /// Open backends from a caller-supplied registry
    pub fn with_registry(
        registry: &BackendRegistry,
        pib: &str,
        tpm: &str,
        allow_reset: bool,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let resolved = LocatorResolver::new(registry, config)?.resolve(pib, tpm, allow_reset)?;

        Ok(Self {
            pib: resolved.pib,
            tpm: resolved.tpm,
            pib_locator: resolved.pib_locator,
            tpm_locator: resolved.tpm_locator,
            engine: SigningEngine::new(),
        })
    }

    pub fn pib(&self) -> &dyn Pib {
        self.pib.as_ref()
    }

    pub fn tpm(&self) -> &dyn Tpm {
        self.tpm.as_ref()
    }

    pub fn pib_locator(&self) -> &Locator {
        &self.pib_locator
    }

    pub fn tpm_locator(&self) -> &Locator {
        &self.tpm_locator
    }

    /// Timestamp of the most recent signed request
    pub fn last_timestamp(&self) -> u64 {
        self.engine.last_timestamp()
    }

    /// Make sure `identity` has a default key of the requested type with a
    /// default certificate, creating whatever is missing.
    ///
    /// Returns the default certificate name.
    pub fn create_identity(&self, identity: &Name, params: &KeyParams) -> Result<Name> {
        if !self.pib.does_identity_exist(identity)? {
            self.pib.add_identity(identity)?;
            metrics::record_counter(metrics::IDENTITIES_CREATED, 1);
            info!(identity = %identity, "Created identity");
        }

        let current = optional(self.pib.default_key_name_for_identity(identity))?;
        let key_name = match current {
            Some(key_name)
                if self.pib.public_key(&key_name)?.key_type() == params.key_type() =>
            {
                key_name
            }
            _ => {
                let key_name = self.generate_key_pair(identity, true, params)?;
                self.pib.set_default_key_name_for_identity(&key_name)?;
                key_name
            }
        };

        match optional(self.pib.default_certificate_name_for_key(&key_name))? {
            Some(cert_name) => Ok(cert_name),
            None => {
                let certificate = self
                    .self_sign(&key_name)?
                    .ok_or_else(|| KeyChainError::NotFound(format!("key {}", key_name)))?;
                self.pib.add_certificate_as_identity_default(&certificate)?;
                Ok(certificate.name().clone())
            }
        }
    }

    /// Generate a key pair under a fresh name for `identity` and register
    /// its public key. Defaults are left alone.
    pub fn generate_key_pair(
        &self,
        identity: &Name,
        is_ksk: bool,
        params: &KeyParams,
    ) -> Result<Name> {
        params.validate()?;
        let key_name = self.pib.new_key_name(identity, is_ksk)?;

        let timer = Timer::new(metrics::KEYGEN_DURATION_MS);
        self.tpm.generate_key_pair(&key_name, params)?;
        timer.stop();

        let public_key = self.tpm.public_key(&key_name)?;
        self.pib.add_key(&key_name, &public_key)?;

        metrics::record_counter(metrics::KEYS_GENERATED, 1);
        info!(key = %key_name, params = %params, "Generated key pair");
        Ok(key_name)
    }

    pub fn generate_rsa_key_pair(&self, identity: &Name, is_ksk: bool, size: u32) -> Result<Name> {
        self.generate_key_pair(identity, is_ksk, &KeyParams::Rsa { size })
    }

    pub fn generate_ecdsa_key_pair(
        &self,
        identity: &Name,
        is_ksk: bool,
        size: u32,
    ) -> Result<Name> {
        self.generate_key_pair(identity, is_ksk, &KeyParams::Ecdsa { size })
    }

    pub fn generate_rsa_key_pair_as_default(
        &self,
        identity: &Name,
        is_ksk: bool,
        size: u32,
    ) -> Result<Name> {
        let key_name = self.generate_rsa_key_pair(identity, is_ksk, size)?;
        self.pib.set_default_key_name_for_identity(&key_name)?;
        Ok(key_name)
    }

    pub fn generate_ecdsa_key_pair_as_default(
        &self,
        identity: &Name,
        is_ksk: bool,
        size: u32,
    ) -> Result<Name> {
        let key_name = self.generate_ecdsa_key_pair(identity, is_ksk, size)?;
        self.pib.set_default_key_name_for_identity(&key_name)?;
        Ok(key_name)
    }

    /// Unsigned certificate for a registered key.
    ///
    /// `Ok(None)` when `key_name` is not a ksk/dsk name or the PIB has no
    /// such key.
    pub fn prepare_unsigned_identity_certificate(
        &self,
        key_name: &Name,
        signing_identity: &Name,
        not_before: SystemTime,
        not_after: SystemTime,
        subject_descriptions: Vec<SubjectDescription>,
        cert_prefix: Option<&Name>,
    ) -> Result<Option<IdentityCertificate>> {
        if !is_key_name(key_name) {
            return Ok(None);
        }
        let Some(public_key) = optional(self.pib.public_key(key_name))? else {
            return Ok(None);
        };

        let certificate = build_certificate(
            key_name,
            public_key,
            signing_identity,
            not_before,
            not_after,
            subject_descriptions,
            cert_prefix,
        )?;
        Ok(Some(certificate))
    }

    /// Signature template and signing key for a stored certificate
    fn signature_for(&self, cert_name: &Name) -> Result<(Signature, Name)> {
        let certificate = self.pib.certificate(cert_name)?;
        let key_type = certificate.public_key().key_type();
        let signature = determine_signature(certificate.key_locator_name()?, key_type, DIGEST)
            .ok_or(KeyChainError::UnsupportedSignature {
                key_type,
                digest: DIGEST,
            })?;
        Ok((signature, certificate.public_key_name()?))
    }

    /// Fill in `signature` by having the engine sign `bytes` with `key_name`
    fn sign_buffer(
        &self,
        bytes: &[u8],
        key_name: &Name,
        signature: Signature,
    ) -> Result<Signature> {
        let timer = Timer::new(metrics::SIGN_DURATION_MS);
        let signature = self
            .engine
            .sign_buffer(self.tpm.as_ref(), bytes, key_name, signature, DIGEST)?;
        timer.stop();
        metrics::record_counter(metrics::SIGNATURES_CREATED, 1);
        Ok(signature)
    }

    /// Sign `buffer` with the key of certificate `cert_name`
    pub fn sign(&self, buffer: &[u8], cert_name: &Name) -> Result<Signature> {
        let (signature, key_name) = self.signature_for(cert_name)?;
        let signature = self.sign_buffer(buffer, &key_name, signature)?;
        debug!(certificate = %cert_name, "Signed buffer");
        Ok(signature)
    }

    pub fn sign_data(&self, data: &mut Data, cert_name: &Name) -> Result<()> {
        let (signature, key_name) = self.signature_for(cert_name)?;
        data.set_signature(signature.clone());
        let signature = self.sign_buffer(&data.signed_portion(), &key_name, signature)?;
        data.set_signature(signature);
        debug!(data = %data.name(), certificate = %cert_name, "Signed data");
        Ok(())
    }

    /// Append the signed-request suffix to `interest`'s name
    pub fn sign_interest(&self, interest: &mut Interest, cert_name: &Name) -> Result<()> {
        let (signature, key_name) = self.signature_for(cert_name)?;
        let signed = self
            .engine
            .sign_request_name(interest.name(), &signature.info, |bytes| {
                self.sign_buffer(bytes, &key_name, signature.clone())
                    .map(|signed| signed.value)
            })?;
        debug!(interest = %signed, certificate = %cert_name, "Signed interest");
        interest.set_name(signed);
        Ok(())
    }

    /// Default certificate of `identity`, creating the identity when it
    /// has none
    fn signing_certificate_of(&self, identity: &Name) -> Result<Name> {
        match optional(self.pib.default_certificate_name_for_identity(identity))? {
            Some(cert_name) => Ok(cert_name),
            None => self.create_identity(identity, &KeyParams::default()),
        }
    }

    pub fn sign_by_identity(&self, buffer: &[u8], identity: &Name) -> Result<Signature> {
        let cert_name = self.signing_certificate_of(identity)?;
        self.sign(buffer, &cert_name)
    }

    pub fn sign_data_by_identity(&self, data: &mut Data, identity: &Name) -> Result<()> {
        let cert_name = self.signing_certificate_of(identity)?;
        self.sign_data(data, &cert_name)
    }

    pub fn sign_interest_by_identity(&self, interest: &mut Interest, identity: &Name) -> Result<()> {
        let cert_name = self.signing_certificate_of(identity)?;
        self.sign_interest(interest, &cert_name)
    }

    /// DigestSha256 signature: integrity only, no key involved
    pub fn sign_with_sha256_data(&self, data: &mut Data) {
        data.set_signature(Signature::unsigned(SignatureType::DigestSha256, None));
        let digest = Sha256::digest(data.signed_portion());
        data.set_signature_value(digest.to_vec());
        metrics::record_counter(metrics::DIGEST_SIGNATURES_CREATED, 1);
    }

    /// Signed-request suffix carrying a DigestSha256 signature
    pub fn sign_with_sha256_interest(&self, interest: &mut Interest) {
        let info = SignatureInfo::new(SignatureType::DigestSha256, None);
        let signed = self.engine.sign_request_name(interest.name(), &info, |bytes| {
            Ok::<_, Infallible>(Sha256::digest(bytes).to_vec())
        });
        match signed {
            Ok(name) => interest.set_name(name),
            Err(never) => match never {},
        }
        metrics::record_counter(metrics::DIGEST_SIGNATURES_CREATED, 1);
    }

    /// Issue a certificate for `key_name` signed by that same key, valid
    /// from now for [`SELF_SIGNED_VALIDITY`].
    ///
    /// `Ok(None)` when the PIB has no such key. The certificate is not
    /// stored.
    pub fn self_sign(&self, key_name: &Name) -> Result<Option<IdentityCertificate>> {
        let Some(public_key) = optional(self.pib.public_key(key_name))? else {
            return Ok(None);
        };

        let now = SystemTime::now();
        let mut certificate = build_certificate(
            key_name,
            public_key,
            &key_name.prefix(-1),
            now,
            now + SELF_SIGNED_VALIDITY,
            Vec::new(),
            None,
        )?;
        self.self_sign_certificate(&mut certificate)?;

        metrics::record_counter(metrics::CERTIFICATES_ISSUED, 1);
        info!(certificate = %certificate.name(), "Issued self-signed certificate");
        Ok(Some(certificate))
    }

    /// Sign `certificate` with the private key it certifies
    pub fn self_sign_certificate(&self, certificate: &mut IdentityCertificate) -> Result<()> {
        let key_name = certificate.public_key_name()?;
        if !self.tpm.does_key_exist(&key_name, KeyClass::Private) {
            return Err(KeyChainError::NotFound(format!("private key {}", key_name)));
        }

        let key_type = certificate.public_key().key_type();
        let signature =
            determine_signature(certificate.key_locator_name()?, key_type, DIGEST).ok_or(
                KeyChainError::UnsupportedSignature {
                    key_type,
                    digest: DIGEST,
                },
            )?;

        certificate.set_signature(signature.clone());
        let signed_portion = certificate.to_data()?.signed_portion();
        let signature = self.sign_buffer(&signed_portion, &key_name, signature)?;
        certificate.set_signature(signature);
        Ok(())
    }

    /// Bundle the default certificate and sealed private key of `identity`
    pub fn export_identity(&self, identity: &Name, password: &str) -> Result<SecuredBag> {
        if !self.pib.does_identity_exist(identity)? {
            return Err(KeyChainError::NotFound(format!("identity {}", identity)));
        }
        let key_name = self.pib.default_key_name_for_identity(identity)?;
        let sealed_key = self.tpm.export_private_key(&key_name, password)?;

        let certificate = match optional(self.pib.default_certificate_name_for_key(&key_name))? {
            Some(cert_name) => self.pib.certificate(&cert_name)?,
            None => {
                let certificate = self
                    .self_sign(&key_name)?
                    .ok_or_else(|| KeyChainError::NotFound(format!("key {}", key_name)))?;
                self.pib.add_certificate_as_identity_default(&certificate)?;
                certificate
            }
        };

        metrics::record_counter(metrics::IDENTITIES_EXPORTED, 1);
        info!(identity = %identity, key = %key_name, "Exported identity");
        Ok(SecuredBag::new(certificate, sealed_key))
    }

    /// Install an exported identity, making its key and certificate the
    /// identity defaults. Returns the key name.
    ///
    /// The registered public key is the one derived from the imported
    /// private key; it is not compared with the bag's certificate.
    pub fn import_identity(&self, bag: &SecuredBag, password: &str) -> Result<Name> {
        let certificate = bag.certificate();
        let key_name = certificate_name_to_public_key_name(certificate.name())?;
        let identity = key_name.prefix(-1);

        self.pib.add_identity(&identity)?;
        self.tpm
            .import_private_key(&key_name, bag.sealed_key(), password)?;

        let public_key = self.tpm.public_key(&key_name)?;
        self.pib.add_key(&key_name, &public_key)?;
        self.pib.set_default_key_name_for_identity(&key_name)?;
        self.pib.add_certificate_as_identity_default(certificate)?;

        metrics::record_counter(metrics::IDENTITIES_IMPORTED, 1);
        info!(identity = %identity, key = %key_name, "Imported identity");
        Ok(key_name)
    }

    /// The system default certificate. With no default identity a
    /// temporary one, `/tmp-identity/<random>`, is created and made the
    /// default.
    pub fn default_certificate_name(&self) -> Result<Name> {
        if let Some(certificate) = optional(self.pib.default_certificate())? {
            return Ok(certificate.name().clone());
        }

        let identity = match optional(self.pib.default_identity())? {
            Some(identity) => identity,
            None => Name::new()
                .append(TMP_IDENTITY)
                .append(Component::from_bytes(rand::random::<u32>().to_be_bytes())),
        };
        let cert_name = self.create_identity(&identity, &KeyParams::default())?;
        self.pib.set_default_identity(&identity)?;
        Ok(cert_name)
    }

    pub fn set_default_identity(&self, identity: &Name) -> Result<()> {
        Ok(self.pib.set_default_identity(identity)?)
    }

    pub fn set_default_key_for_identity(&self, key_name: &Name) -> Result<()> {
        Ok(self.pib.set_default_key_name_for_identity(key_name)?)
    }

    pub fn set_default_certificate_for_key(&self, cert_name: &Name) -> Result<()> {
        Ok(self.pib.set_default_certificate_name_for_key(cert_name)?)
    }

    pub fn delete_certificate(&self, cert_name: &Name) -> Result<()> {
        self.pib.delete_certificate(cert_name)?;
        info!(certificate = %cert_name, "Deleted certificate");
        Ok(())
    }

    /// Remove a key's PIB entry (and certificates), then its key pair
    pub fn delete_key(&self, key_name: &Name) -> Result<()> {
        self.pib.delete_key(key_name)?;
        self.tpm.delete_key_pair(key_name)?;
        metrics::record_counter(metrics::KEYS_DELETED, 1);
        info!(key = %key_name, "Deleted key");
        Ok(())
    }

    /// Remove an identity from the PIB, then every one of its key pairs
    /// from the TPM.
    ///
    /// Every key pair deletion is attempted; the first failure is returned
    /// after all attempts.
    pub fn delete_identity(&self, identity: &Name) -> Result<()> {
        let key_names = self.pib.all_key_names_of_identity(identity)?;
        self.pib.delete_identity(identity)?;

        let mut first_error = None;
        for key_name in &key_names {
            if let Err(e) = self.tpm.delete_key_pair(key_name) {
                warn!(key = %key_name, error = %e, "Failed to delete key pair");
                first_error.get_or_insert(e);
            }
        }

        metrics::record_counter(metrics::IDENTITIES_DELETED, 1);
        info!(identity = %identity, keys = key_names.len(), "Deleted identity");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChain")
            .field("pib", &self.pib_locator.to_string())
            .field("tpm", &self.tpm_locator.to_string())
            .finish()
    }
}
