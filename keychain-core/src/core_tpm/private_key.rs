//! Private key material
//!
//! RSA (PKCS#1 v1.5) and ECDSA over P-256, both signing SHA-256 digests.
//! Keys move in and out of a custodian as PKCS#8 DER.

use super::{KeyParams, TpmError};
use crate::core_cert::{KeyType, PublicKey};
use crate::core_signing::DigestAlgorithm;
use p256::ecdsa::SigningKey as EcdsaSigningKey;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rand_core::OsRng;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// A private key held by a custodian
///
/// The wrapped key types zeroize their secret parts on drop.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    EcdsaP256(p256::SecretKey),
}

impl PrivateKey {
    /// Generate a fresh key
    pub fn generate(params: &KeyParams) -> Result<Self, TpmError> {
        params.validate()?;
        match params {
            KeyParams::Rsa { size } => RsaPrivateKey::new(&mut OsRng, *size as usize)
                .map(PrivateKey::Rsa)
                .map_err(|e| TpmError::Crypto(format!("RSA key generation failed: {}", e))),
            KeyParams::Ecdsa { .. } => Ok(PrivateKey::EcdsaP256(p256::SecretKey::random(
                &mut OsRng,
            ))),
        }
    }

    /// Parse PKCS#8 DER, trying RSA then P-256
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, TpmError> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(PrivateKey::Rsa(key));
        }
        p256::SecretKey::from_pkcs8_der(der)
            .map(PrivateKey::EcdsaP256)
            .map_err(|_| TpmError::UnsupportedKey("unrecognised PKCS#8 key".to_string()))
    }

    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, TpmError> {
        let document = match self {
            PrivateKey::Rsa(key) => key.to_pkcs8_der(),
            PrivateKey::EcdsaP256(key) => key.to_pkcs8_der(),
        }
        .map_err(|e| TpmError::Crypto(format!("PKCS#8 encoding failed: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PrivateKey::Rsa(_) => KeyType::Rsa,
            PrivateKey::EcdsaP256(_) => KeyType::Ecdsa,
        }
    }

    /// Matching public key as SPKI DER
    pub fn public_key(&self) -> Result<PublicKey, TpmError> {
        let document = match self {
            PrivateKey::Rsa(key) => key.to_public_key().to_public_key_der(),
            PrivateKey::EcdsaP256(key) => key.public_key().to_public_key_der(),
        }
        .map_err(|e| TpmError::Crypto(format!("SPKI encoding failed: {}", e)))?;
        Ok(PublicKey::from_der(document.as_bytes()))
    }

    /// Sign `bytes`; RSA yields PKCS#1 v1.5, ECDSA yields a DER signature
    pub fn sign(&self, bytes: &[u8], digest: DigestAlgorithm) -> Result<Vec<u8>, TpmError> {
        if digest != DigestAlgorithm::Sha256 {
            return Err(TpmError::UnsupportedDigest(digest));
        }
        match self {
            PrivateKey::Rsa(key) => {
                let signing_key = RsaSigningKey::<Sha256>::new(key.clone());
                let signature = signing_key
                    .try_sign(bytes)
                    .map_err(|e| TpmError::Crypto(format!("RSA signing failed: {}", e)))?;
                Ok(signature.to_vec())
            }
            PrivateKey::EcdsaP256(key) => {
                let signing_key = EcdsaSigningKey::from(key);
                let signature: p256::ecdsa::Signature = signing_key
                    .try_sign(bytes)
                    .map_err(|e| TpmError::Crypto(format!("ECDSA signing failed: {}", e)))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type())
            .field("secret", &"<redacted>")
            .finish()
    }
}
